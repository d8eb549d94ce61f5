//! User-facing strings.

use regex::Regex;
use std::sync::OnceLock;

use crate::broadcast::BroadcastReport;
use crate::catalog::Locale;
use crate::config::PricesConfig;

/// Placeholder shown while remote calls are in flight.
pub const WORKING_PLACEHOLDER: &str = "💬";

pub const REGISTRY_NOT_CONFIGURED_BROADCAST: &str =
    "❌ Database not configured. Cannot send broadcast.\n\n\
     Please configure [registry] database_path in the bot configuration.";

pub const REGISTRY_NOT_CONFIGURED_ADVERTISEMENT: &str =
    "❌ Database not configured. Cannot send advertisement to all users.\n\n\
     Please configure [registry] database_path in the bot configuration.";

pub const ADVERTISEMENT_MISSING: &str = "❌ No advertisement configured in the catalog.";

/// Turn `<br>`, literal `\n` and `/n` sequences into real newlines.
pub fn normalize_markup(text: &str) -> String {
    static BR: OnceLock<Regex> = OnceLock::new();
    let br = BR.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
    br.replace_all(text, "\n")
        .replace("\\n", "\n")
        .replace("/n", "\n")
}

pub fn subscription_required(locale: Locale) -> &'static str {
    match locale {
        Locale::It => {
            "⚠️💋 Per giocare con me, devi essere iscritto al canale ufficiale:\n\
             ✨ Iscriviti subito cliccando il bottone qui sotto👇🏻\n\n\
             ⚠️🔞 Attenzione, cliccando il bottone per iscriverti al canale dichiari di essere \
             maggiorenne. I contenuti inviati attraverso questo bot sono esclusivamente per un \
             pubblico adulto."
        }
        Locale::Es => {
            "⚠️💋 Para jugar conmigo, debes estar suscrito al canal oficial:\n\
             ✨ ¡Suscríbete ahora haciendo clic en el botón de abajo👇🏻\n\n\
             ⚠️🔞 Atención, al hacer clic en el botón para suscribirte al canal declaras ser \
             mayor de edad. Los contenidos enviados a través de este bot son exclusivamente para \
             un público adulto."
        }
        Locale::En => {
            "⚠️💋 To play with me, you must be subscribed to the official channel:\n\
             ✨ Subscribe now by clicking the button below👇🏻\n\n\
             ⚠️🔞 Warning, by clicking the button to subscribe to the channel you declare that \
             you are of legal age. The content sent through this bot is exclusively for an adult \
             audience."
        }
    }
}

pub const CHANNEL_BUTTON: &str = "✨ Accedi al Canale 🔞";

pub fn delivery_error(locale: Locale) -> &'static str {
    match locale {
        Locale::It => "Mi dispiace, c'è stato un errore. Prova più tardi o contattaci:",
        Locale::Es => "Lo siento, hubo un error. Inténtalo más tarde o contáctanos:",
        Locale::En => "I'm sorry, there was an error. Try again later or contact us:",
    }
}

/// Command reference appended to `/start` for the admin.
pub fn admin_info(prices: &PricesConfig, registry_configured: bool) -> String {
    let status = if registry_configured {
        "✅ Connected"
    } else {
        "❌ Not configured"
    };
    format!(
        "<b>👑 Admin Commands:</b>\n\n\
         <b>Broadcast Messages:</b>\n\
         • <code>!toEveryone!</code> - Send to all users\n\
         • <code>!toEveryIt!</code> - Send to Italian users\n\
         • <code>!toEveryEs!</code> - Send to Spanish users\n\
         • <code>!toEveryEn!</code> - Send to other users\n\n\
         <b>Advertisement:</b>\n\
         • <code>/sendadv</code> - Send ad to all users\n\
         • <code>/testadv</code> - Test ad (send only to you)\n\n\
         <b>Example:</b>\n\
         <code>!toEveryone! Hello everyone!</code>\n\n\
         <b>Prices:</b>\n\
         • Photo: {} ⭐\n\
         • Audio: {} ⭐\n\
         • Video: {} ⭐\n\n\
         <b>Database Status:</b> {}",
        prices.photo, prices.audio, prices.video, status
    )
}

pub fn broadcast_report(target_label: &str, report: &BroadcastReport) -> String {
    format!(
        "Message sent to {}:\n✔️ Successfully sent to {} chats\n❌ Failed for {} chats",
        target_label, report.succeeded, report.failed
    )
}

pub fn advertisement_report(report: &BroadcastReport) -> String {
    format!(
        "Advertisement sent:\n✔️ Successfully sent to {} chats\n❌ Failed for {} chats",
        report.succeeded, report.failed
    )
}

pub fn broadcast_failed(error: &str) -> String {
    format!("❌ Broadcast aborted: {}", escape_html(error))
}

/// HTML error report for the admin, with the request context as pretty JSON.
pub fn admin_error_report(error: &str, context: &serde_json::Value) -> String {
    let context = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    format!(
        "🚨 <b>Error Report</b>\n\n<b>Error:</b> {}\n\n<b>Context:</b>\n<code>{}</code>",
        escape_html(error),
        escape_html(&context)
    )
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
