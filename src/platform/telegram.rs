use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::dispatcher::CommandDispatcher;
use crate::events::InboundEvent;

/// Build the long-polling client, honouring a custom Bot API endpoint.
pub fn polling_bot(config: &TelegramConfig) -> Result<Bot> {
    let url = reqwest::Url::parse(&config.api_base_url)
        .with_context(|| format!("Invalid api_base_url: {}", config.api_base_url))?;
    Ok(Bot::new(&config.bot_token).set_api_url(url))
}

/// Run the long-polling loop until shutdown.
///
/// Updates are re-serialized to Bot API JSON so polling and the webhook go
/// through the same event parser.
pub async fn run(bot: Bot, dispatcher: Arc<CommandDispatcher>) -> Result<()> {
    info!("Starting Telegram long polling...");

    let handler = dptree::entry().endpoint(handle_update);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_update(update: Update, dispatcher: Arc<CommandDispatcher>) -> ResponseResult<()> {
    match update_to_event(&update) {
        Ok(event) => {
            dispatcher.handle(event).await;
        }
        Err(e) => warn!("Dropping update {}: {}", update.id.0, e),
    }
    Ok(())
}

fn update_to_event(update: &Update) -> std::result::Result<InboundEvent, String> {
    let value = serde_json::to_value(update).map_err(|e| e.to_string())?;
    InboundEvent::from_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Locale;

    fn parse(json: &str) -> InboundEvent {
        let update: Update = serde_json::from_str(json).unwrap();
        update_to_event(&update).unwrap()
    }

    #[test]
    fn test_polled_text_message() {
        let event = parse(
            r#"{
                "update_id": 7001,
                "message": {
                    "message_id": 55,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ada" },
                    "from": { "id": 42, "is_bot": false, "first_name": "Ada", "username": "ada", "language_code": "es" },
                    "text": "photo"
                }
            }"#,
        );

        match event {
            InboundEvent::ChatMessage(msg) => {
                assert_eq!(msg.message_id, 55);
                assert_eq!(msg.chat_id, 42);
                assert_eq!(msg.text, "photo");
                assert_eq!(msg.sender.id, 42);
                assert_eq!(msg.sender.username.as_deref(), Some("ada"));
                assert_eq!(msg.sender.locale(), Locale::Es);
                assert!(msg.payment.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_polled_successful_payment() {
        let event = parse(
            r#"{
                "update_id": 7002,
                "message": {
                    "message_id": 56,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ada" },
                    "from": { "id": 42, "is_bot": false, "first_name": "Ada" },
                    "successful_payment": {
                        "currency": "XTR",
                        "total_amount": 100,
                        "invoice_payload": "video_42_1700000000",
                        "telegram_payment_charge_id": "tg-charge-1",
                        "provider_payment_charge_id": "prov-charge-1"
                    }
                }
            }"#,
        );

        match event {
            InboundEvent::ChatMessage(msg) => {
                let payment = msg.payment.expect("payment should be parsed");
                assert_eq!(payment.currency, "XTR");
                assert_eq!(payment.total_amount, 100);
                assert_eq!(payment.payload, "video_42_1700000000");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_polled_pre_checkout_query() {
        let event = parse(
            r#"{
                "update_id": 7003,
                "pre_checkout_query": {
                    "id": "query-9",
                    "from": { "id": 42, "is_bot": false, "first_name": "Ada" },
                    "currency": "XTR",
                    "total_amount": 50,
                    "invoice_payload": "photo_42_1700000000"
                }
            }"#,
        );

        assert_eq!(
            event,
            InboundEvent::PreCheckoutQuery(crate::events::PreCheckoutQuery {
                id: "query-9".to_string(),
                sender_id: 42,
                currency: "XTR".to_string(),
                total_amount: 50,
                payload: "photo_42_1700000000".to_string(),
            })
        );
    }
}
