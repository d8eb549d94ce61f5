//! Inbound event model.
//!
//! Updates arrive either as raw webhook JSON or, in polling mode, as teloxide
//! updates re-serialized to the same wire shape. Both paths end up in
//! [`InboundEvent::from_value`], which keeps only what dispatch needs.

use serde::Deserialize;

use crate::catalog::Locale;
use crate::error::{Error, Result};

/// Who sent a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub id: i64,
    pub display_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub locale_code: Option<String>,
}

impl Sender {
    pub fn locale(&self) -> Locale {
        Locale::from_code(self.locale_code.as_deref())
    }
}

/// Telegram Stars payment that completed for this chat.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub currency: String,
    pub total_amount: i64,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub sender: Sender,
    /// Empty when the message carries no text.
    pub text: String,
    pub payment: Option<PaymentConfirmation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub sender_id: i64,
    pub currency: String,
    pub total_amount: i64,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    PreCheckoutQuery(PreCheckoutQuery),
    ChatMessage(ChatMessage),
    /// An update carrying neither a message nor a checkout query.
    Other,
}

// ── Wire types (Telegram Bot API update, only the fields we read) ─────────────

#[derive(Debug, Deserialize)]
struct RawUpdate {
    #[allow(dead_code)]
    update_id: i64,
    message: Option<RawMessage>,
    pre_checkout_query: Option<RawPreCheckoutQuery>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    #[serde(default)]
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: i64,
    from: Option<RawUser>,
    chat: RawChat,
    text: Option<String>,
    successful_payment: Option<RawPayment>,
}

#[derive(Debug, Deserialize)]
struct RawPayment {
    #[serde(default)]
    currency: String,
    total_amount: i64,
    #[serde(default)]
    invoice_payload: String,
}

#[derive(Debug, Deserialize)]
struct RawPreCheckoutQuery {
    id: String,
    from: RawUser,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    total_amount: i64,
    #[serde(default)]
    invoice_payload: String,
}

impl From<RawUser> for Sender {
    fn from(user: RawUser) -> Self {
        Sender {
            id: user.id,
            display_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
            locale_code: user.language_code,
        }
    }
}

impl InboundEvent {
    /// Parse a raw update body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| Error::MalformedInput(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let update: RawUpdate =
            serde_json::from_value(value).map_err(|e| Error::MalformedInput(e.to_string()))?;

        if let Some(query) = update.pre_checkout_query {
            return Ok(InboundEvent::PreCheckoutQuery(PreCheckoutQuery {
                id: query.id,
                sender_id: query.from.id,
                currency: query.currency,
                total_amount: query.total_amount,
                payload: query.invoice_payload,
            }));
        }

        let message = match update.message {
            Some(m) => m,
            None => return Ok(InboundEvent::Other),
        };

        // Channel posts and service messages have no sender to answer.
        let sender = match message.from {
            Some(user) => Sender::from(user),
            None => return Ok(InboundEvent::Other),
        };

        Ok(InboundEvent::ChatMessage(ChatMessage {
            message_id: message.message_id,
            chat_id: message.chat.id,
            sender,
            text: message.text.unwrap_or_default(),
            payment: message.successful_payment.map(|p| PaymentConfirmation {
                currency: p.currency,
                total_amount: p.total_amount,
                payload: p.invoice_payload,
            }),
        }))
    }
}
