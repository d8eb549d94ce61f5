//! Telegram Bot API client over plain HTTPS JSON calls.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

use super::{ChatApi, Keyboard, MediaMessage, MemberStatus, PaidMedia};
use crate::catalog::ContentKind;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::texts::normalize_markup;

/// `{ ok, result?, description? }` envelope every Bot API method returns.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ChatMemberResult {
    status: String,
}

#[derive(Debug, Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    url: &'a str,
}

fn reply_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<InlineButton<'_>>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineButton {
                    text: &b.text,
                    url: &b.url,
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn media_method(kind: ContentKind) -> (&'static str, &'static str) {
    match kind {
        ContentKind::Photo => ("sendPhoto", "photo"),
        ContentKind::Audio => ("sendAudio", "audio"),
        ContentKind::Video => ("sendVideo", "video"),
    }
}

pub struct TelegramApi {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_base_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, body: Value) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        debug!("Calling Telegram method {}", method);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote(method, e.without_url().to_string()))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::remote(method, format!("invalid response: {}", e.without_url())))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => {
                let description = description.unwrap_or_else(|| "no description".to_string());
                error!("Telegram API error ({}): {}", method, description);
                Err(Error::remote(method, description))
            }
        }
    }
}

#[async_trait]
impl ChatApi for TelegramApi {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": normalize_markup(text),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(keyboard) = &keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn send_media(&self, chat_id: i64, media: MediaMessage<'_>) -> Result<i64> {
        let (method, field) = media_method(media.kind);
        let mut body = json!({
            "chat_id": chat_id,
            "caption": normalize_markup(media.caption),
            "parse_mode": "HTML",
            "protect_content": media.protect_content,
        });
        body[field] = Value::from(media.file_id);
        if let Some(keyboard) = &media.keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let sent: SentMessage = self.call(method, body).await?;
        Ok(sent.message_id)
    }

    async fn send_paid_media(&self, chat_id: i64, media: PaidMedia<'_>) -> Result<i64> {
        let body = json!({
            "chat_id": chat_id,
            "star_count": media.star_count,
            "media": [{ "type": media.kind.as_str(), "media": media.file_id }],
            "caption": normalize_markup(media.caption),
            "parse_mode": "HTML",
            "payload": media.payload,
            "protect_content": media.protect_content,
        });
        let sent: SentMessage = self.call("sendPaidMedia", body).await?;
        Ok(sent.message_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn get_chat_member(&self, chat_id: i64, user_id: i64) -> Result<MemberStatus> {
        let member: ChatMemberResult = self
            .call(
                "getChatMember",
                json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        Ok(MemberStatus::parse(&member.status))
    }

    async fn answer_pre_checkout_query(&self, query_id: &str, ok: bool) -> Result<()> {
        let _: bool = self
            .call(
                "answerPreCheckoutQuery",
                json!({ "pre_checkout_query_id": query_id, "ok": ok }),
            )
            .await?;
        Ok(())
    }
}
