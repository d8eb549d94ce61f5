pub mod bot_api;
pub mod telegram;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;

use crate::catalog::ContentKind;
use crate::error::Result;

/// An inline keyboard button that opens a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlButton {
    pub text: String,
    pub url: String,
}

impl UrlButton {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// Inline keyboard rows.
pub type Keyboard = Vec<Vec<UrlButton>>;

/// A free photo/audio/video send.
#[derive(Debug, Clone)]
pub struct MediaMessage<'a> {
    pub kind: ContentKind,
    pub file_id: &'a str,
    pub caption: &'a str,
    pub protect_content: bool,
    pub keyboard: Option<Keyboard>,
}

/// A single-item paid media send billed in Telegram Stars.
#[derive(Debug, Clone)]
pub struct PaidMedia<'a> {
    pub kind: ContentKind,
    pub file_id: &'a str,
    pub caption: &'a str,
    pub star_count: u32,
    pub payload: String,
    pub protect_content: bool,
}

/// Channel membership status as reported by `getChatMember`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    Unknown(String),
}

impl MemberStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "creator" => MemberStatus::Creator,
            "administrator" => MemberStatus::Administrator,
            "member" => MemberStatus::Member,
            "restricted" => MemberStatus::Restricted,
            "left" => MemberStatus::Left,
            "kicked" => MemberStatus::Kicked,
            other => MemberStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(
            self,
            MemberStatus::Member | MemberStatus::Administrator | MemberStatus::Creator
        )
    }
}

/// Outbound chat-platform port.
///
/// Every method is a single request/response call. Failures come back as
/// `Error::RemoteCall`; nothing here retries.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Send an HTML text message, returning its message id.
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>)
        -> Result<i64>;

    /// Send a photo, audio or video without payment.
    async fn send_media(&self, chat_id: i64, media: MediaMessage<'_>) -> Result<i64>;

    async fn send_paid_media(&self, chat_id: i64, media: PaidMedia<'_>) -> Result<i64>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    async fn get_chat_member(&self, chat_id: i64, user_id: i64) -> Result<MemberStatus>;

    async fn answer_pre_checkout_query(&self, query_id: &str, ok: bool) -> Result<()>;
}
