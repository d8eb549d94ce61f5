use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::access::AccessTier;
use crate::catalog::{ContentKind, Locale};
use crate::config::PricesConfig;
use crate::error::Result;
use crate::platform::{ChatApi, MediaMessage, PaidMedia};

/// What the dispatcher asks the delivery engine to send.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub recipient: i64,
    pub kind: ContentKind,
    pub locale: Locale,
    pub tier: AccessTier,
}

/// Returned only for a completed send; failures come back as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    /// Set only for paid (non-admin) sends; admin content is never retracted.
    pub delivered_message_id: Option<i64>,
}

/// Unique per-send payload, `{kind}_{chat_id}_{unix_millis}`.
pub fn payload_token(kind: ContentKind, chat_id: i64, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", kind, chat_id, at.timestamp_millis())
}

/// Prefix the caption with the sender's first name.
///
/// `"Ada", "Look at this"` → `"Ada, look at this"`; without a name the
/// caption's first letter is upper-cased instead.
pub fn personalize_caption(caption: &str, first_name: Option<&str>) -> String {
    let mut chars = caption.chars();
    let first = chars.next();
    let rest = chars.as_str();
    match (first_name.filter(|n| !n.is_empty()), first) {
        (Some(name), Some(c)) => format!("{}, {}{}", name, c.to_lowercase(), rest),
        (Some(name), None) => name.to_string(),
        (None, Some(c)) => format!("{}{}", c.to_uppercase(), rest),
        (None, None) => String::new(),
    }
}

/// Sends one content item, paid for regular users and free for the admin.
pub struct DeliveryEngine {
    api: Arc<dyn ChatApi>,
    prices: PricesConfig,
}

impl DeliveryEngine {
    pub fn new(api: Arc<dyn ChatApi>, prices: PricesConfig) -> Self {
        Self { api, prices }
    }

    /// Deliver `asset` to `chat_id`. Remote failures are returned as-is; the
    /// caller decides how to tell the user.
    pub async fn deliver(
        &self,
        chat_id: i64,
        kind: ContentKind,
        asset: &str,
        caption: &str,
        tier: AccessTier,
    ) -> Result<DeliveryReceipt> {
        if tier.is_admin() {
            self.api
                .send_media(
                    chat_id,
                    MediaMessage {
                        kind,
                        file_id: asset,
                        caption,
                        protect_content: true,
                        keyboard: None,
                    },
                )
                .await?;
            info!("Delivered free {} to admin chat {}", kind, chat_id);
            return Ok(DeliveryReceipt {
                delivered_message_id: None,
            });
        }

        let star_count = self.prices.price_for(kind);
        let message_id = self
            .api
            .send_paid_media(
                chat_id,
                PaidMedia {
                    kind,
                    file_id: asset,
                    caption,
                    star_count,
                    payload: payload_token(kind, chat_id, Utc::now()),
                    protect_content: true,
                },
            )
            .await?;

        info!(
            "Delivered paid {} ({} stars) to chat {} as message {}",
            kind, star_count, chat_id, message_id
        );
        Ok(DeliveryReceipt {
            delivered_message_id: Some(message_id),
        })
    }
}
