use std::sync::Arc;
use tracing::{debug, warn};

use crate::platform::ChatApi;

/// Per-event access level of a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Admin,
    RegularSubscribed,
    RegularUnsubscribed,
}

impl AccessTier {
    pub fn is_admin(&self) -> bool {
        matches!(self, AccessTier::Admin)
    }
}

/// Admin check plus channel-subscription gate.
pub struct AccessPolicy {
    admin_id: i64,
    channel_id: i64,
    api: Arc<dyn ChatApi>,
}

impl AccessPolicy {
    pub fn new(admin_id: i64, channel_id: i64, api: Arc<dyn ChatApi>) -> Self {
        Self {
            admin_id,
            channel_id,
            api,
        }
    }

    pub fn is_admin(&self, sender_id: i64) -> bool {
        sender_id == self.admin_id
    }

    /// Resolve the sender's tier. The admin never triggers a membership lookup;
    /// a failed lookup counts as not subscribed.
    pub async fn resolve_tier(&self, sender_id: i64) -> AccessTier {
        if self.is_admin(sender_id) {
            return AccessTier::Admin;
        }

        match self.api.get_chat_member(self.channel_id, sender_id).await {
            Ok(status) if status.is_subscribed() => AccessTier::RegularSubscribed,
            Ok(status) => {
                debug!("User {} not subscribed (status {:?})", sender_id, status);
                AccessTier::RegularUnsubscribed
            }
            Err(e) => {
                warn!("Membership check failed for user {}: {}", sender_id, e);
                AccessTier::RegularUnsubscribed
            }
        }
    }
}
