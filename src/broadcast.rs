use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{Advertisement, ContentKind, Locale};
use crate::platform::{ChatApi, MediaMessage, UrlButton};
use crate::registry::{Registry, RegistryError};
use crate::texts;

/// Recipient partition for an admin broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    All,
    Italian,
    Spanish,
    /// Everyone not in the Italian or Spanish sets.
    Other,
}

impl Partition {
    pub fn label(&self) -> &'static str {
        match self {
            Partition::All => "all chats",
            Partition::Italian => "Italian chats",
            Partition::Spanish => "Spanish chats",
            Partition::Other => "English/other chats",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastJob {
    pub partition: Partition,
    pub body: String,
    pub requester: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// `all − (it ∪ es)`, keeping the order of `all`.
pub fn other_locale_ids(all: &[i64], it: &[i64], es: &[i64]) -> Vec<i64> {
    let excluded: HashSet<i64> = it.iter().chain(es.iter()).copied().collect();
    all.iter()
        .copied()
        .filter(|id| !excluded.contains(id))
        .collect()
}

/// Sequential fan-out of admin messages to registry partitions.
pub struct BroadcastEngine {
    api: Arc<dyn ChatApi>,
    registry: Registry,
}

impl BroadcastEngine {
    pub fn new(api: Arc<dyn ChatApi>, registry: Registry) -> Self {
        Self { api, registry }
    }

    pub async fn recipients(&self, partition: Partition) -> Result<Vec<i64>, RegistryError> {
        match partition {
            Partition::All => self.registry.all_user_ids().await,
            Partition::Italian => self.registry.user_ids_for_locale(Locale::It).await,
            Partition::Spanish => self.registry.user_ids_for_locale(Locale::Es).await,
            Partition::Other => {
                let all = self.registry.all_user_ids().await?;
                let it = self.registry.user_ids_for_locale(Locale::It).await?;
                let es = self.registry.user_ids_for_locale(Locale::Es).await?;
                Ok(other_locale_ids(&all, &it, &es))
            }
        }
    }

    /// Send `job.body` to every recipient in the partition except the requester.
    ///
    /// Fails before any send when the registry is unavailable; per-recipient
    /// failures only bump the `failed` count.
    pub async fn broadcast(&self, job: &BroadcastJob) -> Result<BroadcastReport, RegistryError> {
        let recipients = self.recipients(job.partition).await?;
        let mut report = BroadcastReport::default();

        for user_id in recipients {
            if user_id == job.requester {
                continue;
            }
            match self.api.send_text(user_id, &job.body, None).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", user_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Broadcast to {} done: {} sent, {} failed",
            job.partition.label(),
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    /// Send the advertisement photo.
    ///
    /// A test run goes to the requester alone and yields no report; a real run
    /// needs the registry and reaches every known user.
    pub async fn send_advertisement(
        &self,
        requester: i64,
        ad: &Advertisement,
        test_only: bool,
    ) -> Result<Option<BroadcastReport>, RegistryError> {
        let recipients = if test_only {
            vec![requester]
        } else {
            self.registry.all_user_ids().await?
        };

        let caption = texts::normalize_markup(&ad.caption);
        let mut report = BroadcastReport::default();
        for user_id in recipients {
            let media = MediaMessage {
                kind: ContentKind::Photo,
                file_id: &ad.file_id,
                caption: &caption,
                protect_content: true,
                keyboard: Some(vec![vec![UrlButton::new(&ad.cta, &ad.url)]]),
            };
            match self.api.send_media(user_id, media).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    warn!("Advertisement to {} failed: {}", user_id, e);
                    report.failed += 1;
                }
            }
        }

        if test_only {
            Ok(None)
        } else {
            Ok(Some(report))
        }
    }
}
