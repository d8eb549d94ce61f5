use chrono::Utc;
use tracing::{info, warn};

use crate::registry::{Registry, RegistryError};
use crate::scheduler::{RetractionScheduler, Scheduler};

/// Register built-in background jobs
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    registry: Registry,
    retractions: RetractionScheduler,
) -> anyhow::Result<()> {
    // Heartbeat: hourly liveness line with pending retractions and today's counters
    scheduler
        .add_cron_job("0 0 * * * *", "heartbeat", move || {
            let registry = registry.clone();
            let retractions = retractions.clone();
            Box::pin(async move {
                heartbeat(&registry, &retractions).await;
            })
        })
        .await?;

    Ok(())
}

async fn heartbeat(registry: &Registry, retractions: &RetractionScheduler) {
    let pending = retractions.len().await;
    let today = registry.bucket_date(Utc::now());
    match registry.daily_stats(&today).await {
        Ok(stats) => info!(
            "Heartbeat: {} pending retractions; {} new users, {} interactions, {} stars today",
            pending, stats.new_users, stats.interactions, stats.stars_earned
        ),
        Err(RegistryError::NotConfigured) => {
            info!("Heartbeat: {} pending retractions", pending)
        }
        Err(e) => warn!("Heartbeat could not read stats: {}", e),
    }
}
