pub mod stats;
pub mod users;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use stats::{DailyStats, StatField, TotalStats};
pub use users::{NewUser, UserProfile};

use crate::catalog::Locale;

/// Set holding every user id ever seen.
pub const ALL_USERS_SET: &str = "users:all";

/// Per-locale set name, e.g. `users:lang:it`.
pub fn locale_set(locale: Locale) -> String {
    format!("users:lang:{}", locale.as_str())
}

/// Why a registry call could not be served.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No database was configured at startup.
    #[error("registry is not configured")]
    NotConfigured,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Thread-safe SQLite store for users, recipient sets and daily counters.
#[derive(Clone)]
pub struct RegistryStore {
    conn: Arc<Mutex<Connection>>,
}

impl RegistryStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        // Migrate on the raw connection before wrapping it in the async Mutex.
        Self::run_migrations(&conn)?;

        info!("Registry initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                language_code TEXT NOT NULL,
                started_at TEXT NOT NULL,
                last_active_at TEXT NOT NULL
            );

            -- Named id sets (all users, users per locale)
            CREATE TABLE IF NOT EXISTS user_sets (
                name TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                added_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (name, user_id)
            );

            -- Date-bucketed counters
            CREATE TABLE IF NOT EXISTS daily_stats (
                date TEXT NOT NULL,
                field TEXT NOT NULL,
                value INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (date, field)
            );
            ",
        )
        .context("Failed to run registry migrations")?;
        Ok(())
    }
}

/// Registry handle given to the dispatcher.
///
/// Wraps an optional store so an unconfigured deployment surfaces
/// [`RegistryError::NotConfigured`] instead of a generic failure.
#[derive(Clone)]
pub struct Registry {
    store: Option<RegistryStore>,
    timezone: Tz,
}

impl Registry {
    pub fn new(store: Option<RegistryStore>, timezone: Tz) -> Self {
        if store.is_none() {
            warn!("Registry not configured: statistics and broadcasts are disabled");
        }
        Self { store, timezone }
    }

    pub fn unconfigured() -> Self {
        Self::new(None, chrono_tz::Europe::Madrid)
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> std::result::Result<&RegistryStore, RegistryError> {
        self.store.as_ref().ok_or(RegistryError::NotConfigured)
    }

    /// Calendar date of `now` in the registry's zone, as `YYYY-MM-DD`.
    pub fn bucket_date(&self, now: DateTime<Utc>) -> String {
        stats::bucket_date(now, self.timezone)
    }

    /// Insert or refresh a user. Returns `true` for a first-time user.
    pub async fn upsert_user(&self, user: &NewUser) -> std::result::Result<bool, RegistryError> {
        let now = Utc::now();
        let date = self.bucket_date(now);
        Ok(self.store()?.upsert_user(user, now, &date).await?)
    }

    pub async fn get_user(&self, id: i64) -> std::result::Result<Option<UserProfile>, RegistryError> {
        Ok(self.store()?.get_user(id).await?)
    }

    pub async fn list_users(&self) -> std::result::Result<Vec<UserProfile>, RegistryError> {
        Ok(self.store()?.list_users().await?)
    }

    pub async fn add_to_set(&self, set: &str, id: i64) -> std::result::Result<(), RegistryError> {
        Ok(self.store()?.add_to_set(set, id).await?)
    }

    pub async fn set_members(&self, set: &str) -> std::result::Result<Vec<i64>, RegistryError> {
        Ok(self.store()?.set_members(set).await?)
    }

    pub async fn all_user_ids(&self) -> std::result::Result<Vec<i64>, RegistryError> {
        self.set_members(ALL_USERS_SET).await
    }

    pub async fn user_ids_for_locale(
        &self,
        locale: Locale,
    ) -> std::result::Result<Vec<i64>, RegistryError> {
        self.set_members(&locale_set(locale)).await
    }

    /// Add `amount` to today's counter.
    pub async fn increment(
        &self,
        field: StatField,
        amount: i64,
    ) -> std::result::Result<(), RegistryError> {
        let date = self.bucket_date(Utc::now());
        Ok(self.store()?.increment(&date, field, amount).await?)
    }

    pub async fn daily_stats(&self, date: &str) -> std::result::Result<DailyStats, RegistryError> {
        Ok(self.store()?.daily_stats(date).await?)
    }

    /// Counters for the last `days` days ending today, oldest first.
    pub async fn stats_for_period(
        &self,
        days: u32,
    ) -> std::result::Result<Vec<DailyStats>, RegistryError> {
        let dates = stats::period_dates(Utc::now(), self.timezone, days);
        let store = self.store()?;
        let mut out = Vec::with_capacity(dates.len());
        for date in dates {
            out.push(store.daily_stats(&date).await?);
        }
        Ok(out)
    }

    pub async fn totals(&self) -> std::result::Result<TotalStats, RegistryError> {
        Ok(self.store()?.totals().await?)
    }
}
