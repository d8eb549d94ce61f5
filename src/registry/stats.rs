use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::{RegistryStore, ALL_USERS_SET};

/// Named daily counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    NewUsers,
    Interactions,
    StarsEarned,
}

impl StatField {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatField::NewUsers => "newUsers",
            StatField::Interactions => "interactions",
            StatField::StarsEarned => "starsEarned",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: String,
    pub new_users: i64,
    pub interactions: i64,
    pub stars_earned: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TotalStats {
    pub total_users: i64,
    pub total_interactions: i64,
    pub total_stars: i64,
}

/// Calendar date of `now` in `tz`, formatted `YYYY-MM-DD`.
pub fn bucket_date(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// The `days` bucket dates ending at `now`, oldest first.
pub fn period_dates(now: DateTime<Utc>, tz: Tz, days: u32) -> Vec<String> {
    let today = now.with_timezone(&tz).date_naive();
    (0..days as i64)
        .rev()
        .map(|back| (today - Duration::days(back)).format("%Y-%m-%d").to_string())
        .collect()
}

impl RegistryStore {
    pub async fn increment(&self, date: &str, field: StatField, amount: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO daily_stats (date, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(date, field) DO UPDATE SET value = value + excluded.value",
            rusqlite::params![date, field.as_str(), amount],
        )
        .with_context(|| format!("Failed to increment {} for {}", field.as_str(), date))?;
        Ok(())
    }

    /// Counters for one date; missing counters read as zero.
    pub async fn daily_stats(&self, date: &str) -> Result<DailyStats> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT field, value FROM daily_stats WHERE date = ?1")
            .context("Failed to prepare daily_stats query")?;
        let rows = stmt
            .query_map(rusqlite::params![date], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .context("Failed to map rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read daily stats")?;

        let mut stats = DailyStats {
            date: date.to_string(),
            ..Default::default()
        };
        for (field, value) in rows {
            match field.as_str() {
                "newUsers" => stats.new_users = value,
                "interactions" => stats.interactions = value,
                "starsEarned" => stats.stars_earned = value,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Lifetime totals across every stored date.
    pub async fn totals(&self) -> Result<TotalStats> {
        let conn = self.conn.lock().await;
        let total_users: i64 = conn
            .query_row(
                "SELECT count(*) FROM user_sets WHERE name = ?1",
                rusqlite::params![ALL_USERS_SET],
                |row| row.get(0),
            )
            .context("Failed to count users")?;
        let sum = |field: StatField| -> Result<i64> {
            conn.query_row(
                "SELECT coalesce(sum(value), 0) FROM daily_stats WHERE field = ?1",
                rusqlite::params![field.as_str()],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to sum {}", field.as_str()))
        };
        Ok(TotalStats {
            total_users,
            total_interactions: sum(StatField::Interactions)?,
            total_stars: sum(StatField::StarsEarned)?,
        })
    }
}
