use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{locale_set, RegistryStore, StatField, ALL_USERS_SET};
use crate::catalog::Locale;

/// Profile fields captured from an inbound message.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub locale: Locale,
}

/// A stored user, serialized as the stats endpoint reports it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub language_code: String,
    pub started_at: String,
    pub last_active_at: String,
}

impl RegistryStore {
    /// Insert or refresh a user profile.
    ///
    /// A first-time user gets `started_at`, joins the all-users and locale
    /// sets, and bumps `newUsers` for `date`. Returns whether the user is new.
    pub async fn upsert_user(&self, user: &NewUser, now: DateTime<Utc>, date: &str) -> Result<bool> {
        let now = now.to_rfc3339();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin upsert")?;

        let exists: bool = tx
            .query_row(
                "SELECT count(*) > 0 FROM users WHERE id = ?1",
                rusqlite::params![user.id],
                |row| row.get(0),
            )
            .context("Failed to look up user")?;

        if exists {
            tx.execute(
                "UPDATE users SET username = ?2, first_name = ?3, last_name = ?4,
                        language_code = ?5, last_active_at = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.first_name,
                    user.last_name,
                    user.locale.as_str(),
                    &now,
                ],
            )
            .context("Failed to update user")?;
        } else {
            tx.execute(
                "INSERT INTO users
                 (id, username, first_name, last_name, language_code, started_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.first_name,
                    user.last_name,
                    user.locale.as_str(),
                    &now,
                ],
            )
            .context("Failed to insert user")?;

            for set in [ALL_USERS_SET.to_string(), locale_set(user.locale)] {
                tx.execute(
                    "INSERT OR IGNORE INTO user_sets (name, user_id) VALUES (?1, ?2)",
                    rusqlite::params![set, user.id],
                )
                .context("Failed to add user to set")?;
            }

            tx.execute(
                "INSERT INTO daily_stats (date, field, value) VALUES (?1, ?2, 1)
                 ON CONFLICT(date, field) DO UPDATE SET value = value + 1",
                rusqlite::params![date, StatField::NewUsers.as_str()],
            )
            .context("Failed to count new user")?;
        }

        tx.commit().context("Failed to commit upsert")?;
        Ok(!exists)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, username, first_name, last_name, language_code, started_at, last_active_at
                 FROM users WHERE id = ?1",
            )
            .context("Failed to prepare get_user query")?;
        let mut rows = stmt
            .query_map(rusqlite::params![id], parse_user_row)
            .context("Failed to query user")?;
        match rows.next() {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(e)) => Err(e).context("Failed to read user row"),
            None => Ok(None),
        }
    }

    /// All users, most recently active first.
    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, username, first_name, last_name, language_code, started_at, last_active_at
                 FROM users ORDER BY last_active_at DESC, id ASC",
            )
            .context("Failed to prepare list_users query")?;
        let users = stmt
            .query_map([], parse_user_row)
            .context("Failed to map rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect users")?;
        Ok(users)
    }

    pub async fn add_to_set(&self, set: &str, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO user_sets (name, user_id) VALUES (?1, ?2)",
            rusqlite::params![set, id],
        )
        .with_context(|| format!("Failed to add {} to {}", id, set))?;
        Ok(())
    }

    /// Members of a named set in insertion order.
    pub async fn set_members(&self, set: &str) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT user_id FROM user_sets WHERE name = ?1 ORDER BY rowid ASC")
            .context("Failed to prepare set_members query")?;
        let ids = stmt
            .query_map(rusqlite::params![set], |row| row.get(0))
            .context("Failed to map rows")?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .with_context(|| format!("Failed to read set {}", set))?;
        Ok(ids)
    }
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        language_code: row.get(4)?,
        started_at: row.get(5)?,
        last_active_at: row.get(6)?,
    })
}
