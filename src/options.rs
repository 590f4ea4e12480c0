use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::import::{push_bounded, MAX_LOGS};
use crate::models::{ImportLogEntry, ReminderBucket};

pub const SETTINGS: &str = "settings";
pub const IMPORT_LOGS: &str = "import_logs";
pub const REMINDERS_LAST_RUN: &str = "reminders_last_run";
pub const LAST_IMPORT_SUMMARY: &str = "last_import_summary";
pub const LAST_REMINDER_RUN: &str = "last_reminder_run";
pub const FLASH_ERROR: &str = "flash_error";

/// Lifetime of flash-style transient options.
pub const TRANSIENT_TTL_MINUTES: i64 = 5;

/// Per-bucket overrides for reminder emails. Empty values fall back to the built-in copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketTemplate {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Settings editable from the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub webhook_secret: String,
    pub sheet_url: String,
    pub auto_sync: bool,
    pub reminders_enabled: bool,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub templates: BTreeMap<ReminderBucket, BucketTemplate>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            sheet_url: String::new(),
            auto_sync: false,
            reminders_enabled: true,
            from_name: None,
            from_email: None,
            templates: BTreeMap::new(),
        }
    }
}

impl RuntimeSettings {
    pub async fn load(pool: &PgPool) -> Result<Self> {
        Ok(get(pool, SETTINGS).await?.unwrap_or_default())
    }

    pub async fn save(&self, pool: &PgPool) -> Result<()> {
        set(pool, SETTINGS, self).await
    }

    pub fn template(&self, bucket: ReminderBucket) -> BucketTemplate {
        self.templates.get(&bucket).cloned().unwrap_or_default()
    }
}

/// Reads an option, ignoring transients past their expiry.
pub async fn get<T: DeserializeOwned>(pool: &PgPool, name: &str) -> Result<Option<T>> {
    let row = sqlx::query(
        "SELECT value FROM aviation.options
         WHERE name = $1 AND (expires_at IS NULL OR expires_at > NOW())",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to read option {name}"))?;

    match row {
        Some(row) => {
            let value: serde_json::Value = row.try_get("value")?;
            let parsed = serde_json::from_value(value)
                .with_context(|| format!("option {name} has an unexpected shape"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

pub async fn set<T: Serialize + ?Sized>(pool: &PgPool, name: &str, value: &T) -> Result<()> {
    write(pool, name, value, None).await
}

pub async fn set_transient<T: Serialize + ?Sized>(
    pool: &PgPool,
    name: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    write(pool, name, value, Some(Utc::now() + ttl)).await
}

async fn write<T: Serialize + ?Sized>(
    pool: &PgPool,
    name: &str,
    value: &T,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let value = serde_json::to_value(value)?;
    sqlx::query(
        "INSERT INTO aviation.options (name, value, expires_at) VALUES ($1, $2, $3)
         ON CONFLICT (name) DO UPDATE
         SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at, updated_at = NOW()",
    )
    .bind(name)
    .bind(value)
    .bind(expires_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to write option {name}"))?;
    Ok(())
}

pub async fn delete(pool: &PgPool, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM aviation.options WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete option {name}"))?;
    Ok(())
}

/// Appends to the rolling import log under a row lock so concurrent imports don't drop entries.
pub async fn append_import_log(pool: &PgPool, entry: ImportLogEntry) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO aviation.options (name, value) VALUES ($1, '[]'::jsonb)
         ON CONFLICT (name) DO NOTHING",
    )
    .bind(IMPORT_LOGS)
    .execute(&mut *tx)
    .await?;

    let current: serde_json::Value =
        sqlx::query_scalar("SELECT value FROM aviation.options WHERE name = $1 FOR UPDATE")
            .bind(IMPORT_LOGS)
            .fetch_one(&mut *tx)
            .await
            .context("failed to lock import log")?;

    let mut logs: Vec<ImportLogEntry> = serde_json::from_value(current).unwrap_or_default();
    push_bounded(&mut logs, entry, MAX_LOGS);

    sqlx::query("UPDATE aviation.options SET value = $2, updated_at = NOW() WHERE name = $1")
        .bind(IMPORT_LOGS)
        .bind(serde_json::to_value(&logs)?)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn import_logs(pool: &PgPool) -> Result<Vec<ImportLogEntry>> {
    Ok(get(pool, IMPORT_LOGS).await?.unwrap_or_default())
}
