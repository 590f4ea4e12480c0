use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use sqlx::PgPool;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::SiteInfo;
use crate::db::PgStore;
use crate::import;
use crate::mailer::Mailer;
use crate::models::ImportSummary;
use crate::options::{self, RuntimeSettings};
use crate::reminders::{ReminderManager, ReminderSettings, RunOutcome};
use crate::web::AppState;

/// Local hour the daily reminder run fires at.
pub const REMINDER_HOUR: u32 = 9;
const AUTO_SYNC_INTERVAL: StdDuration = StdDuration::from_secs(60 * 60);
const RETRY_DELAY: StdDuration = StdDuration::from_secs(60 * 60);

/// First `hour:00` strictly after `now`, today or tomorrow.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today.succ_opt()?;

    [today, tomorrow].into_iter().find_map(|date| {
        let local = date.and_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&local)
            .earliest()
            .filter(|candidate| candidate > now)
    })
}

pub fn next_reminder_run() -> Option<DateTime<Utc>> {
    next_daily_run(&Local::now(), REMINDER_HOUR).map(|next| next.with_timezone(&Utc))
}

/// Runs one reminder cycle against Postgres and records its outcome.
pub async fn run_reminder_job(
    pool: &PgPool,
    mailer: &dyn Mailer,
    site: &SiteInfo,
    settings: &RuntimeSettings,
    today: NaiveDate,
) -> Result<RunOutcome> {
    let store = PgStore::new(pool.clone());
    let outcome = ReminderManager::new(
        &store,
        mailer,
        site,
        ReminderSettings::resolve(settings, site),
    )
    .run(today)
    .await;

    if outcome.success {
        options::set(pool, options::REMINDERS_LAST_RUN, &Utc::now()).await?;
    }
    options::set(pool, options::LAST_REMINDER_RUN, &outcome).await?;
    Ok(outcome)
}

/// Imports from the configured sheet when auto-sync is on. Returns `None` when it is off.
pub async fn run_auto_sync_job(
    pool: &PgPool,
    client: &reqwest::Client,
    settings: &RuntimeSettings,
    today: NaiveDate,
) -> Result<Option<ImportSummary>> {
    if !settings.auto_sync {
        return Ok(None);
    }

    let store = PgStore::new(pool.clone());
    let summary = import::run_auto_sync(&store, client, Some(settings.sheet_url.as_str()), today).await?;
    options::set(pool, options::LAST_IMPORT_SUMMARY, &summary).await?;
    Ok(Some(summary))
}

pub fn spawn(state: AppState) {
    spawn_daily_reminders(state.clone());
    spawn_auto_sync(state);
}

fn spawn_daily_reminders(state: AppState) {
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let wait = match next_daily_run(&now, REMINDER_HOUR) {
                Some(next) => (next - now).to_std().unwrap_or(StdDuration::ZERO),
                None => {
                    warn!("could not compute next reminder run, retrying later");
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            info!(wait_secs = wait.as_secs(), "next reminder run scheduled");
            sleep(wait).await;

            match state.run_reminders().await {
                Ok(outcome) => info!(
                    emails_sent = outcome.emails_sent,
                    message = %outcome.message,
                    "scheduled reminder run finished"
                ),
                Err(err) => error!(?err, "scheduled reminder run failed"),
            }
        }
    });
}

fn spawn_auto_sync(state: AppState) {
    tokio::spawn(async move {
        loop {
            sleep(AUTO_SYNC_INTERVAL).await;

            match state.auto_sync().await {
                Ok(Some(summary)) => info!(
                    created = summary.created,
                    updated = summary.updated,
                    errors = summary.errors.len(),
                    "auto-sync import finished"
                ),
                Ok(None) => {}
                Err(err) => error!(?err, "auto-sync import failed"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_today_when_before_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 8, 30, 0).unwrap();
        let next = next_daily_run(&now, 9).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn rolls_to_tomorrow_at_or_after_the_hour() {
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_daily_run(&at, 9).unwrap(),
            Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0).unwrap()
        );

        let late = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(
            next_daily_run(&late, 9).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
        );
    }
}
