use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SiteInfo;
use crate::email::{self, ScholarshipEmailData};
use crate::mailer::{Mailer, OutgoingEmail};
use crate::models::{ReminderBucket, Scholarship};
use crate::options::{BucketTemplate, RuntimeSettings};
use crate::store::ReminderStore;

/// Upper bound on emails sent in one run.
pub const BATCH_LIMIT: usize = 50;
pub const DISABLED_MESSAGE: &str = "Email reminders are currently disabled in settings";

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub from_name: String,
    pub from_email: String,
    pub templates: BTreeMap<ReminderBucket, BucketTemplate>,
}

impl ReminderSettings {
    pub fn resolve(settings: &RuntimeSettings, site: &SiteInfo) -> Self {
        Self {
            enabled: settings.reminders_enabled,
            from_name: non_blank_or(&settings.from_name, &site.name),
            from_email: non_blank_or(&settings.from_email, &site.admin_email),
            templates: settings.templates.clone(),
        }
    }

    fn template(&self, bucket: ReminderBucket) -> BucketTemplate {
        self.templates.get(&bucket).cloned().unwrap_or_default()
    }
}

fn non_blank_or(value: &Option<String>, fallback: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => fallback.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub emails_sent: usize,
    pub breakdown: BTreeMap<ReminderBucket, usize>,
    pub duration_secs: f64,
    pub message: String,
}

fn empty_breakdown() -> BTreeMap<ReminderBucket, usize> {
    ReminderBucket::ALL.iter().map(|bucket| (*bucket, 0)).collect()
}

pub fn target_date(today: NaiveDate, bucket: ReminderBucket) -> NaiveDate {
    today + Duration::days(bucket.days())
}

pub fn results_message(total_sent: usize, breakdown: &BTreeMap<ReminderBucket, usize>) -> String {
    if total_sent == 0 {
        return "No reminder emails were sent. This could mean: (1) No scholarships have deadlines \
                30, 15, or 5 days from today, (2) No users have favorited scholarships with upcoming \
                deadlines, or (3) All due reminders have already been sent."
            .to_string();
    }

    let parts: Vec<String> = ReminderBucket::ALL
        .iter()
        .filter_map(|bucket| {
            breakdown
                .get(bucket)
                .filter(|count| **count > 0)
                .map(|count| format!("{count} for {}-day deadline", bucket.days()))
        })
        .collect();

    let detail = if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    };
    format!("Successfully sent {total_sent} reminder email(s){detail}.")
}

pub struct ReminderManager<'a> {
    store: &'a dyn ReminderStore,
    mailer: &'a dyn Mailer,
    site: &'a SiteInfo,
    settings: ReminderSettings,
    batch_limit: usize,
}

impl<'a> ReminderManager<'a> {
    pub fn new(
        store: &'a dyn ReminderStore,
        mailer: &'a dyn Mailer,
        site: &'a SiteInfo,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            site,
            settings,
            batch_limit: BATCH_LIMIT,
        }
    }

    #[cfg(test)]
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// One reminder cycle: every bucket in order until the batch limit is spent.
    pub async fn run(&self, today: NaiveDate) -> RunOutcome {
        if !self.settings.enabled {
            info!("email reminders are disabled");
            return RunOutcome {
                success: false,
                emails_sent: 0,
                breakdown: empty_breakdown(),
                duration_secs: 0.0,
                message: DISABLED_MESSAGE.to_string(),
            };
        }

        info!(%today, "starting reminder run");
        let started = Instant::now();
        let mut breakdown = empty_breakdown();
        let mut total_sent = 0usize;

        for bucket in ReminderBucket::ALL {
            let budget = self.batch_limit.saturating_sub(total_sent);
            let sent = self.process_bucket(bucket, today, budget).await;
            breakdown.insert(bucket, sent);
            total_sent += sent;

            if total_sent >= self.batch_limit {
                info!(batch_limit = self.batch_limit, "batch limit reached, stopping run");
                break;
            }
        }

        let duration_secs = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        info!(total_sent, duration_secs, "reminder run completed");

        RunOutcome {
            success: true,
            emails_sent: total_sent,
            message: results_message(total_sent, &breakdown),
            breakdown,
            duration_secs,
        }
    }

    async fn process_bucket(&self, bucket: ReminderBucket, today: NaiveDate, budget: usize) -> usize {
        if budget == 0 {
            return 0;
        }

        let target = target_date(today, bucket);
        let scholarships = match self.store.active_scholarships_due(target).await {
            Ok(scholarships) => scholarships,
            Err(err) => {
                error!(?err, %bucket, %target, "failed to load scholarships due");
                return 0;
            }
        };

        if scholarships.is_empty() {
            info!(%bucket, %target, "no scholarships due");
            return 0;
        }
        info!(%bucket, %target, count = scholarships.len(), "scholarships due");

        let mut per_user: BTreeMap<Uuid, Vec<&Scholarship>> = BTreeMap::new();
        for scholarship in &scholarships {
            let users = match self.store.favorited_by(scholarship.id).await {
                Ok(users) => users,
                Err(err) => {
                    error!(?err, scholarship_id = %scholarship.id, "failed to load favorites");
                    continue;
                }
            };

            for user_id in users {
                match self
                    .store
                    .reminder_exists(user_id, scholarship.id, bucket)
                    .await
                {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(err) => {
                        error!(?err, %user_id, scholarship_id = %scholarship.id, "failed to check reminder log");
                        continue;
                    }
                }

                let entry = per_user.entry(user_id).or_default();
                if !entry.iter().any(|existing| existing.id == scholarship.id) {
                    entry.push(scholarship);
                }
            }
        }

        let mut sent = 0usize;
        for (user_id, due) in per_user {
            if self.send_user_reminder(user_id, &due, bucket, target).await {
                sent += 1;
            }
            if sent >= budget {
                break;
            }
        }

        sent
    }

    async fn send_user_reminder(
        &self,
        user_id: Uuid,
        scholarships: &[&Scholarship],
        bucket: ReminderBucket,
        target: NaiveDate,
    ) -> bool {
        let recipient = match self.store.recipient(user_id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                warn!(%user_id, "reminder recipient not found");
                return false;
            }
            Err(err) => {
                error!(?err, %user_id, "failed to load reminder recipient");
                return false;
            }
        };

        let data: Vec<ScholarshipEmailData> = scholarships
            .iter()
            .map(|scholarship| ScholarshipEmailData::from_scholarship(scholarship, self.site))
            .collect();
        if data.is_empty() {
            return false;
        }

        let composed = email::compose_reminder(
            &recipient,
            &data,
            bucket,
            &self.settings.template(bucket),
            self.site,
        );
        let outgoing = OutgoingEmail {
            to: recipient.email.clone(),
            from_name: self.settings.from_name.clone(),
            from_email: self.settings.from_email.clone(),
            subject: composed.subject,
            html: composed.html,
        };

        if let Err(err) = self.mailer.send(&outgoing).await {
            warn!(?err, to = %recipient.email, %bucket, "failed to send reminder email");
            return false;
        }
        info!(to = %recipient.email, %bucket, scholarships = scholarships.len(), "reminder email sent");

        for scholarship in scholarships {
            if let Err(err) = self
                .store
                .record_reminder(user_id, scholarship.id, bucket, target)
                .await
            {
                error!(?err, %user_id, scholarship_id = %scholarship.id, "failed to record reminder");
            }
        }

        true
    }
}

/// Sender identity resolved for one-off emails like the admin test message.
pub fn sender(settings: &RuntimeSettings, site: &SiteInfo) -> (String, String) {
    let resolved = ReminderSettings::resolve(settings, site);
    (resolved.from_name, resolved.from_email)
}

/// Reminder counts keyed by bucket, for dashboards.
pub fn count_by_bucket(rows: &[(String, i64)]) -> Vec<(ReminderBucket, i64)> {
    let counts: HashMap<&str, i64> = rows.iter().map(|(key, n)| (key.as_str(), *n)).collect();
    ReminderBucket::ALL
        .iter()
        .map(|bucket| (*bucket, counts.get(bucket.as_str()).copied().unwrap_or(0)))
        .collect()
}
