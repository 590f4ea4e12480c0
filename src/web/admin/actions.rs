use std::collections::HashMap;

use axum::extract::{Form, Multipart, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{Duration, Local, NaiveDate};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{self, PgStore};
use crate::email;
use crate::import;
use crate::mailer::OutgoingEmail;
use crate::models::{ImportSummary, ReminderBucket, Status};
use crate::options::{self, BucketTemplate, TRANSIENT_TTL_MINUTES};
use crate::reminders;
use crate::scheduler;
use crate::store::ScholarshipStore;
use crate::web::responses::internal_error;
use crate::web::AppState;

use super::auth::require_admin;

const DASHBOARD: &str = "/admin";
pub const DEFAULT_CLEANUP_DAYS: i64 = 180;

fn to_dashboard(query: &str) -> Response {
    Redirect::to(&format!("{DASHBOARD}?{query}")).into_response()
}

/// Keeps the failure text for the next dashboard render, then redirects with the error code.
async fn fail_with(state: &AppState, code: &str, detail: impl Into<String>) -> Response {
    let detail = detail.into();
    if let Err(err) = options::set_transient(
        state.pool(),
        options::FLASH_ERROR,
        &detail,
        Duration::minutes(TRANSIENT_TTL_MINUTES),
    )
    .await
    {
        warn!(?err, "failed to store flash error");
    }
    to_dashboard(&format!("error={code}"))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn import_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut csv_url: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return fail_with(&state, "import_failed", err.to_string()).await,
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("csv_file") => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                match field.bytes().await {
                    Ok(bytes) if !bytes.is_empty() => upload = Some((file_name, bytes.to_vec())),
                    Ok(_) => {}
                    Err(err) => return fail_with(&state, "import_failed", err.to_string()).await,
                }
            }
            Some("csv_url") => {
                csv_url = non_blank(field.text().await.ok());
            }
            _ => {}
        }
    }

    let store = PgStore::new(state.pool().clone());
    let result = match (upload, csv_url) {
        (Some((name, content)), _) => import::import_bytes(&store, &content, &name, today()).await,
        (None, Some(url)) => import::import_url(&store, state.http(), &url, today()).await,
        (None, None) => {
            import::log_missing_source(&store).await;
            return to_dashboard("error=missing_csv");
        }
    };

    match result {
        Ok(summary) => {
            record_summary(&state, &summary).await;
            to_dashboard("status=imported")
        }
        Err(err) => fail_with(&state, "import_failed", format!("{err:#}")).await,
    }
}

async fn record_summary(state: &AppState, summary: &ImportSummary) {
    if let Err(err) = options::set(state.pool(), options::LAST_IMPORT_SUMMARY, summary).await {
        warn!(?err, "failed to store last import summary");
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    webhook_secret: String,
    #[serde(default)]
    sheet_url: String,
    #[serde(default)]
    auto_sync: Option<String>,
    #[serde(default)]
    reminders_enabled: Option<String>,
    #[serde(default)]
    from_name: Option<String>,
    #[serde(default)]
    from_email: Option<String>,
}

pub async fn save_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SettingsForm>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let mut settings = state.settings().await;
    settings.webhook_secret = form.webhook_secret.trim().to_string();
    settings.sheet_url = form.sheet_url.trim().to_string();
    settings.auto_sync = form.auto_sync.is_some();
    settings.reminders_enabled = form.reminders_enabled.is_some();
    settings.from_name = non_blank(form.from_name);
    settings.from_email = non_blank(form.from_email);

    match state.save_settings(settings).await {
        Ok(()) => {
            info!("runtime settings updated");
            to_dashboard("status=settings_saved")
        }
        Err(err) => fail_with(&state, "save_failed", format!("{err:#}")).await,
    }
}

/// Builds per-bucket templates from `subject_<bucket>` / `message_<bucket>` form fields.
pub fn templates_from_form(
    form: &HashMap<String, String>,
) -> std::collections::BTreeMap<ReminderBucket, BucketTemplate> {
    ReminderBucket::ALL
        .iter()
        .map(|bucket| {
            let field = |prefix: &str| non_blank(form.get(&format!("{prefix}_{bucket}")).cloned());
            (
                *bucket,
                BucketTemplate {
                    subject: field("subject"),
                    message: field("message"),
                },
            )
        })
        .filter(|(_, template)| template.subject.is_some() || template.message.is_some())
        .collect()
}

pub async fn save_templates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let mut settings = state.settings().await;
    settings.templates = templates_from_form(&form);

    match state.save_settings(settings).await {
        Ok(()) => to_dashboard("status=templates_saved"),
        Err(err) => fail_with(&state, "save_failed", format!("{err:#}")).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct TestEmailForm {
    email: String,
}

pub async fn send_test_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TestEmailForm>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let to = form.email.trim().to_string();
    if !looks_like_email(&to) {
        return to_dashboard("error=invalid_email");
    }

    let settings = state.settings().await;
    let (from_name, from_email) = reminders::sender(&settings, state.site());
    let composed = email::compose_test("there", today(), state.site());
    let outgoing = OutgoingEmail {
        to: to.clone(),
        from_name,
        from_email,
        subject: composed.subject,
        html: composed.html,
    };

    match state.mailer().send(&outgoing).await {
        Ok(()) => {
            info!(%to, "test email sent");
            to_dashboard("status=test_sent")
        }
        Err(err) => {
            error!(?err, %to, "test email failed");
            fail_with(&state, "test_failed", format!("{err:#}")).await
        }
    }
}

pub fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

pub async fn run_reminders(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match state.run_reminders().await {
        Ok(outcome) if outcome.success => to_dashboard("status=reminders_run"),
        Ok(outcome) => fail_with(&state, "reminders_failed", outcome.message).await,
        Err(err) => fail_with(&state, "reminders_failed", format!("{err:#}")).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct CleanupForm {
    #[serde(default)]
    days: Option<i64>,
}

pub async fn cleanup_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CleanupForm>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let days = form.days.filter(|d| *d > 0).unwrap_or(DEFAULT_CLEANUP_DAYS);
    match db::cleanup_old_reminders(state.pool(), days).await {
        Ok(removed) => {
            info!(removed, days, "old reminder records removed");
            to_dashboard("status=cleaned")
        }
        Err(err) => fail_with(&state, "save_failed", format!("{err:#}")).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct ScholarshipForm {
    id: Uuid,
}

pub async fn delete_scholarship(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ScholarshipForm>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let store = PgStore::new(state.pool().clone());
    match store.delete_scholarship(form.id).await {
        Ok(true) => {
            info!(id = %form.id, "scholarship deleted");
            to_dashboard("status=deleted")
        }
        Ok(false) => to_dashboard("error=not_found"),
        Err(err) => fail_with(&state, "save_failed", format!("{err:#}")).await,
    }
}

pub async fn reset_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ScholarshipForm>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match db::clear_reminders(state.pool(), form.id).await {
        Ok(removed) => {
            info!(id = %form.id, removed, "reminder log reset");
            to_dashboard("status=reminders_reset")
        }
        Err(err) => fail_with(&state, "save_failed", format!("{err:#}")).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateForm {
    id: Uuid,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub async fn update_scholarship(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<UpdateForm>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    let deadline = match non_blank(form.deadline) {
        Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => return to_dashboard("error=invalid_date"),
        },
        None => None,
    };
    let status = match non_blank(form.status) {
        Some(raw) => match raw.parse::<Status>() {
            Ok(status) => Some(status),
            Err(_) => return to_dashboard("error=invalid_status"),
        },
        None => None,
    };

    let store = PgStore::new(state.pool().clone());
    match store.update_deadline_status(form.id, deadline, status).await {
        Ok(true) => to_dashboard("status=updated"),
        Ok(false) => to_dashboard("error=not_found"),
        Err(err) => fail_with(&state, "save_failed", format!("{err:#}")).await,
    }
}

pub async fn reminder_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match db::reminder_stats(state.pool(), scheduler::next_reminder_run()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn import_logs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match options::import_logs(state.pool()).await {
        Ok(logs) => Json(logs).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn user_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match db::user_reminders(state.pool(), user_id).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn scholarship_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(scholarship_id): Path<Uuid>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match db::scholarship_reminders(state.pool(), scholarship_id).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_fields_map_to_buckets() {
        let form: HashMap<String, String> = [
            ("subject_30_days", "Heads up, {user_name}"),
            ("message_30_days", ""),
            ("subject_5_days", "  "),
            ("message_5_days", "Only {days_remaining} days left"),
            ("subject_15_days", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let templates = templates_from_form(&form);
        assert_eq!(templates.len(), 2);
        assert_eq!(
            templates[&ReminderBucket::ThirtyDays].subject.as_deref(),
            Some("Heads up, {user_name}")
        );
        assert_eq!(templates[&ReminderBucket::ThirtyDays].message, None);
        assert_eq!(templates[&ReminderBucket::FiveDays].subject, None);
        assert!(!templates.contains_key(&ReminderBucket::FifteenDays));
    }

    #[test]
    fn validates_email_shape() {
        assert!(looks_like_email("pilot@example.com"));
        assert!(!looks_like_email("pilot@localhost"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("pilot example@example.com"));
        assert!(!looks_like_email("pilot.example.com"));
    }
}
