use std::fmt::Write;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use crate::db;
use crate::html::escape_html;
use crate::models::{ImportLogEntry, ImportSummary, ReminderBucket, ReminderStats};
use crate::options::{self, RuntimeSettings};
use crate::reminders::RunOutcome;
use crate::scheduler;
use crate::web::responses::internal_error;
use crate::web::AppState;

use super::auth::require_admin;
use super::flash::compose_flash_message;

const DASHBOARD_LOG_ENTRIES: usize = 15;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub status: Option<String>,
    pub error: Option<String>,
}

/// Everything the dashboard page shows, loaded up front.
pub struct DashboardData {
    pub flash: String,
    pub last_import: Option<ImportSummary>,
    pub logs: Vec<ImportLogEntry>,
    pub stats: ReminderStats,
    pub last_run: Option<RunOutcome>,
    pub settings: RuntimeSettings,
    pub scholarship_count: i64,
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DashboardQuery>,
) -> Response {
    if let Err(rejection) = require_admin(&state, &headers) {
        return rejection;
    }

    match load(&state, &params).await {
        Ok(data) => Html(render(&data)).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

async fn load(state: &AppState, params: &DashboardQuery) -> anyhow::Result<DashboardData> {
    let pool = state.pool();

    let detail: Option<String> = if params.error.is_some() {
        let detail = options::get(pool, options::FLASH_ERROR).await?;
        if let Err(err) = options::delete(pool, options::FLASH_ERROR).await {
            warn!(?err, "failed to clear flash error");
        }
        detail
    } else {
        None
    };

    Ok(DashboardData {
        flash: compose_flash_message(
            params.status.as_deref(),
            params.error.as_deref(),
            detail.as_deref(),
        ),
        last_import: options::get(pool, options::LAST_IMPORT_SUMMARY).await?,
        logs: options::import_logs(pool).await?,
        stats: db::reminder_stats(pool, scheduler::next_reminder_run()).await?,
        last_run: options::get(pool, options::LAST_REMINDER_RUN).await?,
        settings: state.settings().await,
        scholarship_count: db::scholarship_count(pool).await?,
    })
}

fn checked(on: bool) -> &'static str {
    if on {
        " checked"
    } else {
        ""
    }
}

fn opt(value: &Option<String>) -> String {
    escape_html(value.as_deref().unwrap_or_default())
}

pub fn render(data: &DashboardData) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Aviation Scholarships Admin</title></head>\n<body>");
    let _ = writeln!(out, "<h1>Aviation Scholarships</h1>");
    let _ = writeln!(out, "{}", data.flash);
    let _ = writeln!(out, "<p>{} scholarships stored.</p>", data.scholarship_count);

    let _ = writeln!(out, "<h2>Last Import</h2>");
    match &data.last_import {
        Some(summary) => {
            let _ = writeln!(
                out,
                "<p>Created: {} &middot; Updated: {} &middot; Errors: {}</p>",
                summary.created,
                summary.updated,
                summary.errors.len()
            );
            if !summary.errors.is_empty() {
                let _ = writeln!(out, "<ul>");
                for error in &summary.errors {
                    let _ = writeln!(out, "<li>{}</li>", escape_html(error));
                }
                let _ = writeln!(out, "</ul>");
            }
        }
        None => {
            let _ = writeln!(out, "<p>No import has run yet.</p>");
        }
    }

    let _ = writeln!(out, "<h2>Import</h2>");
    let _ = writeln!(
        out,
        r#"<form method="post" action="/admin/import" enctype="multipart/form-data">
<input type="file" name="csv_file" accept=".csv,text/csv">
<input type="url" name="csv_url" placeholder="https://docs.google.com/.../export?format=csv">
<button type="submit">Import</button>
</form>"#
    );

    let _ = writeln!(out, "<h2>Import Log</h2>");
    if data.logs.is_empty() {
        let _ = writeln!(out, "<p>No log entries.</p>");
    } else {
        let _ = writeln!(out, "<table>\n<tr><th>Time</th><th>Level</th><th>Message</th></tr>");
        for entry in data.logs.iter().rev().take(DASHBOARD_LOG_ENTRIES) {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{:?}</td><td>{}</td></tr>",
                entry.at.format("%Y-%m-%d %H:%M:%S"),
                entry.level,
                escape_html(&entry.message)
            );
        }
        let _ = writeln!(out, "</table>");
    }

    let _ = writeln!(out, "<h2>Reminders</h2>");
    let _ = writeln!(out, "<ul>");
    let _ = writeln!(out, "<li>Total sent: {}</li>", data.stats.total_sent);
    for (bucket, count) in &data.stats.by_type {
        let _ = writeln!(out, "<li>{}-day reminders: {count}</li>", bucket.days());
    }
    let _ = writeln!(out, "<li>Sent in the last 30 days: {}</li>", data.stats.last_30_days);
    let _ = writeln!(
        out,
        "<li>Last run: {}</li>",
        data.stats
            .last_run
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    let _ = writeln!(
        out,
        "<li>Next scheduled: {}</li>",
        data.stats
            .next_scheduled
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "not scheduled".to_string())
    );
    let _ = writeln!(out, "</ul>");
    if let Some(run) = &data.last_run {
        let _ = writeln!(out, "<p>{}</p>", escape_html(&run.message));
    }
    let _ = writeln!(
        out,
        r#"<form method="post" action="/admin/reminders/run"><button type="submit">Send Reminders Now</button></form>
<form method="post" action="/admin/reminders/test"><input type="email" name="email" required><button type="submit">Send Test Email</button></form>
<form method="post" action="/admin/reminders/cleanup"><input type="number" name="days" value="180" min="1"><button type="submit">Remove Old Records</button></form>"#
    );

    let settings = &data.settings;
    let _ = writeln!(out, "<h2>Settings</h2>");
    let _ = writeln!(
        out,
        r#"<form method="post" action="/admin/settings">
<label>Webhook secret <input type="text" name="webhook_secret" value="{}"></label>
<label>Sheet CSV URL <input type="url" name="sheet_url" value="{}"></label>
<label><input type="checkbox" name="auto_sync"{}> Sync hourly</label>
<label><input type="checkbox" name="reminders_enabled"{}> Send reminder emails</label>
<label>From name <input type="text" name="from_name" value="{}"></label>
<label>From email <input type="email" name="from_email" value="{}"></label>
<button type="submit">Save Settings</button>
</form>"#,
        escape_html(&settings.webhook_secret),
        escape_html(&settings.sheet_url),
        checked(settings.auto_sync),
        checked(settings.reminders_enabled),
        opt(&settings.from_name),
        opt(&settings.from_email),
    );

    let _ = writeln!(out, "<h2>Email Templates</h2>");
    let _ = writeln!(
        out,
        "<p>Placeholders: {{user_name}}, {{scholarship_title}}, {{days_remaining}}, {{deadline_date}}, {{site_name}}</p>"
    );
    let _ = writeln!(out, r#"<form method="post" action="/admin/templates">"#);
    for bucket in ReminderBucket::ALL {
        let template = settings.template(bucket);
        let _ = writeln!(
            out,
            r#"<fieldset><legend>{days}-day reminder</legend>
<label>Subject <input type="text" name="subject_{key}" value="{subject}"></label>
<label>Message <textarea name="message_{key}">{message}</textarea></label>
</fieldset>"#,
            days = bucket.days(),
            key = bucket.as_str(),
            subject = opt(&template.subject),
            message = opt(&template.message),
        );
    }
    let _ = writeln!(out, r#"<button type="submit">Save Templates</button></form>"#);

    let _ = writeln!(out, "</body>\n</html>");
    out
}
