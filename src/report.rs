use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{ImportLogEntry, ImportSummary, LogLevel, ReminderStats};
use crate::reminders::RunOutcome;

const RECENT_LOG_ENTRIES: usize = 10;

pub struct ReportInput<'a> {
    pub generated_at: DateTime<Utc>,
    pub scholarship_count: i64,
    pub stats: &'a ReminderStats,
    pub last_import: Option<&'a ImportSummary>,
    pub last_run: Option<&'a RunOutcome>,
    pub logs: &'a [ImportLogEntry],
}

fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Warning => "warning",
        LogLevel::Error => "error",
    }
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Aviation Scholarships Status Report");
    let _ = writeln!(
        output,
        "Generated {} with {} scholarships stored",
        input.generated_at.format("%Y-%m-%d %H:%M UTC"),
        input.scholarship_count
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Last Import");

    match input.last_import {
        Some(summary) => {
            let _ = writeln!(
                output,
                "- {} created, {} updated, {} errors",
                summary.created,
                summary.updated,
                summary.errors.len()
            );
            for error in summary.errors.iter().take(RECENT_LOG_ENTRIES) {
                let _ = writeln!(output, "  - {error}");
            }
        }
        None => {
            let _ = writeln!(output, "No import has run yet.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Reminders");
    let stats = input.stats;
    let _ = writeln!(output, "- Total sent: {}", stats.total_sent);
    for (bucket, count) in &stats.by_type {
        let _ = writeln!(output, "- {}-day reminders: {count}", bucket.days());
    }
    let _ = writeln!(output, "- Sent in the last 30 days: {}", stats.last_30_days);
    match stats.last_run {
        Some(at) => {
            let _ = writeln!(output, "- Last run: {}", at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => {
            let _ = writeln!(output, "- Last run: never");
        }
    }
    if let Some(next) = stats.next_scheduled {
        let _ = writeln!(output, "- Next scheduled: {}", next.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(run) = input.last_run {
        let _ = writeln!(
            output,
            "- Last outcome: {} ({:.2}s)",
            run.message, run.duration_secs
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Import Log");

    if input.logs.is_empty() {
        let _ = writeln!(output, "No log entries recorded.");
    } else {
        for entry in input.logs.iter().rev().take(RECENT_LOG_ENTRIES) {
            let _ = writeln!(
                output,
                "- {} [{}] {}",
                entry.at.format("%Y-%m-%d %H:%M"),
                level_label(entry.level),
                entry.message
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::ReminderBucket;

    #[test]
    fn report_covers_each_section() {
        let stats = ReminderStats {
            total_sent: 7,
            by_type: vec![
                (ReminderBucket::ThirtyDays, 4),
                (ReminderBucket::FifteenDays, 2),
                (ReminderBucket::FiveDays, 1),
            ],
            last_30_days: 3,
            last_run: None,
            next_scheduled: None,
        };
        let summary = ImportSummary {
            created: 5,
            updated: 2,
            errors: vec!["Row 4: missing Name of Scholarship".to_string()],
        };
        let mut older = ImportLogEntry::new(LogLevel::Info, "Import completed");
        older.at = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let mut newer = ImportLogEntry::new(LogLevel::Error, "CSV URL returned HTTP 404");
        newer.at = Utc.with_ymd_and_hms(2025, 5, 2, 8, 0, 0).unwrap();
        let logs = vec![older, newer];

        let report = build_report(&ReportInput {
            generated_at: Utc.with_ymd_and_hms(2025, 5, 3, 12, 0, 0).unwrap(),
            scholarship_count: 12,
            stats: &stats,
            last_import: Some(&summary),
            last_run: None,
            logs: &logs,
        });

        assert!(report.starts_with("# Aviation Scholarships Status Report"));
        assert!(report.contains("Generated 2025-05-03 12:00 UTC with 12 scholarships stored"));
        assert!(report.contains("- 5 created, 2 updated, 1 errors"));
        assert!(report.contains("- 15-day reminders: 2"));
        assert!(report.contains("- Last run: never"));

        let newest = report.find("CSV URL returned HTTP 404").unwrap();
        let oldest = report.find("[info] Import completed").unwrap();
        assert!(newest < oldest);
    }

    #[test]
    fn empty_state_is_explained() {
        let report = build_report(&ReportInput {
            generated_at: Utc::now(),
            scholarship_count: 0,
            stats: &ReminderStats::default(),
            last_import: None,
            last_run: None,
            logs: &[],
        });
        assert!(report.contains("No import has run yet."));
        assert!(report.contains("No log entries recorded."));
    }
}
