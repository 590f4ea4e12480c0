use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::{Datelike, NaiveDate};
use reqwest::header::ACCEPT;
use tracing::{error, info, warn};

use crate::mapping::{self, COL_DEADLINE, COL_TITLE};
use crate::models::{ImportLogEntry, ImportSummary, LogLevel, Taxonomy};
use crate::store::ScholarshipStore;
use crate::tabular::{self, RawRow};

/// Rolling import log capacity; older entries are evicted first.
pub const MAX_LOGS: usize = 50;
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const NO_ROWS: &str = "no_rows";

/// Appends `entry` and keeps only the newest `cap` entries.
pub fn push_bounded(logs: &mut Vec<ImportLogEntry>, entry: ImportLogEntry, cap: usize) {
    logs.push(entry);
    if logs.len() > cap {
        let excess = logs.len() - cap;
        logs.drain(..excess);
    }
}

async fn write_log(store: &dyn ScholarshipStore, entry: ImportLogEntry) {
    if let Err(err) = store.append_import_log(entry).await {
        warn!(?err, "failed to append import log entry");
    }
}

async fn fail(store: &dyn ScholarshipStore, message: String) -> anyhow::Error {
    error!(%message, "import failed");
    write_log(store, ImportLogEntry::new(LogLevel::Error, message.clone())).await;
    anyhow!(message)
}

/// Upserts every row keyed by its fingerprint. Row failures are reported in the
/// summary and never stop the batch.
pub async fn process_rows(
    store: &dyn ScholarshipStore,
    rows: &[RawRow],
    today: NaiveDate,
) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for (idx, row) in rows.iter().enumerate() {
        let Some(fields) = mapping::map_row(row, today.year()) else {
            summary
                .errors
                .push(format!("Row {idx}: missing Name of Scholarship"));
            continue;
        };

        let title_raw = row.get(COL_TITLE).map(String::as_str).unwrap_or_default();
        let deadline_raw = row.get(COL_DEADLINE).map(String::as_str).unwrap_or_default();
        let fingerprint = mapping::fingerprint(title_raw, deadline_raw);

        let existing = match store.find_by_fingerprint(&fingerprint).await {
            Ok(existing) => existing,
            Err(err) => {
                summary
                    .errors
                    .push(format!("Row {idx}: lookup failed - {err:#}"));
                continue;
            }
        };

        let id = match existing {
            Some(existing) => {
                if let Err(err) = store.update_scholarship(existing.id, &fields).await {
                    summary
                        .errors
                        .push(format!("Row {idx}: failed to update record - {err:#}"));
                    continue;
                }
                summary.updated += 1;

                let deadline_changed =
                    fields.deadline.is_some() && fields.deadline != existing.deadline;
                if deadline_changed {
                    match store.clear_reminders(existing.id).await {
                        Ok(cleared) if cleared > 0 => {
                            info!(scholarship_id = %existing.id, cleared, "deadline changed, reminders reset")
                        }
                        Ok(_) => {}
                        Err(err) => warn!(?err, scholarship_id = %existing.id, "failed to reset reminders"),
                    }
                }
                existing.id
            }
            None => match store.insert_scholarship(&fingerprint, &fields).await {
                Ok(id) => {
                    summary.created += 1;
                    id
                }
                Err(err) => {
                    summary
                        .errors
                        .push(format!("Row {idx}: failed to insert record - {err:#}"));
                    continue;
                }
            },
        };

        for (taxonomy, names) in [
            (Taxonomy::Category, &fields.categories),
            (Taxonomy::LicenseType, &fields.license_types),
        ] {
            if names.is_empty() {
                continue;
            }
            if let Err(err) = store.assign_terms(id, taxonomy, names).await {
                summary.errors.push(format!(
                    "Row {idx}: failed to assign {} terms - {err:#}",
                    taxonomy.as_str()
                ));
            }
        }
    }

    info!(
        rows = rows.len(),
        created = summary.created,
        updated = summary.updated,
        errors = summary.errors.len(),
        "import completed"
    );

    let mut entry = ImportLogEntry::new(LogLevel::Info, "Import completed");
    entry.summary = Some(summary.clone());
    entry.rows = Some(rows.len());
    write_log(store, entry).await;

    summary
}

pub async fn import_bytes(
    store: &dyn ScholarshipStore,
    content: &[u8],
    source: &str,
    today: NaiveDate,
) -> anyhow::Result<ImportSummary> {
    let rows = match tabular::parse_rows(content) {
        Ok(rows) => rows,
        Err(err) => return Err(fail(store, format!("Unable to parse CSV {source}: {err:#}")).await),
    };

    if rows.is_empty() {
        let message = format!("CSV parsed but no rows found: {source}");
        warn!(%source, "CSV contained no rows");
        write_log(store, ImportLogEntry::new(LogLevel::Warning, message)).await;
        return Ok(ImportSummary {
            created: 0,
            updated: 0,
            errors: vec![NO_ROWS.to_string()],
        });
    }

    Ok(process_rows(store, &rows, today).await)
}

pub async fn import_file(
    store: &dyn ScholarshipStore,
    path: &Path,
    today: NaiveDate,
) -> anyhow::Result<ImportSummary> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(fail(store, format!("CSV file not found: {display}")).await);
    }

    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(err) => return Err(fail(store, format!("Unable to read CSV file {display}: {err}")).await),
    };

    import_bytes(store, &content, &display, today).await
}

pub async fn import_url(
    store: &dyn ScholarshipStore,
    client: &reqwest::Client,
    url: &str,
    today: NaiveDate,
) -> anyhow::Result<ImportSummary> {
    let url = url.trim();
    if url.is_empty() {
        return Err(fail(store, "Empty CSV URL provided.".to_string()).await);
    }

    let response = match client
        .get(url)
        .header(ACCEPT, "text/csv,application/octet-stream,text/plain")
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return Err(fail(store, format!("Failed to fetch CSV URL: {err}")).await),
    };

    let status = response.status();
    if !status.is_success() {
        return Err(fail(store, format!("CSV URL returned HTTP {}", status.as_u16())).await);
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => return Err(fail(store, format!("Failed to read CSV body: {err}")).await),
    };
    if body.is_empty() {
        return Err(fail(store, "CSV fetched but body empty.".to_string()).await);
    }

    import_bytes(store, &body, url, today).await
}

/// Hourly sync from the configured sheet URL.
pub async fn run_auto_sync(
    store: &dyn ScholarshipStore,
    client: &reqwest::Client,
    sheet_url: Option<&str>,
    today: NaiveDate,
) -> anyhow::Result<ImportSummary> {
    let Some(sheet_url) = sheet_url.filter(|url| !url.trim().is_empty()) else {
        write_log(
            store,
            ImportLogEntry::new(
                LogLevel::Warning,
                "Auto-sync enabled but no sheet URL configured.",
            ),
        )
        .await;
        bail!("auto-sync enabled but no sheet URL configured");
    };

    import_url(store, client, sheet_url, today)
        .await
        .context("auto-sync import failed")
}

/// Records a manual import submitted with neither a file nor a URL.
pub async fn log_missing_source(store: &dyn ScholarshipStore) {
    warn!("manual import submitted without a CSV source");
    write_log(
        store,
        ImportLogEntry::new(LogLevel::Error, "No CSV provided for manual import."),
    )
    .await;
}

/// Converts webhook JSON rows into the same shape CSV parsing produces.
pub fn rows_from_json(values: &[serde_json::Value]) -> Vec<RawRow> {
    values
        .iter()
        .map(|value| {
            value
                .as_object()
                .map(|object| {
                    object
                        .iter()
                        .map(|(column, cell)| {
                            let text = match cell {
                                serde_json::Value::String(text) => text.trim().to_string(),
                                serde_json::Value::Null => String::new(),
                                other => other.to_string(),
                            };
                            (column.trim().to_string(), text)
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::models::{ReminderBucket, Status};
    use crate::store::memory::MemoryStore;
    use crate::store::ReminderStore;

    const SHEET: &str = "Name of Scholarship,Deadline,Maximum Amount,Category,Lic Type 1\n\
        Test Award,June 1,\"$5,000\",Flight Training,PPL\n\
        ,July 4,100,,\n\
        Second Award,2025-09-30,250,\"Flight Training, Maintenance\",\n";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn imports_rows_and_reports_missing_titles() {
        let store = MemoryStore::default();
        let summary = import_bytes(&store, SHEET.as_bytes(), "sheet.csv", today())
            .await
            .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.errors, vec!["Row 1: missing Name of Scholarship"]);

        let award = store.scholarship_by_title("Test Award").unwrap();
        assert_eq!(award.deadline, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(award.max_amount, Some(5000));
        assert_eq!(award.status, Status::Active);
        assert_eq!(award.categories, vec!["Flight Training"]);
        assert_eq!(award.license_types, vec!["PPL"]);
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let store = MemoryStore::default();
        import_bytes(&store, SHEET.as_bytes(), "sheet.csv", today())
            .await
            .unwrap();
        let second = import_bytes(&store, SHEET.as_bytes(), "sheet.csv", today())
            .await
            .unwrap();

        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(store.scholarship_count(), 2);
    }

    #[tokio::test]
    async fn same_title_and_deadline_updates_in_place() {
        let store = MemoryStore::default();
        let first = "Name of Scholarship,Deadline,Location\nTest Award,June 1,Dallas\n";
        let second = "Name of Scholarship,Deadline,Location\nTEST AWARD ,June 1,Austin\n";

        import_bytes(&store, first.as_bytes(), "a.csv", today()).await.unwrap();
        let summary = import_bytes(&store, second.as_bytes(), "b.csv", today())
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(store.scholarship_count(), 1);
        let award = store.scholarship_by_title("TEST AWARD").unwrap();
        assert_eq!(award.location.as_deref(), Some("Austin"));
    }

    #[tokio::test]
    async fn deadline_change_clears_reminders() {
        let store = MemoryStore::default();
        let sheet = "Name of Scholarship,Deadline\nTest Award,June 1\n";
        import_bytes(&store, sheet.as_bytes(), "a.csv", today()).await.unwrap();
        let award = store.scholarship_by_title("Test Award").unwrap();

        let user = store.add_recipient("pilot@example.com", None);
        store
            .record_reminder(user, award.id, ReminderBucket::ThirtyDays, award.deadline.unwrap())
            .await
            .unwrap();

        // Same year: the stored deadline is unchanged and the log survives.
        import_bytes(&store, sheet.as_bytes(), "a.csv", today()).await.unwrap();
        assert_eq!(store.reminder_count(), 1);

        // A run in the next year keeps the fingerprint but moves the date.
        let next_year = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let summary = import_bytes(&store, sheet.as_bytes(), "a.csv", next_year)
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(store.scholarship_count(), 1);
        let award = store.scholarship_by_title("Test Award").unwrap();
        assert_eq!(award.deadline, NaiveDate::from_ymd_opt(2026, 6, 1));
        assert_eq!(store.reminder_count(), 0);
    }

    #[tokio::test]
    async fn header_only_sheet_reports_no_rows() {
        let store = MemoryStore::default();
        let summary = import_bytes(&store, b"Name of Scholarship,Deadline\n", "empty.csv", today())
            .await
            .unwrap();

        assert_eq!(summary.errors, vec!["no_rows"]);
        let inner = store.inner.lock().unwrap();
        let logs = &inner.logs;
        assert_eq!(logs.last().unwrap().level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn missing_file_fails_and_logs() {
        let store = MemoryStore::default();
        let result = import_file(&store, Path::new("/nonexistent/sheet.csv"), today()).await;

        assert!(result.is_err());
        let inner = store.inner.lock().unwrap();
        let logs = &inner.logs;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Error);
        assert!(logs[0].message.starts_with("CSV file not found"));
    }

    #[tokio::test]
    async fn manual_import_without_source_is_logged() {
        let store = MemoryStore::default();
        log_missing_source(&store).await;

        let inner = store.inner.lock().unwrap();
        assert_eq!(inner.logs.len(), 1);
        assert_eq!(inner.logs[0].level, LogLevel::Error);
        assert_eq!(inner.logs[0].message, "No CSV provided for manual import.");
    }

    #[tokio::test]
    async fn imports_tab_separated_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Name of Scholarship\tDeadline\tFemale / Every / Minority\n\
             Women in Aviation Grant\tJune 1\tFemale\n"
        )
        .unwrap();

        let store = MemoryStore::default();
        let summary = import_file(&store, file.path(), today()).await.unwrap();

        assert_eq!(summary.created, 1);
        let award = store.scholarship_by_title("Women in Aviation Grant").unwrap();
        assert_eq!(award.eligibility, crate::models::Eligibility::Female);
        assert_eq!(award.deadline, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[tokio::test]
    async fn auto_sync_without_url_logs_warning() {
        let store = MemoryStore::default();
        let client = reqwest::Client::new();
        let result = run_auto_sync(&store, &client, Some("  "), today()).await;

        assert!(result.is_err());
        let inner = store.inner.lock().unwrap();
        let logs = &inner.logs;
        assert_eq!(logs[0].level, LogLevel::Warning);
    }

    #[test]
    fn json_rows_become_string_cells() {
        let rows = rows_from_json(&[
            json!({"Name of Scholarship": " Test Award ", "Maximum Amount": 5000, "Link": null}),
            json!("not an object"),
        ]);

        assert_eq!(rows[0]["Name of Scholarship"], "Test Award");
        assert_eq!(rows[0]["Maximum Amount"], "5000");
        assert_eq!(rows[0]["Link"], "");
        assert!(rows[1].is_empty());
    }

    #[test]
    fn log_is_bounded() {
        let mut logs = Vec::new();
        for index in 0..(MAX_LOGS + 5) {
            push_bounded(
                &mut logs,
                ImportLogEntry::new(LogLevel::Info, format!("entry {index}")),
                MAX_LOGS,
            );
        }

        assert_eq!(logs.len(), MAX_LOGS);
        assert_eq!(logs[0].message, "entry 5");
        assert_eq!(logs.last().unwrap().message, format!("entry {}", MAX_LOGS + 4));
    }
}
