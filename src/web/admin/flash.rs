use crate::html::escape_html;

/// Flash HTML for the status or error code carried in a redirect query.
/// `detail` is the transient error text stored by the failing handler, if any.
pub fn compose_flash_message(status: Option<&str>, error: Option<&str>, detail: Option<&str>) -> String {
    if let Some(status) = status {
        let message = match status {
            "imported" => "Import finished. See the summary below.",
            "settings_saved" => "Settings saved.",
            "templates_saved" => "Email templates saved.",
            "test_sent" => "Test email sent.",
            "reminders_run" => "Reminder run finished. See the last run below.",
            "deleted" => "Scholarship deleted.",
            "updated" => "Scholarship updated.",
            "reminders_reset" => "Reminder log cleared for the scholarship.",
            "cleaned" => "Old reminder records removed.",
            _ => "",
        };

        if !message.is_empty() {
            return format!(r#"<div class="flash success">{message}</div>"#);
        }
    }

    if let Some(error) = error {
        let message = match error {
            "missing_csv" => "Upload a CSV file or provide a CSV URL.",
            "import_failed" => "Import failed.",
            "invalid_email" => "Enter a valid email address.",
            "test_failed" => "Test email could not be sent.",
            "reminders_failed" => "Reminder run failed.",
            "not_found" => "Scholarship not found.",
            "invalid_date" => "Deadline must be a date in YYYY-MM-DD form.",
            "invalid_status" => "Unknown scholarship status.",
            "save_failed" => "Changes could not be saved.",
            _ => "Something went wrong. Check the logs.",
        };

        let detail = detail
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| format!(" {}", escape_html(d)))
            .unwrap_or_default();
        return format!(r#"<div class="flash error">{message}{detail}</div>"#);
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_status_renders_success() {
        let html = compose_flash_message(Some("settings_saved"), None, None);
        assert_eq!(html, r#"<div class="flash success">Settings saved.</div>"#);
    }

    #[test]
    fn error_includes_escaped_detail() {
        let html = compose_flash_message(None, Some("import_failed"), Some("CSV URL returned HTTP 404 <x>"));
        assert_eq!(
            html,
            r#"<div class="flash error">Import failed. CSV URL returned HTTP 404 &lt;x&gt;</div>"#
        );
    }

    #[test]
    fn unknown_status_without_error_is_empty() {
        assert!(compose_flash_message(Some("bogus"), None, None).is_empty());
        assert!(compose_flash_message(None, None, Some("stale")).is_empty());
    }
}
