use chrono::NaiveDate;

const FULL_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%A, %B %d, %Y",
    "%A %B %d %Y",
];

/// Normalizes a human deadline string into a date.
///
/// Tried in order: strict ISO, the full formats above, then the same
/// formats with `current_year` appended (so "June 1" lands in the run's
/// year). Anything else yields `None`.
pub fn normalize_date(value: &str, current_year: i32) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }

    let cleaned = clean(value);
    if let Some(date) = parse_full(&cleaned) {
        return Some(date);
    }

    let with_year = if cleaned.contains('/') && !cleaned.contains(' ') {
        format!("{cleaned}/{current_year}")
    } else {
        format!("{cleaned} {current_year}")
    };
    parse_full(&with_year)
}

fn parse_full(value: &str) -> Option<NaiveDate> {
    FULL_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Drops ordinal suffixes ("1st"), abbreviation dots and stray commas at the edges.
fn clean(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let word = word.trim_end_matches('.');
            strip_ordinal(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(',')
        .trim()
        .to_string()
}

fn strip_ordinal(word: &str) -> String {
    let (body, comma) = match word.strip_suffix(',') {
        Some(body) => (body, ","),
        None => (word, ""),
    };
    let lower = body.to_ascii_lowercase();
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(digits) = lower.strip_suffix(suffix) {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return format!("{digits}{comma}");
            }
        }
    }
    word.to_string()
}

/// Formats a deadline the way reminder emails and listings show it ("June 1, 2025").
pub fn display_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn passes_iso_through() {
        assert_eq!(normalize_date("2026-03-15", 2025), Some(ymd(2026, 3, 15)));
    }

    #[test]
    fn yearless_dates_use_current_year() {
        assert_eq!(normalize_date("June 1", 2025), Some(ymd(2025, 6, 1)));
        assert_eq!(normalize_date("Jan 31st", 2025), Some(ymd(2025, 1, 31)));
        assert_eq!(normalize_date("3/15", 2025), Some(ymd(2025, 3, 15)));
    }

    #[test]
    fn parses_common_human_formats() {
        assert_eq!(normalize_date("March 15, 2026", 2025), Some(ymd(2026, 3, 15)));
        assert_eq!(normalize_date("Mar. 15, 2026", 2025), Some(ymd(2026, 3, 15)));
        assert_eq!(normalize_date("03/15/2026", 2025), Some(ymd(2026, 3, 15)));
        assert_eq!(normalize_date("15 March 2026", 2025), Some(ymd(2026, 3, 15)));
        assert_eq!(normalize_date("2026/03/15", 2025), Some(ymd(2026, 3, 15)));
        assert_eq!(normalize_date("03/15/26", 2025), Some(ymd(2026, 3, 15)));
    }

    #[test]
    fn rejects_unparseable_values() {
        assert_eq!(normalize_date("", 2025), None);
        assert_eq!(normalize_date("Rolling", 2025), None);
        assert_eq!(normalize_date("2025-13-45", 2025), None);
    }

    #[test]
    fn displays_long_month() {
        assert_eq!(display_date(ymd(2025, 6, 1)), "June 1, 2025");
    }
}
