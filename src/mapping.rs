use sha2::{Digest, Sha256};
use url::Url;

use crate::dates;
use crate::models::{Eligibility, ScholarshipFields};
use crate::tabular::RawRow;

pub const COL_TITLE: &str = "Name of Scholarship";
pub const COL_DEADLINE: &str = "Deadline";
const COL_NUM_AWARDS: &str = "Number of Awards";
const COL_MAX_AMOUNT: &str = "Maximum Amount";
const COL_GPA: &str = "GPA";
const COL_AFFILIATION: &str = "Affiliation";
const COL_AGE: &str = "Age";
const COL_COLLEGE_PROGRAM: &str = "College Program?";
const COL_ELIGIBILITY: &str = "Female / Every / Minority";
const COL_LOCATION: &str = "Location";
const COL_LINK: &str = "Link";
const COL_CATEGORY: &str = "Category";
const LICENSE_COLUMNS: usize = 10;

/// De-duplication key for imported rows: title and raw deadline only.
pub fn fingerprint(title: &str, deadline_raw: &str) -> String {
    let seed = format!("{}|{}", title.trim(), deadline_raw.trim());
    let digest = Sha256::digest(seed.trim().to_lowercase().as_bytes());
    format!("{digest:x}")
}

/// Strips markup and control characters and collapses whitespace.
pub fn sanitize_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_tag = false;

    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps only ASCII digits; an empty result reads as zero.
pub fn digits_only(value: &str) -> i64 {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

pub fn classify_eligibility(value: &str) -> Eligibility {
    let compact: String = value
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ')
        .collect();
    if compact.contains("female") {
        Eligibility::Female
    } else if compact.contains("minor") {
        Eligibility::Minority
    } else {
        Eligibility::Every
    }
}

/// Accepts http(s) links; bare hosts get an `http://` prefix, anything else is dropped.
pub fn sanitize_link(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return None;
    }

    let candidate = if value.contains("://") {
        value.to_string()
    } else if value.contains(':') {
        return None;
    } else {
        format!("http://{value}")
    };

    let parsed = Url::parse(&candidate).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed.to_string()),
        _ => None,
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    slug
}

fn cell<'a>(row: &'a RawRow, column: &str) -> Option<&'a str> {
    row.get(column)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn text_cell(row: &RawRow, column: &str) -> Option<String> {
    cell(row, column)
        .map(sanitize_text)
        .filter(|value| !value.is_empty())
}

/// Maps a parsed row onto scholarship fields. Returns `None` when the title is missing.
pub fn map_row(row: &RawRow, current_year: i32) -> Option<ScholarshipFields> {
    let title = cell(row, COL_TITLE)?;

    let categories = cell(row, COL_CATEGORY)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let license_types = (1..=LICENSE_COLUMNS)
        .filter_map(|index| cell(row, &format!("Lic Type {index}")))
        .map(str::to_string)
        .collect();

    Some(ScholarshipFields {
        title: sanitize_text(title),
        deadline: cell(row, COL_DEADLINE)
            .and_then(|value| dates::normalize_date(value, current_year)),
        num_awards: cell(row, COL_NUM_AWARDS).map(digits_only),
        max_amount: cell(row, COL_MAX_AMOUNT).map(digits_only),
        gpa: text_cell(row, COL_GPA),
        affiliation: text_cell(row, COL_AFFILIATION),
        age: text_cell(row, COL_AGE),
        college_program: text_cell(row, COL_COLLEGE_PROGRAM),
        eligibility: cell(row, COL_ELIGIBILITY).map(classify_eligibility),
        location: text_cell(row, COL_LOCATION),
        link: cell(row, COL_LINK).and_then(sanitize_link),
        categories,
        license_types,
        raw: serde_json::to_value(row).unwrap_or(serde_json::Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fingerprint_ignores_case_and_outer_whitespace() {
        let a = fingerprint("Test Award", "June 1");
        let b = fingerprint("  test award ", " June 1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint("Test Award", "June 2"));
    }

    #[test]
    fn fingerprint_uses_raw_deadline_text() {
        assert_ne!(fingerprint("Test Award", "June 1"), fingerprint("Test Award", "2025-06-01"));
    }

    #[test]
    fn sanitizes_free_text() {
        assert_eq!(sanitize_text("  <b>Pilot</b>\n  Program\t"), "Pilot Program");
    }

    #[test]
    fn strips_non_digits() {
        assert_eq!(digits_only("$5,000"), 5000);
        assert_eq!(digits_only("Varies"), 0);
        assert_eq!(digits_only("up to 3 awards"), 3);
    }

    #[test]
    fn classifies_eligibility_loosely() {
        assert_eq!(classify_eligibility("Female"), Eligibility::Female);
        assert_eq!(classify_eligibility("Fe male"), Eligibility::Female);
        assert_eq!(classify_eligibility("Minorities"), Eligibility::Minority);
        assert_eq!(classify_eligibility("Every"), Eligibility::Every);
        assert_eq!(classify_eligibility("anyone"), Eligibility::Every);
    }

    #[test]
    fn sanitizes_links() {
        assert_eq!(
            sanitize_link("https://example.org/apply").as_deref(),
            Some("https://example.org/apply")
        );
        assert_eq!(
            sanitize_link("example.org/apply").as_deref(),
            Some("http://example.org/apply")
        );
        assert_eq!(sanitize_link("javascript:alert(1)"), None);
        assert_eq!(sanitize_link("ftp://example.org"), None);
        assert_eq!(sanitize_link("not a link"), None);
    }

    #[test]
    fn slugifies_term_names() {
        assert_eq!(slugify("Private Pilot (PPL)"), "private-pilot-ppl");
        assert_eq!(slugify("  Flight  Training "), "flight-training");
    }

    #[test]
    fn maps_a_full_row() {
        let raw = row(&[
            ("Name of Scholarship", "Test Award"),
            ("Deadline", "June 1"),
            ("Number of Awards", "3 awards"),
            ("Maximum Amount", "$5,000"),
            ("Female / Every / Minority", "Female"),
            ("Location", "Dallas, TX"),
            ("Link", "https://example.org"),
            ("Category", "Flight Training, Maintenance ,"),
            ("Lic Type 1", "PPL"),
            ("Lic Type 3", "CFI"),
            ("GPA", ""),
        ]);

        let fields = map_row(&raw, 2025).unwrap();
        assert_eq!(fields.title, "Test Award");
        assert_eq!(fields.deadline, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(fields.num_awards, Some(3));
        assert_eq!(fields.max_amount, Some(5000));
        assert_eq!(fields.eligibility, Some(Eligibility::Female));
        assert_eq!(fields.location.as_deref(), Some("Dallas, TX"));
        assert_eq!(fields.categories, vec!["Flight Training", "Maintenance"]);
        assert_eq!(fields.license_types, vec!["PPL", "CFI"]);
        assert_eq!(fields.gpa, None);
        assert_eq!(fields.raw["Deadline"], "June 1");
    }

    #[test]
    fn missing_title_is_rejected() {
        assert!(map_row(&row(&[("Name of Scholarship", "   ")]), 2025).is_none());
        assert!(map_row(&row(&[("Deadline", "June 1")]), 2025).is_none());
    }
}
