//! Reminder email composition. Everything here is pure string building.

use std::fmt::Write;

use chrono::{Duration, NaiveDate};

use crate::config::SiteInfo;
use crate::dates::display_date;
use crate::html::{escape_html, format_amount};
use crate::models::{Recipient, ReminderBucket, Scholarship};
use crate::options::BucketTemplate;

pub const TEST_SUBJECT: &str = "Test: Scholarship Deadline Reminder";

const STYLES: &str = r#"
    body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
    .container { max-width: 600px; margin: 0 auto; padding: 20px; }
    .header { background-color: #0073aa; color: white; padding: 20px; text-align: center; }
    .content { background-color: #f9f9f9; padding: 20px; }
    .scholarship-item { background-color: white; margin-bottom: 15px; padding: 15px; border-left: 4px solid #0073aa; }
    .scholarship-title { font-size: 18px; font-weight: bold; margin-bottom: 10px; color: #0073aa; }
    .scholarship-meta { font-size: 14px; color: #666; margin-bottom: 5px; }
    .deadline-highlight { color: #d63638; font-weight: bold; }
    .cta-button { display: inline-block; background-color: #0073aa; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; margin-top: 10px; }
    .footer { text-align: center; padding: 20px; font-size: 12px; color: #666; }
"#;

/// Display-ready view of one scholarship inside an email.
#[derive(Debug, Clone, PartialEq)]
pub struct ScholarshipEmailData {
    pub title: String,
    pub deadline_formatted: String,
    pub max_amount: String,
    pub eligibility: String,
    pub permalink: String,
}

impl ScholarshipEmailData {
    pub fn from_scholarship(scholarship: &Scholarship, site: &SiteInfo) -> Self {
        Self {
            title: scholarship.title.clone(),
            deadline_formatted: scholarship
                .deadline
                .map(display_date)
                .unwrap_or_default(),
            max_amount: scholarship
                .max_amount
                .filter(|amount| *amount > 0)
                .map(format_amount)
                .unwrap_or_default(),
            eligibility: scholarship.eligibility.label().to_string(),
            permalink: site.home_url(&format!("scholarships/{}", scholarship.id)),
        }
    }

    /// Placeholder scholarship used by the admin test email.
    pub fn sample(today: NaiveDate, site: &SiteInfo) -> Self {
        Self {
            title: "Aviation Excellence Scholarship".to_string(),
            deadline_formatted: display_date(today + Duration::days(30)),
            max_amount: format_amount(5000),
            eligibility: "Everyone".to_string(),
            permalink: site.home_url("scholarships/sample/"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedEmail {
    pub subject: String,
    pub html: String,
}

/// Textual `{placeholder}` substitution.
pub fn substitute(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

fn default_subject(bucket: ReminderBucket, count: usize) -> String {
    if count == 1 {
        format!("Reminder: Scholarship Deadline in {} Days", bucket.days())
    } else {
        format!(
            "Reminder: {count} Scholarship Deadlines Approaching in {} Days",
            bucket.days()
        )
    }
}

fn configured(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn compose_reminder(
    recipient: &Recipient,
    scholarships: &[ScholarshipEmailData],
    bucket: ReminderBucket,
    template: &BucketTemplate,
    site: &SiteInfo,
) -> ComposedEmail {
    let values = [
        ("user_name", recipient.greeting_name().to_string()),
        (
            "scholarship_title",
            scholarships
                .iter()
                .map(|s| s.title.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        ("days_remaining", bucket.days().to_string()),
        (
            "deadline_date",
            scholarships
                .first()
                .map(|s| s.deadline_formatted.clone())
                .unwrap_or_default(),
        ),
        ("site_name", site.name.clone()),
    ];

    let subject = match configured(&template.subject) {
        Some(custom) => substitute(custom, &values),
        None => default_subject(bucket, scholarships.len()),
    };

    let intro = configured(&template.message).map(|custom| substitute(custom, &values));
    let html = render_body(
        recipient.greeting_name(),
        scholarships,
        bucket.days(),
        intro.as_deref(),
        site,
    );

    ComposedEmail { subject, html }
}

pub fn compose_test(name: &str, today: NaiveDate, site: &SiteInfo) -> ComposedEmail {
    let sample = [ScholarshipEmailData::sample(today, site)];
    ComposedEmail {
        subject: TEST_SUBJECT.to_string(),
        html: render_body(name, &sample, ReminderBucket::ThirtyDays.days(), None, site),
    }
}

fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_body(
    name: &str,
    scholarships: &[ScholarshipEmailData],
    days: i64,
    custom_intro: Option<&str>,
    site: &SiteInfo,
) -> String {
    let count = scholarships.len();
    let plural = if count > 1 { "s" } else { "" };
    let mut out = String::new();

    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html>\n<head>");
    let _ = writeln!(out, r#"<meta charset="UTF-8">"#);
    let _ = writeln!(
        out,
        r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#
    );
    let _ = writeln!(out, "<style>{STYLES}</style>");
    let _ = writeln!(out, "</head>\n<body>\n<div class=\"container\">");
    let _ = writeln!(
        out,
        r#"<div class="header"><h1>Scholarship Deadline Reminder - {days} Days</h1></div>"#
    );
    let _ = writeln!(out, r#"<div class="content">"#);

    match custom_intro {
        Some(intro) => {
            let _ = writeln!(out, "{}", paragraphs(intro));
        }
        None => {
            let _ = writeln!(out, "<p>Hi {},</p>", escape_html(name));
            let _ = writeln!(
                out,
                "<p>This is a friendly reminder that you have {count} saved scholarship{plural} \
                 with deadline{plural} approaching in {days} days:</p>"
            );
        }
    }

    for scholarship in scholarships {
        let _ = writeln!(out, r#"<div class="scholarship-item">"#);
        let _ = writeln!(
            out,
            r#"<div class="scholarship-title">{}</div>"#,
            escape_html(&scholarship.title)
        );
        let _ = writeln!(
            out,
            r#"<div class="scholarship-meta"><strong>Deadline:</strong> <span class="deadline-highlight">{}</span></div>"#,
            escape_html(&scholarship.deadline_formatted)
        );
        if !scholarship.max_amount.is_empty() {
            let _ = writeln!(
                out,
                r#"<div class="scholarship-meta"><strong>Award Amount:</strong> {}</div>"#,
                escape_html(&scholarship.max_amount)
            );
        }
        if !scholarship.eligibility.is_empty() {
            let _ = writeln!(
                out,
                r#"<div class="scholarship-meta"><strong>Eligibility:</strong> {}</div>"#,
                escape_html(&scholarship.eligibility)
            );
        }
        let _ = writeln!(
            out,
            r#"<a href="{}" class="cta-button">View Details &amp; Apply</a>"#,
            escape_html(&scholarship.permalink)
        );
        let _ = writeln!(out, "</div>");
    }

    let _ = writeln!(out, "<p><strong>Don't miss these opportunities!</strong></p>");
    let _ = writeln!(
        out,
        "<p>Make sure to prepare your application materials and submit before the deadline.</p>"
    );
    let _ = writeln!(
        out,
        r#"<p><a href="{}" class="cta-button">View All My Saved Scholarships</a></p>"#,
        escape_html(&site.home_url("my-account/"))
    );
    let _ = writeln!(out, "</div>");

    let home = escape_html(&site.home_url(""));
    let _ = writeln!(
        out,
        r#"<div class="footer"><p>You are receiving this email because you saved these scholarships as reminders.</p><p>{} | <a href="{home}">{home}</a></p></div>"#,
        escape_html(&site.name)
    );
    let _ = writeln!(out, "</div>\n</body>\n</html>");

    out
}
