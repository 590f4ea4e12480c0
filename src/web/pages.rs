use std::fmt::Write;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::SiteInfo;
use crate::dates::display_date;
use crate::db;
use crate::html::{escape_html, format_amount};
use crate::listing::{
    self, ListingPage, ListingQuery, DEFAULT_CLOSING_DAYS, DEFAULT_SHORTLIST, MAX_CLOSING_DAYS,
};
use crate::models::Scholarship;
use crate::web::responses::{internal_error, json_error};
use crate::web::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ShortlistQuery {
    days: Option<i64>,
    count: Option<i64>,
}

impl ShortlistQuery {
    fn count(&self) -> i64 {
        self.count.filter(|c| *c > 0).unwrap_or(DEFAULT_SHORTLIST)
    }

    fn days(&self) -> i64 {
        self.days
            .filter(|d| *d > 0)
            .map(|d| d.min(MAX_CLOSING_DAYS))
            .unwrap_or(DEFAULT_CLOSING_DAYS)
    }
}

pub async fn list_json(State(state): State<AppState>, Query(query): Query<ListingQuery>) -> Response {
    match listing::fetch_page(state.pool(), &query).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn closing_soon_json(
    State(state): State<AppState>,
    Query(query): Query<ShortlistQuery>,
) -> Response {
    let days = query.days();
    let today = Local::now().date_naive();
    match listing::closing_soon(state.pool(), today, days, query.count()).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn recent_json(
    State(state): State<AppState>,
    Query(query): Query<ShortlistQuery>,
) -> Response {
    match listing::recent(state.pool(), query.count()).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn detail_json(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match db::get_scholarship(state.pool(), id).await {
        Ok(Some(scholarship)) => Json(scholarship).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Scholarship not found").into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn list_page(State(state): State<AppState>, Query(query): Query<ListingQuery>) -> Response {
    match listing::fetch_page(state.pool(), &query).await {
        Ok(page) => Html(render_list(&page, &query, state.site())).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn detail_page(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match db::get_scholarship(state.pool(), id).await {
        Ok(Some(scholarship)) => Html(render_detail(&scholarship, state.site())).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Html("<h1>Scholarship not found</h1>".to_string()))
            .into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

fn deadline_text(scholarship: &Scholarship) -> String {
    scholarship
        .deadline
        .map(display_date)
        .unwrap_or_else(|| "Rolling".to_string())
}

fn amount_text(scholarship: &Scholarship) -> Option<String> {
    scholarship
        .max_amount
        .filter(|amount| *amount > 0)
        .map(format_amount)
}

fn write_head(out: &mut String, title: &str) {
    let _ = writeln!(
        out,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>{}</title></head>\n<body>",
        escape_html(title)
    );
}

fn write_card(out: &mut String, scholarship: &Scholarship, site: &SiteInfo) {
    let _ = writeln!(out, r#"<article class="scholarship-card">"#);
    let _ = writeln!(
        out,
        r#"<h3><a href="{}">{}</a></h3>"#,
        escape_html(&site.home_url(&format!("scholarships/{}", scholarship.id))),
        escape_html(&scholarship.title)
    );
    let _ = writeln!(out, "<p>Deadline: {}</p>", escape_html(&deadline_text(scholarship)));
    if let Some(amount) = amount_text(scholarship) {
        let _ = writeln!(out, "<p>Award: {amount}</p>");
    }
    let _ = writeln!(out, "<p>Eligibility: {}</p>", scholarship.eligibility.label());
    let _ = writeln!(out, "</article>");
}

pub fn render_list(page: &ListingPage, query: &ListingQuery, site: &SiteInfo) -> String {
    let mut out = String::new();
    write_head(&mut out, &format!("Scholarships | {}", site.name));

    let title = escape_html(query.title.as_deref().unwrap_or_default());
    let _ = writeln!(
        out,
        r#"<form method="get" action="/scholarships">
<input type="search" name="title" value="{title}" placeholder="Search scholarships">
<select name="eligibility"><option value="all">All</option><option value="every">Everyone</option><option value="female">Female Only</option><option value="minority">Minority</option></select>
<select name="sort"><option value="deadline_asc">Deadline (soonest)</option><option value="deadline_desc">Deadline (latest)</option><option value="amount_desc">Amount (high to low)</option><option value="amount_asc">Amount (low to high)</option><option value="title_asc">Title (A-Z)</option><option value="title_desc">Title (Z-A)</option></select>
<button type="submit">Filter</button>
</form>"#
    );

    let _ = writeln!(out, "<p>{} scholarships found.</p>", page.total);
    if page.items.is_empty() {
        let _ = writeln!(out, "<p>No scholarships match these filters.</p>");
    }
    for scholarship in &page.items {
        write_card(&mut out, scholarship, site);
    }

    if page.total_pages > 1 {
        let _ = writeln!(out, "<nav>Page {} of {}</nav>", page.page, page.total_pages);
    }
    let _ = writeln!(out, "</body>\n</html>");
    out
}

pub fn render_detail(scholarship: &Scholarship, site: &SiteInfo) -> String {
    let mut out = String::new();
    write_head(&mut out, &format!("{} | {}", scholarship.title, site.name));

    let _ = writeln!(out, "<h1>{}</h1>", escape_html(&scholarship.title));
    let _ = writeln!(out, "<dl>");
    let mut row = |label: &str, value: &str| {
        if !value.trim().is_empty() {
            let _ = writeln!(out, "<dt>{label}</dt><dd>{}</dd>", escape_html(value));
        }
    };

    row("Deadline", &deadline_text(scholarship));
    row("Maximum Amount", &amount_text(scholarship).unwrap_or_default());
    row(
        "Number of Awards",
        &scholarship.num_awards.map(|n| n.to_string()).unwrap_or_default(),
    );
    row("Eligibility", scholarship.eligibility.label());
    row("GPA", scholarship.gpa.as_deref().unwrap_or_default());
    row("Affiliation", scholarship.affiliation.as_deref().unwrap_or_default());
    row("Age", scholarship.age.as_deref().unwrap_or_default());
    row(
        "College Program",
        scholarship.college_program.as_deref().unwrap_or_default(),
    );
    row("Location", scholarship.location.as_deref().unwrap_or_default());
    row("Categories", &scholarship.categories.join(", "));
    row("License Types", &scholarship.license_types.join(", "));
    let _ = writeln!(out, "</dl>");

    if let Some(link) = &scholarship.link {
        let _ = writeln!(
            out,
            r#"<p><a href="{}" rel="noopener" target="_blank">Apply</a></p>"#,
            escape_html(link)
        );
    }
    let _ = writeln!(out, "</body>\n</html>");
    out
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Eligibility, Status};

    #[test]
    fn shortlist_days_are_bounded() {
        let query = |days| ShortlistQuery {
            days,
            count: None,
        };
        assert_eq!(query(None).days(), DEFAULT_CLOSING_DAYS);
        assert_eq!(query(Some(-3)).days(), DEFAULT_CLOSING_DAYS);
        assert_eq!(query(Some(14)).days(), 14);
        assert_eq!(query(Some(1_000_000_000)).days(), MAX_CLOSING_DAYS);
    }

    fn site() -> SiteInfo {
        SiteInfo {
            name: "Fly Ahead".to_string(),
            url: "https://example.org".to_string(),
            admin_email: "admin@example.org".to_string(),
        }
    }

    fn scholarship() -> Scholarship {
        Scholarship {
            id: Uuid::nil(),
            title: "Women <in> Aviation".to_string(),
            deadline: NaiveDate::from_ymd_opt(2025, 6, 1),
            max_amount: Some(7500),
            num_awards: Some(2),
            gpa: None,
            affiliation: None,
            age: None,
            college_program: None,
            eligibility: Eligibility::Female,
            location: Some("Nationwide".to_string()),
            link: Some("https://example.org/apply".to_string()),
            status: Status::Active,
            categories: vec!["Flight Training".to_string()],
            license_types: Vec::new(),
        }
    }

    #[test]
    fn detail_escapes_and_skips_empty_fields() {
        let html = render_detail(&scholarship(), &site());
        assert!(html.contains("<h1>Women &lt;in&gt; Aviation</h1>"));
        assert!(html.contains("<dt>Deadline</dt><dd>June 1, 2025</dd>"));
        assert!(html.contains("<dt>Maximum Amount</dt><dd>$7,500</dd>"));
        assert!(html.contains("<dt>Eligibility</dt><dd>Female Only</dd>"));
        assert!(!html.contains("<dt>GPA</dt>"));
        assert!(!html.contains("<dt>License Types</dt>"));
    }

    #[test]
    fn list_links_cards_to_detail_pages() {
        let page = ListingPage {
            items: vec![scholarship()],
            total: 1,
            page: 1,
            per_page: 12,
            total_pages: 1,
        };
        let html = render_list(&page, &ListingQuery::default(), &site());
        assert!(html.contains(
            r#"href="https://example.org/scholarships/00000000-0000-0000-0000-000000000000""#
        ));
        assert!(html.contains("1 scholarships found."));
        assert!(!html.contains("<nav>"));
    }
}
