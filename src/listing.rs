use std::str::FromStr;

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::{scholarship_from_row, SCHOLARSHIP_SELECT};
use crate::models::{Eligibility, Scholarship};

pub const DEFAULT_PER_PAGE: i64 = 12;
const MAX_PER_PAGE: i64 = 100;
pub const DEFAULT_CLOSING_DAYS: i64 = 30;
pub const MAX_CLOSING_DAYS: i64 = 365;
pub const DEFAULT_SHORTLIST: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    DeadlineAsc,
    DeadlineDesc,
    AmountAsc,
    AmountDesc,
    TitleAsc,
    TitleDesc,
}

impl SortOrder {
    /// Unknown values fall back to soonest deadline first.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "deadline_desc" => SortOrder::DeadlineDesc,
            "amount_asc" => SortOrder::AmountAsc,
            "amount_desc" => SortOrder::AmountDesc,
            "title_asc" => SortOrder::TitleAsc,
            "title_desc" => SortOrder::TitleDesc,
            _ => SortOrder::DeadlineAsc,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            SortOrder::DeadlineAsc => "s.deadline ASC NULLS LAST, s.title ASC",
            SortOrder::DeadlineDesc => "s.deadline DESC NULLS LAST, s.title ASC",
            SortOrder::AmountAsc => "s.max_amount ASC NULLS LAST, s.deadline ASC",
            SortOrder::AmountDesc => "s.max_amount DESC NULLS LAST, s.deadline ASC",
            SortOrder::TitleAsc => "s.title ASC",
            SortOrder::TitleDesc => "s.title DESC",
        }
    }
}

/// Unparseable or blank query values are treated as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse().ok()))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListingQuery {
    pub title: Option<String>,
    pub category: Option<String>,
    pub license: Option<String>,
    pub eligibility: Option<String>,
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub min_amount: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub max_amount: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub deadline_from: Option<NaiveDate>,
    #[serde(deserialize_with = "lenient")]
    pub deadline_to: Option<NaiveDate>,
    pub sort: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub page: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub per_page: Option<i64>,
}

impl ListingQuery {
    pub fn sort_order(&self) -> SortOrder {
        self.sort.as_deref().map(SortOrder::parse).unwrap_or_default()
    }

    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .filter(|n| *n >= 1)
            .map(|n| n.min(MAX_PER_PAGE))
            .unwrap_or(DEFAULT_PER_PAGE)
    }

    /// Rows skipped before the current page. Saturates, so far-out pages come back empty.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    fn eligibility_filter(&self) -> Option<Eligibility> {
        non_blank(&self.eligibility)
            .filter(|value| !value.eq_ignore_ascii_case("all"))
            .and_then(|value| value.to_ascii_lowercase().parse().ok())
    }
}

fn contains_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_term_filter(builder: &mut QueryBuilder<'static, Postgres>, taxonomy: &str, slug: &str) {
    builder.push(
        " AND EXISTS (SELECT 1 FROM aviation.scholarship_terms st \
         JOIN aviation.terms t ON t.id = st.term_id \
         WHERE st.scholarship_id = s.id AND t.taxonomy = ",
    );
    builder.push_bind(taxonomy.to_string());
    builder.push(" AND t.slug = ");
    builder.push_bind(slug.to_string());
    builder.push(")");
}

fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, query: &ListingQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(title) = non_blank(&query.title) {
        builder.push(" AND s.title ILIKE ");
        builder.push_bind(contains_pattern(title));
    }
    if let Some(slug) = non_blank(&query.category) {
        push_term_filter(builder, "sch_category", slug);
    }
    if let Some(slug) = non_blank(&query.license) {
        push_term_filter(builder, "license_type", slug);
    }
    if let Some(eligibility) = query.eligibility_filter() {
        builder.push(" AND s.eligibility = ");
        builder.push_bind(eligibility.as_str());
    }
    if let Some(location) = non_blank(&query.location) {
        builder.push(" AND s.location ILIKE ");
        builder.push_bind(contains_pattern(location));
    }
    if let Some(min) = query.min_amount.filter(|n| *n > 0) {
        builder.push(" AND s.max_amount >= ");
        builder.push_bind(min);
    }
    if let Some(max) = query.max_amount.filter(|n| *n > 0) {
        builder.push(" AND s.max_amount <= ");
        builder.push_bind(max);
    }
    if let Some(from) = query.deadline_from {
        builder.push(" AND s.deadline >= ");
        builder.push_bind(from);
    }
    if let Some(to) = query.deadline_to {
        builder.push(" AND s.deadline <= ");
        builder.push_bind(to);
    }
}

pub fn page_query(query: &ListingQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SCHOLARSHIP_SELECT);
    push_filters(&mut builder, query);
    builder.push(" ORDER BY ");
    builder.push(query.sort_order().order_by());
    builder.push(" LIMIT ");
    builder.push_bind(query.per_page());
    builder.push(" OFFSET ");
    builder.push_bind(query.offset());
    builder
}

pub fn count_query(query: &ListingQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM aviation.scholarships s");
    push_filters(&mut builder, query);
    builder
}

#[derive(Debug, Serialize)]
pub struct ListingPage {
    pub items: Vec<Scholarship>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

pub async fn fetch_page(pool: &PgPool, query: &ListingQuery) -> anyhow::Result<ListingPage> {
    let total: i64 = count_query(query)
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .context("failed to count scholarships")?;

    let rows = page_query(query)
        .build()
        .fetch_all(pool)
        .await
        .context("failed to list scholarships")?;
    let items = rows
        .iter()
        .map(scholarship_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let per_page = query.per_page();
    Ok(ListingPage {
        items,
        total,
        page: query.page(),
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    })
}

/// Last deadline inside the closing-soon window. `days` is clamped to `1..=MAX_CLOSING_DAYS`.
pub fn closing_window_end(today: NaiveDate, days: i64) -> Option<NaiveDate> {
    let days = days.clamp(1, MAX_CLOSING_DAYS);
    today.checked_add_signed(Duration::try_days(days)?)
}

/// Scholarships whose deadline falls between today and `days` from now, soonest first.
pub async fn closing_soon(
    pool: &PgPool,
    today: NaiveDate,
    days: i64,
    count: i64,
) -> anyhow::Result<Vec<Scholarship>> {
    let Some(until) = closing_window_end(today, days) else {
        return Ok(Vec::new());
    };
    let query = ListingQuery {
        deadline_from: Some(today),
        deadline_to: Some(until),
        per_page: Some(count),
        ..Default::default()
    };
    Ok(fetch_page(pool, &query).await?.items)
}

pub async fn recent(pool: &PgPool, count: i64) -> anyhow::Result<Vec<Scholarship>> {
    let query = ListingQuery {
        per_page: Some(count),
        ..Default::default()
    };
    Ok(fetch_page(pool, &query).await?.items)
}
