use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eligibility {
    Every,
    Female,
    Minority,
}

impl Eligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eligibility::Every => "every",
            Eligibility::Female => "female",
            Eligibility::Minority => "minority",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Eligibility::Every => "Everyone",
            Eligibility::Female => "Female Only",
            Eligibility::Minority => "Minority",
        }
    }
}

impl FromStr for Eligibility {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "every" => Ok(Eligibility::Every),
            "female" => Ok(Eligibility::Female),
            "minority" => Ok(Eligibility::Minority),
            other => Err(anyhow!("unknown eligibility: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Expired,
    Discontinued,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Expired => "expired",
            Status::Discontinued => "discontinued",
        }
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Status::Active),
            "expired" => Ok(Status::Expired),
            "discontinued" => Ok(Status::Discontinued),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Taxonomy {
    Category,
    LicenseType,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Category => "sch_category",
            Taxonomy::LicenseType => "license_type",
        }
    }
}

/// Days-before-deadline offsets a reminder can be sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReminderBucket {
    #[serde(rename = "30_days")]
    ThirtyDays,
    #[serde(rename = "15_days")]
    FifteenDays,
    #[serde(rename = "5_days")]
    FiveDays,
}

impl ReminderBucket {
    /// Processing order for a reminder run.
    pub const ALL: [ReminderBucket; 3] = [
        ReminderBucket::ThirtyDays,
        ReminderBucket::FifteenDays,
        ReminderBucket::FiveDays,
    ];

    pub fn days(&self) -> i64 {
        match self {
            ReminderBucket::ThirtyDays => 30,
            ReminderBucket::FifteenDays => 15,
            ReminderBucket::FiveDays => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderBucket::ThirtyDays => "30_days",
            ReminderBucket::FifteenDays => "15_days",
            ReminderBucket::FiveDays => "5_days",
        }
    }
}

impl fmt::Display for ReminderBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderBucket {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "30_days" => Ok(ReminderBucket::ThirtyDays),
            "15_days" => Ok(ReminderBucket::FifteenDays),
            "5_days" => Ok(ReminderBucket::FiveDays),
            other => Err(anyhow!("unknown reminder type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Scholarship {
    pub id: Uuid,
    pub title: String,
    pub deadline: Option<NaiveDate>,
    pub max_amount: Option<i64>,
    pub num_awards: Option<i64>,
    pub gpa: Option<String>,
    pub affiliation: Option<String>,
    pub age: Option<String>,
    pub college_program: Option<String>,
    pub eligibility: Eligibility,
    pub location: Option<String>,
    pub link: Option<String>,
    pub status: Status,
    pub categories: Vec<String>,
    pub license_types: Vec<String>,
}

/// Field values mapped from one import row. `None` leaves the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ScholarshipFields {
    pub title: String,
    pub deadline: Option<NaiveDate>,
    pub num_awards: Option<i64>,
    pub max_amount: Option<i64>,
    pub gpa: Option<String>,
    pub affiliation: Option<String>,
    pub age: Option<String>,
    pub college_program: Option<String>,
    pub eligibility: Option<Eligibility>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub categories: Vec<String>,
    pub license_types: Vec<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
pub struct ExistingScholarship {
    pub id: Uuid,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ImportSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    pub at: DateTime<Utc>,
}

impl ImportLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            summary: None,
            rows: None,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub display_name: String,
}

impl Recipient {
    pub fn greeting_name(&self) -> &str {
        self.first_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.display_name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub scholarship_id: Uuid,
    pub reminder_type: ReminderBucket,
    pub deadline_date: NaiveDate,
    pub sent_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderStats {
    pub total_sent: i64,
    pub by_type: Vec<(ReminderBucket, i64)>,
    pub last_30_days: i64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_scheduled: Option<DateTime<Utc>>,
}
