use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::import;
use crate::mapping::slugify;
use crate::models::{
    Eligibility, ExistingScholarship, ImportLogEntry, ImportSummary, Recipient, ReminderBucket,
    ReminderRecord, ReminderStats, Scholarship, ScholarshipFields, Status, Taxonomy,
};
use crate::options;
use crate::reminders;
use crate::store::{deadline_changed, ReminderStore, ScholarshipStore};

/// Scholarship columns plus term names aggregated per taxonomy. Expects the table aliased `s`.
pub const SCHOLARSHIP_SELECT: &str = r#"
    SELECT s.id, s.title, s.deadline, s.max_amount, s.num_awards, s.gpa, s.affiliation,
           s.age, s.college_program, s.eligibility, s.location, s.link, s.status,
           ARRAY(
               SELECT t.name FROM aviation.scholarship_terms st
               JOIN aviation.terms t ON t.id = st.term_id
               WHERE st.scholarship_id = s.id AND t.taxonomy = 'sch_category'
               ORDER BY t.name
           ) AS categories,
           ARRAY(
               SELECT t.name FROM aviation.scholarship_terms st
               JOIN aviation.terms t ON t.id = st.term_id
               WHERE st.scholarship_id = s.id AND t.taxonomy = 'license_type'
               ORDER BY t.name
           ) AS license_types
    FROM aviation.scholarships s
"#;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Demo users, scholarships due in each reminder bucket, and favorites linking them.
pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<ImportSummary> {
    let users = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "avery.lee@example.com",
            Some("Avery"),
            "Avery Lee",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "jules.moreno@example.com",
            Some("Jules"),
            "Jules Moreno",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "kiara.patel@example.com",
            None,
            "kpatel",
        ),
    ];

    for (id, email, first_name, display_name) in &users {
        sqlx::query(
            r#"
            INSERT INTO aviation.users (id, email, first_name, display_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET first_name = EXCLUDED.first_name, display_name = EXCLUDED.display_name
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(first_name)
        .bind(display_name)
        .execute(pool)
        .await?;
    }

    let day = |offset: i64| (today + Duration::days(offset)).format("%Y-%m-%d").to_string();
    let csv = format!(
        "Name of Scholarship,Deadline,Number of Awards,Maximum Amount,Female / Every / Minority,Location,Link,Category,Lic Type 1,Lic Type 2\n\
         Private Pilot Flight Training Award,{},3,\"$5,000\",Every,\"Oshkosh, WI\",https://example.org/ppl,\"Flight Training, Private\",Private Pilot,\n\
         Women in Aviation Instrument Grant,{},2,\"$7,500\",Female,Nationwide,example.org/wai,Flight Training,Instrument Rating,Commercial Pilot\n\
         Diversity in Maintenance Scholarship,{},5,\"$2,500\",Minority,\"Dallas, TX\",https://example.org/amt,Maintenance,A&P Mechanic,\n\
         Aviation Management Fellowship,{},1,\"$10,000\",Every,Remote,https://example.org/mgmt,Academic,,\n",
        day(30),
        day(15),
        day(5),
        day(90),
    );

    let store = PgStore::new(pool.clone());
    let summary = import::import_bytes(&store, csv.as_bytes(), "seed", today).await?;

    let favorites = [
        (0usize, "Private Pilot Flight Training Award"),
        (0, "Women in Aviation Instrument Grant"),
        (1, "Women in Aviation Instrument Grant"),
        (1, "Diversity in Maintenance Scholarship"),
        (2, "Aviation Management Fellowship"),
    ];
    for (user, title) in favorites {
        sqlx::query(
            r#"
            INSERT INTO aviation.favorites (user_id, scholarship_id)
            SELECT $1, id FROM aviation.scholarships WHERE title = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(users[user].0)
        .bind(title)
        .execute(pool)
        .await?;
    }

    Ok(summary)
}

pub fn scholarship_from_row(row: &PgRow) -> anyhow::Result<Scholarship> {
    let eligibility: String = row.try_get("eligibility")?;
    let status: String = row.try_get("status")?;

    Ok(Scholarship {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        deadline: row.try_get("deadline")?,
        max_amount: row.try_get("max_amount")?,
        num_awards: row.try_get("num_awards")?,
        gpa: row.try_get("gpa")?,
        affiliation: row.try_get("affiliation")?,
        age: row.try_get("age")?,
        college_program: row.try_get("college_program")?,
        eligibility: eligibility.parse::<Eligibility>()?,
        location: row.try_get("location")?,
        link: row.try_get("link")?,
        status: status.parse::<Status>()?,
        categories: row.try_get("categories")?,
        license_types: row.try_get("license_types")?,
    })
}

fn reminder_from_row(row: &PgRow) -> anyhow::Result<ReminderRecord> {
    let reminder_type: String = row.try_get("reminder_type")?;
    Ok(ReminderRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        scholarship_id: row.try_get("scholarship_id")?,
        reminder_type: reminder_type.parse()?,
        deadline_date: row.try_get("deadline_date")?,
        sent_date: row.try_get("sent_date")?,
    })
}

pub async fn get_scholarship(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<Scholarship>> {
    let query = format!("{SCHOLARSHIP_SELECT} WHERE s.id = $1");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to load scholarship {id}"))?;
    row.as_ref().map(scholarship_from_row).transpose()
}

/// Deletes a scholarship. Its reminders, favorites and term links go with it.
pub async fn delete_scholarship(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM aviation.scholarship_reminders WHERE scholarship_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM aviation.scholarships WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to delete scholarship {id}"))?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Edits deadline and/or status. A changed deadline clears the reminder log for the record.
pub async fn update_deadline_status(
    pool: &PgPool,
    id: Uuid,
    deadline: Option<NaiveDate>,
    status: Option<Status>,
) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;

    let current: Option<Option<NaiveDate>> = sqlx::query_scalar(
        "SELECT deadline FROM aviation.scholarships WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(current) = current else {
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE aviation.scholarships
        SET deadline = COALESCE($2, deadline),
            status = COALESCE($3, status),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(deadline)
    .bind(status.map(|s| s.as_str()))
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to update scholarship {id}"))?;

    if deadline_changed(current, deadline) {
        sqlx::query("DELETE FROM aviation.scholarship_reminders WHERE scholarship_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(true)
}

pub async fn clear_reminders(pool: &PgPool, scholarship_id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM aviation.scholarship_reminders WHERE scholarship_id = $1")
        .bind(scholarship_id)
        .execute(pool)
        .await
        .context("failed to clear reminders")?;
    Ok(result.rows_affected())
}

pub async fn user_reminders(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ReminderRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, scholarship_id, reminder_type, deadline_date, sent_date
        FROM aviation.scholarship_reminders
        WHERE user_id = $1
        ORDER BY sent_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(reminder_from_row).collect()
}

pub async fn scholarship_reminders(
    pool: &PgPool,
    scholarship_id: Uuid,
) -> anyhow::Result<Vec<ReminderRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, scholarship_id, reminder_type, deadline_date, sent_date
        FROM aviation.scholarship_reminders
        WHERE scholarship_id = $1
        ORDER BY sent_date DESC
        "#,
    )
    .bind(scholarship_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(reminder_from_row).collect()
}

/// Age in days accepted by the cleanup query. A cutoff of zero or less would reach every record.
pub fn cleanup_age_days(days: i64) -> anyhow::Result<i32> {
    if days < 1 {
        bail!("cleanup age must be at least one day, got {days}");
    }
    i32::try_from(days).with_context(|| format!("cleanup age of {days} days is too large"))
}

pub async fn cleanup_old_reminders(pool: &PgPool, days: i64) -> anyhow::Result<u64> {
    let days = cleanup_age_days(days)?;
    let result = sqlx::query(
        "DELETE FROM aviation.scholarship_reminders WHERE sent_date < NOW() - make_interval(days => $1)",
    )
    .bind(days)
    .execute(pool)
    .await
    .context("failed to clean up reminder log")?;
    Ok(result.rows_affected())
}

pub async fn reminder_stats(
    pool: &PgPool,
    next_scheduled: Option<DateTime<Utc>>,
) -> anyhow::Result<ReminderStats> {
    let total_sent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aviation.scholarship_reminders")
        .fetch_one(pool)
        .await?;

    let grouped: Vec<(String, i64)> = sqlx::query_as(
        "SELECT reminder_type, COUNT(*) FROM aviation.scholarship_reminders GROUP BY reminder_type",
    )
    .fetch_all(pool)
    .await?;

    let last_30_days: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM aviation.scholarship_reminders WHERE sent_date >= NOW() - INTERVAL '30 days'",
    )
    .fetch_one(pool)
    .await?;

    Ok(ReminderStats {
        total_sent,
        by_type: reminders::count_by_bucket(&grouped),
        last_30_days,
        last_run: options::get(pool, options::REMINDERS_LAST_RUN).await?,
        next_scheduled,
    })
}

pub async fn scholarship_count(pool: &PgPool) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM aviation.scholarships")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Postgres-backed implementation of the importer and reminder storage seams.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_term(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        taxonomy: Taxonomy,
        name: &str,
        slug: &str,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO aviation.terms (id, taxonomy, name, slug)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (taxonomy, slug) DO UPDATE SET name = aviation.terms.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(taxonomy.as_str())
        .bind(name)
        .bind(slug)
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("failed to upsert {} term {name}", taxonomy.as_str()))?;
        Ok(id)
    }

    async fn replace_terms(&self, id: Uuid, taxonomy: Taxonomy, names: &[String]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM aviation.scholarship_terms st
            USING aviation.terms t
            WHERE st.term_id = t.id AND st.scholarship_id = $1 AND t.taxonomy = $2
            "#,
        )
        .bind(id)
        .bind(taxonomy.as_str())
        .execute(&mut *tx)
        .await?;

        for name in names {
            let slug = slugify(name);
            if slug.is_empty() {
                continue;
            }
            let term_id = Self::upsert_term(&mut tx, taxonomy, name, &slug).await?;
            sqlx::query(
                "INSERT INTO aviation.scholarship_terms (scholarship_id, term_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(term_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

impl ScholarshipStore for PgStore {
    fn find_by_fingerprint<'a>(
        &'a self,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<ExistingScholarship>>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT id, deadline FROM aviation.scholarships WHERE source_id = $1")
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|row| -> anyhow::Result<ExistingScholarship> {
                Ok(ExistingScholarship {
                    id: row.try_get("id")?,
                    deadline: row.try_get("deadline")?,
                })
            })
            .transpose()
        })
    }

    fn insert_scholarship<'a>(
        &'a self,
        fingerprint: &'a str,
        fields: &'a ScholarshipFields,
    ) -> BoxFuture<'a, anyhow::Result<Uuid>> {
        Box::pin(async move {
            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO aviation.scholarships
                (id, title, deadline, num_awards, max_amount, gpa, affiliation, age,
                 college_program, eligibility, location, link, status, source_id, raw)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'active', $13, $14)
                "#,
            )
            .bind(id)
            .bind(&fields.title)
            .bind(fields.deadline)
            .bind(fields.num_awards)
            .bind(fields.max_amount)
            .bind(&fields.gpa)
            .bind(&fields.affiliation)
            .bind(&fields.age)
            .bind(&fields.college_program)
            .bind(fields.eligibility.unwrap_or(Eligibility::Every).as_str())
            .bind(&fields.location)
            .bind(&fields.link)
            .bind(fingerprint)
            .bind(&fields.raw)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert scholarship {}", fields.title))?;
            Ok(id)
        })
    }

    fn update_scholarship<'a>(
        &'a self,
        id: Uuid,
        fields: &'a ScholarshipFields,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE aviation.scholarships
                SET title = $2,
                    deadline = COALESCE($3, deadline),
                    num_awards = COALESCE($4, num_awards),
                    max_amount = COALESCE($5, max_amount),
                    gpa = COALESCE($6, gpa),
                    affiliation = COALESCE($7, affiliation),
                    age = COALESCE($8, age),
                    college_program = COALESCE($9, college_program),
                    eligibility = COALESCE($10, eligibility),
                    location = COALESCE($11, location),
                    link = COALESCE($12, link),
                    raw = $13,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(&fields.title)
            .bind(fields.deadline)
            .bind(fields.num_awards)
            .bind(fields.max_amount)
            .bind(&fields.gpa)
            .bind(&fields.affiliation)
            .bind(&fields.age)
            .bind(&fields.college_program)
            .bind(fields.eligibility.map(|e| e.as_str()))
            .bind(&fields.location)
            .bind(&fields.link)
            .bind(&fields.raw)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update scholarship {id}"))?;
            Ok(())
        })
    }

    fn assign_terms<'a>(
        &'a self,
        id: Uuid,
        taxonomy: Taxonomy,
        names: &'a [String],
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.replace_terms(id, taxonomy, names))
    }

    fn clear_reminders(&self, scholarship_id: Uuid) -> BoxFuture<'_, anyhow::Result<u64>> {
        Box::pin(clear_reminders(&self.pool, scholarship_id))
    }

    fn delete_scholarship(&self, id: Uuid) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(delete_scholarship(&self.pool, id))
    }

    fn update_deadline_status(
        &self,
        id: Uuid,
        deadline: Option<NaiveDate>,
        status: Option<Status>,
    ) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(update_deadline_status(&self.pool, id, deadline, status))
    }

    fn append_import_log(&self, entry: ImportLogEntry) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(options::append_import_log(&self.pool, entry))
    }
}

impl ReminderStore for PgStore {
    fn active_scholarships_due(
        &self,
        deadline: NaiveDate,
    ) -> BoxFuture<'_, anyhow::Result<Vec<Scholarship>>> {
        Box::pin(async move {
            let query = format!(
                "{SCHOLARSHIP_SELECT} WHERE s.status = 'active' AND s.deadline = $1 ORDER BY s.title"
            );
            let rows = sqlx::query(&query)
                .bind(deadline)
                .fetch_all(&self.pool)
                .await
                .context("failed to load scholarships due")?;
            rows.iter().map(scholarship_from_row).collect()
        })
    }

    fn favorited_by(&self, scholarship_id: Uuid) -> BoxFuture<'_, anyhow::Result<Vec<Uuid>>> {
        Box::pin(async move {
            let users = sqlx::query_scalar(
                "SELECT user_id FROM aviation.favorites WHERE scholarship_id = $1 ORDER BY created_at",
            )
            .bind(scholarship_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(users)
        })
    }

    fn reminder_exists(
        &self,
        user_id: Uuid,
        scholarship_id: Uuid,
        bucket: ReminderBucket,
    ) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move {
            let exists = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM aviation.scholarship_reminders
                    WHERE user_id = $1 AND scholarship_id = $2 AND reminder_type = $3
                )
                "#,
            )
            .bind(user_id)
            .bind(scholarship_id)
            .bind(bucket.as_str())
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
    }

    fn record_reminder(
        &self,
        user_id: Uuid,
        scholarship_id: Uuid,
        bucket: ReminderBucket,
        deadline: NaiveDate,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO aviation.scholarship_reminders
                (user_id, scholarship_id, reminder_type, deadline_date)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, scholarship_id, reminder_type) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(scholarship_id)
            .bind(bucket.as_str())
            .bind(deadline)
            .execute(&self.pool)
            .await
            .context("failed to record reminder")?;
            Ok(())
        })
    }

    fn recipient(&self, user_id: Uuid) -> BoxFuture<'_, anyhow::Result<Option<Recipient>>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, email, first_name, display_name FROM aviation.users WHERE id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|row| -> anyhow::Result<Recipient> {
                Ok(Recipient {
                    id: row.try_get("id")?,
                    email: row.try_get("email")?,
                    first_name: row.try_get("first_name")?,
                    display_name: row.try_get("display_name")?,
                })
            })
            .transpose()
        })
    }
}
