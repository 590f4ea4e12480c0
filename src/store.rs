use anyhow::Result;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::models::{
    ExistingScholarship, ImportLogEntry, Recipient, ReminderBucket, Scholarship, ScholarshipFields,
    Status, Taxonomy,
};

/// An edit only moves the deadline when it names a date different from the stored one.
pub fn deadline_changed(current: Option<NaiveDate>, edited: Option<NaiveDate>) -> bool {
    edited.is_some() && edited != current
}

/// Persistence needed by the importer.
pub trait ScholarshipStore: Send + Sync {
    fn find_by_fingerprint<'a>(
        &'a self,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<Option<ExistingScholarship>>>;

    /// Creates a record with status `active` and returns its id.
    fn insert_scholarship<'a>(
        &'a self,
        fingerprint: &'a str,
        fields: &'a ScholarshipFields,
    ) -> BoxFuture<'a, Result<Uuid>>;

    /// Overwrites only the fields that are `Some` (title and raw row always).
    fn update_scholarship<'a>(
        &'a self,
        id: Uuid,
        fields: &'a ScholarshipFields,
    ) -> BoxFuture<'a, Result<()>>;

    /// Replaces the record's terms in `taxonomy`, creating missing terms by slug.
    fn assign_terms<'a>(
        &'a self,
        id: Uuid,
        taxonomy: Taxonomy,
        names: &'a [String],
    ) -> BoxFuture<'a, Result<()>>;

    fn clear_reminders(&self, scholarship_id: Uuid) -> BoxFuture<'_, Result<u64>>;

    /// Removes the record with its reminder log. `false` when no such record exists.
    fn delete_scholarship(&self, id: Uuid) -> BoxFuture<'_, Result<bool>>;

    /// Admin edit of deadline and status. A moved deadline clears the reminder log.
    fn update_deadline_status(
        &self,
        id: Uuid,
        deadline: Option<NaiveDate>,
        status: Option<Status>,
    ) -> BoxFuture<'_, Result<bool>>;

    fn append_import_log(&self, entry: ImportLogEntry) -> BoxFuture<'_, Result<()>>;
}

/// Persistence needed by the reminder manager.
pub trait ReminderStore: Send + Sync {
    fn active_scholarships_due(&self, deadline: NaiveDate)
        -> BoxFuture<'_, Result<Vec<Scholarship>>>;

    fn favorited_by(&self, scholarship_id: Uuid) -> BoxFuture<'_, Result<Vec<Uuid>>>;

    fn reminder_exists(
        &self,
        user_id: Uuid,
        scholarship_id: Uuid,
        bucket: ReminderBucket,
    ) -> BoxFuture<'_, Result<bool>>;

    fn record_reminder(
        &self,
        user_id: Uuid,
        scholarship_id: Uuid,
        bucket: ReminderBucket,
        deadline: NaiveDate,
    ) -> BoxFuture<'_, Result<()>>;

    fn recipient(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<Recipient>>>;
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::mapping::slugify;
    use crate::models::{Eligibility, ReminderRecord};

    #[derive(Default)]
    pub struct Inner {
        pub scholarships: Vec<(String, Scholarship)>,
        pub terms: HashMap<(Taxonomy, String), String>,
        pub favorites: Vec<(Uuid, Uuid)>,
        pub recipients: HashMap<Uuid, Recipient>,
        pub reminders: Vec<ReminderRecord>,
        pub logs: Vec<ImportLogEntry>,
    }

    /// Store kept in memory for importer and reminder tests.
    #[derive(Default)]
    pub struct MemoryStore {
        pub inner: Mutex<Inner>,
    }

    impl MemoryStore {
        pub fn add_recipient(&self, email: &str, first_name: Option<&str>) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().recipients.insert(
                id,
                Recipient {
                    id,
                    email: email.to_string(),
                    first_name: first_name.map(str::to_string),
                    display_name: email.to_string(),
                },
            );
            id
        }

        pub fn add_scholarship(&self, title: &str, deadline: NaiveDate, status: Status) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().scholarships.push((
                format!("manual-{id}"),
                Scholarship {
                    id,
                    title: title.to_string(),
                    deadline: Some(deadline),
                    max_amount: Some(5000),
                    num_awards: None,
                    gpa: None,
                    affiliation: None,
                    age: None,
                    college_program: None,
                    eligibility: Eligibility::Every,
                    location: None,
                    link: None,
                    status,
                    categories: Vec::new(),
                    license_types: Vec::new(),
                },
            ));
            id
        }

        pub fn favorite(&self, user_id: Uuid, scholarship_id: Uuid) {
            self.inner
                .lock()
                .unwrap()
                .favorites
                .push((user_id, scholarship_id));
        }

        pub fn scholarship_count(&self) -> usize {
            self.inner.lock().unwrap().scholarships.len()
        }

        pub fn reminder_count(&self) -> usize {
            self.inner.lock().unwrap().reminders.len()
        }

        pub fn scholarship_by_title(&self, title: &str) -> Option<Scholarship> {
            self.inner
                .lock()
                .unwrap()
                .scholarships
                .iter()
                .find(|(_, s)| s.title == title)
                .map(|(_, s)| s.clone())
        }
    }

    fn apply(target: &mut Scholarship, fields: &ScholarshipFields) {
        target.title = fields.title.clone();
        if fields.deadline.is_some() {
            target.deadline = fields.deadline;
        }
        if fields.num_awards.is_some() {
            target.num_awards = fields.num_awards;
        }
        if fields.max_amount.is_some() {
            target.max_amount = fields.max_amount;
        }
        if let Some(eligibility) = fields.eligibility {
            target.eligibility = eligibility;
        }
        for (slot, value) in [
            (&mut target.gpa, &fields.gpa),
            (&mut target.affiliation, &fields.affiliation),
            (&mut target.age, &fields.age),
            (&mut target.college_program, &fields.college_program),
            (&mut target.location, &fields.location),
            (&mut target.link, &fields.link),
        ] {
            if value.is_some() {
                *slot = value.clone();
            }
        }
    }

    impl ScholarshipStore for MemoryStore {
        fn find_by_fingerprint<'a>(
            &'a self,
            fingerprint: &'a str,
        ) -> BoxFuture<'a, Result<Option<ExistingScholarship>>> {
            Box::pin(async move {
                let inner = self.inner.lock().unwrap();
                Ok(inner
                    .scholarships
                    .iter()
                    .find(|(key, _)| key == fingerprint)
                    .map(|(_, s)| ExistingScholarship {
                        id: s.id,
                        deadline: s.deadline,
                    }))
            })
        }

        fn insert_scholarship<'a>(
            &'a self,
            fingerprint: &'a str,
            fields: &'a ScholarshipFields,
        ) -> BoxFuture<'a, Result<Uuid>> {
            Box::pin(async move {
                let id = Uuid::new_v4();
                let mut scholarship = Scholarship {
                    id,
                    title: String::new(),
                    deadline: None,
                    max_amount: None,
                    num_awards: None,
                    gpa: None,
                    affiliation: None,
                    age: None,
                    college_program: None,
                    eligibility: Eligibility::Every,
                    location: None,
                    link: None,
                    status: Status::Active,
                    categories: Vec::new(),
                    license_types: Vec::new(),
                };
                apply(&mut scholarship, fields);
                self.inner
                    .lock()
                    .unwrap()
                    .scholarships
                    .push((fingerprint.to_string(), scholarship));
                Ok(id)
            })
        }

        fn update_scholarship<'a>(
            &'a self,
            id: Uuid,
            fields: &'a ScholarshipFields,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let mut inner = self.inner.lock().unwrap();
                if let Some((_, scholarship)) =
                    inner.scholarships.iter_mut().find(|(_, s)| s.id == id)
                {
                    apply(scholarship, fields);
                }
                Ok(())
            })
        }

        fn assign_terms<'a>(
            &'a self,
            id: Uuid,
            taxonomy: Taxonomy,
            names: &'a [String],
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let mut inner = self.inner.lock().unwrap();
                let mut assigned = Vec::new();
                for name in names {
                    let key = (taxonomy, slugify(name));
                    let stored = inner.terms.entry(key).or_insert_with(|| name.clone());
                    assigned.push(stored.clone());
                }
                if let Some((_, scholarship)) =
                    inner.scholarships.iter_mut().find(|(_, s)| s.id == id)
                {
                    match taxonomy {
                        Taxonomy::Category => scholarship.categories = assigned,
                        Taxonomy::LicenseType => scholarship.license_types = assigned,
                    }
                }
                Ok(())
            })
        }

        fn clear_reminders(&self, scholarship_id: Uuid) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move {
                let mut inner = self.inner.lock().unwrap();
                let before = inner.reminders.len();
                inner
                    .reminders
                    .retain(|record| record.scholarship_id != scholarship_id);
                Ok((before - inner.reminders.len()) as u64)
            })
        }

        fn delete_scholarship(&self, id: Uuid) -> BoxFuture<'_, Result<bool>> {
            Box::pin(async move {
                let mut inner = self.inner.lock().unwrap();
                let before = inner.scholarships.len();
                inner.scholarships.retain(|(_, s)| s.id != id);
                if inner.scholarships.len() == before {
                    return Ok(false);
                }
                inner.reminders.retain(|record| record.scholarship_id != id);
                inner.favorites.retain(|(_, favorite)| *favorite != id);
                Ok(true)
            })
        }

        fn update_deadline_status(
            &self,
            id: Uuid,
            deadline: Option<NaiveDate>,
            status: Option<Status>,
        ) -> BoxFuture<'_, Result<bool>> {
            Box::pin(async move {
                let mut inner = self.inner.lock().unwrap();
                let Some((_, scholarship)) =
                    inner.scholarships.iter_mut().find(|(_, s)| s.id == id)
                else {
                    return Ok(false);
                };

                let moved = deadline_changed(scholarship.deadline, deadline);
                if deadline.is_some() {
                    scholarship.deadline = deadline;
                }
                if let Some(status) = status {
                    scholarship.status = status;
                }
                if moved {
                    inner.reminders.retain(|record| record.scholarship_id != id);
                }
                Ok(true)
            })
        }

        fn append_import_log(&self, entry: ImportLogEntry) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.inner.lock().unwrap().logs.push(entry);
                Ok(())
            })
        }
    }

    impl ReminderStore for MemoryStore {
        fn active_scholarships_due(
            &self,
            deadline: NaiveDate,
        ) -> BoxFuture<'_, Result<Vec<Scholarship>>> {
            Box::pin(async move {
                let inner = self.inner.lock().unwrap();
                Ok(inner
                    .scholarships
                    .iter()
                    .map(|(_, s)| s)
                    .filter(|s| s.status == Status::Active && s.deadline == Some(deadline))
                    .cloned()
                    .collect())
            })
        }

        fn favorited_by(&self, scholarship_id: Uuid) -> BoxFuture<'_, Result<Vec<Uuid>>> {
            Box::pin(async move {
                let inner = self.inner.lock().unwrap();
                Ok(inner
                    .favorites
                    .iter()
                    .filter(|(_, favorite)| *favorite == scholarship_id)
                    .map(|(user, _)| *user)
                    .collect())
            })
        }

        fn reminder_exists(
            &self,
            user_id: Uuid,
            scholarship_id: Uuid,
            bucket: ReminderBucket,
        ) -> BoxFuture<'_, Result<bool>> {
            Box::pin(async move {
                let inner = self.inner.lock().unwrap();
                Ok(inner.reminders.iter().any(|record| {
                    record.user_id == user_id
                        && record.scholarship_id == scholarship_id
                        && record.reminder_type == bucket
                }))
            })
        }

        fn record_reminder(
            &self,
            user_id: Uuid,
            scholarship_id: Uuid,
            bucket: ReminderBucket,
            deadline: NaiveDate,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                let mut inner = self.inner.lock().unwrap();
                let id = inner.reminders.len() as i64 + 1;
                inner.reminders.push(ReminderRecord {
                    id,
                    user_id,
                    scholarship_id,
                    reminder_type: bucket,
                    deadline_date: deadline,
                    sent_date: Utc::now(),
                });
                Ok(())
            })
        }

        fn recipient(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<Recipient>>> {
            Box::pin(async move { Ok(self.inner.lock().unwrap().recipients.get(&user_id).cloned()) })
        }
    }
}
