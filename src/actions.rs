//! Owner-scoped writes to the application store.
//!
//! Form input is validated before the store is touched. Malformed URLs are
//! dropped rather than rejected, and a row that is missing or belongs to
//! another owner comes back as `None` / `false`, never as an error.

use chrono::{Datelike, Days, NaiveDate};
use rusqlite::types::Value;
use tracing::info;

use crate::db::Database;
use crate::error::{Error, FieldErrors, Result};
use crate::models::{Application, OwnerId, Source, Stage, Status};
use crate::queries::{FieldChange, NewApplication, text_value};
use crate::validation::{
    FormData, format_date, optional_date, optional_text, parse_date, required_text, sanitize_url,
};

/// Application fields as submitted by a form. `None` means the field was not
/// sent at all; for updates, absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ApplicationForm {
    pub company_name: Option<String>,
    pub role: Option<String>,
    pub stage: Option<String>,
    pub applied_date: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub job_url: Option<String>,
    pub contact_person: Option<String>,
    pub contact_url: Option<String>,
    pub last_contacted_at: Option<String>,
    pub follow_up_date: Option<String>,
    pub notes: Option<String>,
}

impl ApplicationForm {
    pub const FIELDS: [&'static str; 12] = [
        "companyName",
        "role",
        "stage",
        "appliedDate",
        "status",
        "source",
        "jobUrl",
        "contactPerson",
        "contactUrl",
        "lastContactedAt",
        "followUpDate",
        "notes",
    ];

    pub fn from_form(form: &FormData) -> Self {
        let field = |key: &str| form.get(key).map(str::to_string);
        Self {
            company_name: field("companyName"),
            role: field("role"),
            stage: field("stage"),
            applied_date: field("appliedDate"),
            status: field("status"),
            source: field("source"),
            job_url: field("jobUrl"),
            contact_person: field("contactPerson"),
            contact_url: field("contactUrl"),
            last_contacted_at: field("lastContactedAt"),
            follow_up_date: field("followUpDate"),
            notes: field("notes"),
        }
    }
}

/// `from` plus `days` calendar days, or `None` past year 9999 where the
/// stored `YYYY-MM-DD` form no longer holds.
pub fn derive_follow_up(from: NaiveDate, days: u32) -> Option<NaiveDate> {
    from.checked_add_days(Days::new(u64::from(days)))
        .filter(|date| date.year() <= 9999)
}

fn required_date(raw: Option<&str>, errors: &mut FieldErrors) -> Option<NaiveDate> {
    let value = required_text(raw, "appliedDate", "Applied date", errors)?;
    let date = parse_date(&value);
    if date.is_none() {
        errors.add("appliedDate", "Must be a date (YYYY-MM-DD)");
    }
    date
}

pub fn create_application(
    db: &Database,
    owner: &OwnerId,
    form: &ApplicationForm,
) -> Result<Application> {
    let mut errors = FieldErrors::new();
    let company_name = required_text(form.company_name.as_deref(), "companyName", "Company", &mut errors);
    let role = required_text(form.role.as_deref(), "role", "Role", &mut errors);
    let applied_date = required_date(form.applied_date.as_deref(), &mut errors);
    let follow_up_date = optional_date(form.follow_up_date.as_deref(), "followUpDate", &mut errors);
    let last_contacted_at =
        optional_date(form.last_contacted_at.as_deref(), "lastContactedAt", &mut errors);

    let (company_name, role, applied_date) = match (company_name, role, applied_date) {
        (Some(c), Some(r), Some(a)) if errors.is_empty() => (c, r, a),
        _ => return Err(Error::Validation(errors)),
    };

    let follow_up_date = match follow_up_date {
        Some(date) => Some(date),
        None => {
            let days = db.follow_up_days(owner)?;
            derive_follow_up(applied_date, days).map(format_date)
        }
    };

    let app = NewApplication {
        company_name,
        role,
        stage: form.stage.as_deref().map(Stage::from_str_lossy).unwrap_or_default(),
        status: form.status.as_deref().map(Status::from_str_lossy).unwrap_or_default(),
        source: Some(form.source.as_deref().map(Source::from_str_lossy).unwrap_or_default()),
        applied_date: format_date(applied_date),
        job_url: sanitize_url(form.job_url.as_deref()),
        contact_person: optional_text(form.contact_person.as_deref()),
        contact_url: sanitize_url(form.contact_url.as_deref()),
        last_contacted_at,
        follow_up_date,
        notes: optional_text(form.notes.as_deref()),
    };

    let created = db.insert_application(owner, &app)?;
    info!(owner = %owner, id = created.id, company = %created.company_name, "application created");
    Ok(created)
}

/// Apply the fields present in `form` to the owner's application `id`.
pub fn update_application(
    db: &Database,
    owner: &OwnerId,
    id: i64,
    form: &ApplicationForm,
) -> Result<Option<Application>> {
    let mut errors = FieldErrors::new();
    let mut changes: Vec<FieldChange> = Vec::new();

    if let Some(raw) = form.company_name.as_deref() {
        let value = required_text(Some(raw), "companyName", "Company", &mut errors);
        changes.push(("company_name", text_value(value)));
    }
    if let Some(raw) = form.role.as_deref() {
        let value = required_text(Some(raw), "role", "Role", &mut errors);
        changes.push(("role", text_value(value)));
    }
    if let Some(raw) = form.applied_date.as_deref() {
        let value = required_date(Some(raw), &mut errors).map(format_date);
        changes.push(("applied_date", text_value(value)));
    }
    if let Some(raw) = form.stage.as_deref() {
        changes.push(("stage", Value::Text(Stage::from_str_lossy(raw).as_str().to_string())));
    }
    if let Some(raw) = form.status.as_deref() {
        changes.push(("status", Value::Text(Status::from_str_lossy(raw).as_str().to_string())));
    }
    if let Some(raw) = form.source.as_deref() {
        changes.push(("source", Value::Text(Source::from_str_lossy(raw).as_str().to_string())));
    }
    if let Some(raw) = form.job_url.as_deref() {
        changes.push(("job_url", text_value(sanitize_url(Some(raw)))));
    }
    if let Some(raw) = form.contact_url.as_deref() {
        changes.push(("contact_url", text_value(sanitize_url(Some(raw)))));
    }
    if let Some(raw) = form.contact_person.as_deref() {
        changes.push(("contact_person", text_value(optional_text(Some(raw)))));
    }
    if let Some(raw) = form.notes.as_deref() {
        changes.push(("notes", text_value(optional_text(Some(raw)))));
    }
    if let Some(raw) = form.last_contacted_at.as_deref() {
        let value = optional_date(Some(raw), "lastContactedAt", &mut errors);
        changes.push(("last_contacted_at", text_value(value)));
    }
    if let Some(raw) = form.follow_up_date.as_deref() {
        let value = optional_date(Some(raw), "followUpDate", &mut errors);
        changes.push(("follow_up_date", text_value(value)));
    }

    errors.into_result()?;
    let updated = db.update_application_fields(owner, id, changes)?;
    if updated.is_some() {
        info!(owner = %owner, id, "application updated");
    }
    Ok(updated)
}

/// Remove the owner's application. `false` when there was nothing to remove.
pub fn delete_application(db: &Database, owner: &OwnerId, id: i64) -> Result<bool> {
    let deleted = db.delete_application(owner, id)?;
    if deleted {
        info!(owner = %owner, id, "application deleted");
    }
    Ok(deleted)
}

/// Move an application to any status; no transition order is enforced.
pub fn set_status(
    db: &Database,
    owner: &OwnerId,
    id: i64,
    status: Status,
) -> Result<Option<Application>> {
    let changes = vec![("status", Value::Text(status.as_str().to_string()))];
    db.update_application_fields(owner, id, changes)
}

/// Set or clear the follow-up date.
pub fn set_follow_up(
    db: &Database,
    owner: &OwnerId,
    id: i64,
    date: Option<NaiveDate>,
) -> Result<Option<Application>> {
    let changes = vec![("follow_up_date", text_value(date.map(format_date)))];
    db.update_application_fields(owner, id, changes)
}

/// Record a contact made `today` and schedule the next follow-up, replacing
/// whatever follow-up date was there.
pub fn mark_contacted(
    db: &Database,
    owner: &OwnerId,
    id: i64,
    today: NaiveDate,
) -> Result<Option<Application>> {
    let days = db.follow_up_days(owner)?;
    let changes = vec![
        ("last_contacted_at", Value::Text(format_date(today))),
        (
            "follow_up_date",
            text_value(derive_follow_up(today, days).map(format_date)),
        ),
    ];
    let updated = db.update_application_fields(owner, id, changes)?;
    if let Some(app) = &updated {
        info!(owner = %owner, id, follow_up = ?app.follow_up_date, "marked contacted");
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{owner, test_db};
    use crate::vault::ProfilePatch;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn form(pairs: &[(&str, &str)]) -> ApplicationForm {
        let data: FormData = pairs.iter().copied().collect();
        ApplicationForm::from_form(&data)
    }

    fn basic() -> ApplicationForm {
        form(&[
            ("companyName", "Acme"),
            ("role", "Backend Engineer"),
            ("appliedDate", "2024-01-10"),
        ])
    }

    fn set_follow_up_days(db: &Database, who: &OwnerId, days: u32) {
        let patch = ProfilePatch {
            default_follow_up_days: Some(days),
            ..Default::default()
        };
        db.upsert_profile(who, &patch).unwrap();
    }

    #[test]
    fn create_round_trips_fields() {
        let db = test_db();
        let alice = owner("alice");
        let input = form(&[
            ("companyName", "Acme, Inc."),
            ("role", "Staff Engineer"),
            ("stage", "series-a"),
            ("appliedDate", "2024-01-10"),
            ("status", "dm_sent"),
            ("source", "referral"),
            ("jobUrl", "https://acme.dev/jobs/42"),
            ("contactPerson", "Wile E."),
            ("contactUrl", "https://linkedin.com/in/wile"),
            ("lastContactedAt", "2024-01-11"),
            ("followUpDate", "2024-01-20"),
            ("notes", "Said \"call me\"\nnext week"),
        ]);
        let created = create_application(&db, &alice, &input).unwrap();
        let fetched = db.get_application(&alice, created.id).unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.owner_id, "alice");
        assert_eq!(fetched.company_name, "Acme, Inc.");
        assert_eq!(fetched.stage, Stage::SeriesA);
        assert_eq!(fetched.status, Status::DmSent);
        assert_eq!(fetched.source, Some(Source::Referral));
        assert_eq!(fetched.job_url.as_deref(), Some("https://acme.dev/jobs/42"));
        assert_eq!(fetched.contact_person.as_deref(), Some("Wile E."));
        assert_eq!(fetched.last_contacted_at.as_deref(), Some("2024-01-11"));
        assert_eq!(fetched.follow_up_date.as_deref(), Some("2024-01-20"));
        assert_eq!(fetched.notes.as_deref(), Some("Said \"call me\"\nnext week"));
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[test]
    fn create_applies_vocabulary_defaults() {
        let db = test_db();
        let alice = owner("alice");
        let mut input = basic();
        input.stage = Some("series-z".to_string());
        input.status = Some("hired".to_string());
        let app = create_application(&db, &alice, &input).unwrap();
        assert_eq!(app.stage, Stage::Unknown);
        assert_eq!(app.status, Status::Applied);
        assert_eq!(app.source, Some(Source::Other));
    }

    #[test]
    fn create_requires_company_role_and_date() {
        let db = test_db();
        let input = form(&[("companyName", "  "), ("appliedDate", "10/01/2024")]);
        let errors = match create_application(&db, &owner("alice"), &input) {
            Err(Error::Validation(errors)) => errors,
            other => panic!("expected validation error, got {:?}", other),
        };
        assert_eq!(errors.get("companyName").unwrap(), ["Company is required"]);
        assert_eq!(errors.get("role").unwrap(), ["Role is required"]);
        assert_eq!(errors.get("appliedDate").unwrap(), ["Must be a date (YYYY-MM-DD)"]);
        assert!(
            db.list_applications(&owner("alice"), &Default::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn follow_up_defaults_to_seven_days_without_profile() {
        let db = test_db();
        let app = create_application(&db, &owner("alice"), &basic()).unwrap();
        assert_eq!(app.follow_up_date.as_deref(), Some("2024-01-17"));
    }

    #[test]
    fn follow_up_uses_profile_delay() {
        let db = test_db();
        let alice = owner("alice");
        set_follow_up_days(&db, &alice, 7);
        let app = create_application(&db, &alice, &basic()).unwrap();
        assert_eq!(app.follow_up_date.as_deref(), Some("2024-01-17"));

        set_follow_up_days(&db, &alice, 30);
        let mut input = basic();
        input.applied_date = Some("2024-02-10".to_string());
        let app = create_application(&db, &alice, &input).unwrap();
        assert_eq!(app.follow_up_date.as_deref(), Some("2024-03-11"));
    }

    #[test]
    fn explicit_follow_up_is_kept() {
        let db = test_db();
        let mut input = basic();
        input.follow_up_date = Some("2024-02-01".to_string());
        let app = create_application(&db, &owner("alice"), &input).unwrap();
        assert_eq!(app.follow_up_date.as_deref(), Some("2024-02-01"));
    }

    #[test]
    fn unsafe_urls_are_dropped_not_rejected() {
        let db = test_db();
        let mut input = basic();
        input.contact_url = Some("javascript:alert(1)".to_string());
        input.job_url = Some("not a url".to_string());
        let app = create_application(&db, &owner("alice"), &input).unwrap();
        assert_eq!(app.contact_url, None);
        assert_eq!(app.job_url, None);
    }

    #[test]
    fn other_owners_cannot_touch_rows() {
        let db = test_db();
        let (alice, bob) = (owner("alice"), owner("bob"));
        let app = create_application(&db, &alice, &basic()).unwrap();

        let edit = form(&[("role", "Intruder")]);
        assert!(update_application(&db, &bob, app.id, &edit).unwrap().is_none());
        assert!(set_status(&db, &bob, app.id, Status::Offer).unwrap().is_none());
        assert!(set_follow_up(&db, &bob, app.id, None).unwrap().is_none());
        assert!(mark_contacted(&db, &bob, app.id, date("2024-06-01")).unwrap().is_none());
        assert!(!delete_application(&db, &bob, app.id).unwrap());

        assert_eq!(db.get_application(&alice, app.id).unwrap().unwrap(), app);
    }

    #[test]
    fn update_changes_only_present_fields() {
        let db = test_db();
        let alice = owner("alice");
        let app = create_application(&db, &alice, &basic()).unwrap();

        let edit = form(&[
            ("role", "Principal Engineer"),
            ("contactUrl", "ftp://nope"),
            ("notes", ""),
            ("status", "bogus"),
        ]);
        let updated = update_application(&db, &alice, app.id, &edit).unwrap().unwrap();
        assert_eq!(updated.role, "Principal Engineer");
        assert_eq!(updated.company_name, "Acme");
        assert_eq!(updated.contact_url, None);
        assert_eq!(updated.status, Status::Applied);
        assert_eq!(updated.follow_up_date, app.follow_up_date);
        assert!(updated.updated_at >= app.updated_at);
        assert_eq!(updated.created_at, app.created_at);
    }

    #[test]
    fn update_rejects_blank_required_fields() {
        let db = test_db();
        let alice = owner("alice");
        let app = create_application(&db, &alice, &basic()).unwrap();

        let edit = form(&[("companyName", ""), ("role", "Changed")]);
        assert!(matches!(
            update_application(&db, &alice, app.id, &edit),
            Err(Error::Validation(_))
        ));
        assert_eq!(db.get_application(&alice, app.id).unwrap().unwrap().role, "Backend Engineer");
    }

    #[test]
    fn status_can_move_in_any_direction() {
        let db = test_db();
        let alice = owner("alice");
        let app = create_application(&db, &alice, &basic()).unwrap();
        for status in [Status::Offer, Status::Applied, Status::Ghosted, Status::Interview] {
            let updated = set_status(&db, &alice, app.id, status).unwrap().unwrap();
            assert_eq!(updated.status, status);
        }
    }

    #[test]
    fn set_follow_up_sets_and_clears() {
        let db = test_db();
        let alice = owner("alice");
        let app = create_application(&db, &alice, &basic()).unwrap();

        let updated = set_follow_up(&db, &alice, app.id, Some(date("2024-03-03"))).unwrap().unwrap();
        assert_eq!(updated.follow_up_date.as_deref(), Some("2024-03-03"));
        let cleared = set_follow_up(&db, &alice, app.id, None).unwrap().unwrap();
        assert_eq!(cleared.follow_up_date, None);
    }

    #[test]
    fn mark_contacted_reschedules_from_today() {
        let db = test_db();
        let alice = owner("alice");
        set_follow_up_days(&db, &alice, 5);
        let mut input = basic();
        input.follow_up_date = Some("2024-12-31".to_string());
        let app = create_application(&db, &alice, &input).unwrap();

        let updated = mark_contacted(&db, &alice, app.id, date("2024-06-01")).unwrap().unwrap();
        assert_eq!(updated.last_contacted_at.as_deref(), Some("2024-06-01"));
        assert_eq!(updated.follow_up_date.as_deref(), Some("2024-06-06"));
    }

    #[test]
    fn delete_is_silent_for_missing_rows() {
        let db = test_db();
        let alice = owner("alice");
        let app = create_application(&db, &alice, &basic()).unwrap();
        assert!(delete_application(&db, &alice, app.id).unwrap());
        assert!(!delete_application(&db, &alice, app.id).unwrap());
        assert!(db.get_application(&alice, app.id).unwrap().is_none());
    }

    #[test]
    fn derive_follow_up_crosses_month_and_leap_day() {
        assert_eq!(derive_follow_up(date("2024-02-25"), 7), Some(date("2024-03-03")));
        assert_eq!(derive_follow_up(date("2023-12-28"), 7), Some(date("2024-01-04")));
    }

    #[test]
    fn no_follow_up_is_derived_past_year_9999() {
        assert_eq!(derive_follow_up(date("9999-12-30"), 7), None);
        assert_eq!(derive_follow_up(date("9999-12-20"), 7), Some(date("9999-12-27")));

        let db = test_db();
        let alice = owner("alice");
        let app = create_application(
            &db,
            &alice,
            &form(&[
                ("companyName", "Acme"),
                ("role", "Engineer"),
                ("appliedDate", "9999-12-30"),
            ]),
        )
        .unwrap();
        assert_eq!(app.follow_up_date, None);
        assert!(db.overdue_follow_ups(&alice, date("2024-01-01")).unwrap().is_empty());
    }

    #[test]
    fn company_and_role_are_stored_as_entered() {
        let db = test_db();
        let alice = owner("alice");
        let created = create_application(
            &db,
            &alice,
            &form(&[
                ("companyName", "  Acme, Inc. "),
                ("role", "Engineer "),
                ("appliedDate", "2024-01-10"),
            ]),
        )
        .unwrap();
        let fetched = db.get_application(&alice, created.id).unwrap().unwrap();
        assert_eq!(fetched.company_name, "  Acme, Inc. ");
        assert_eq!(fetched.role, "Engineer ");

        let blank = create_application(
            &db,
            &alice,
            &form(&[("companyName", "   "), ("role", "Engineer"), ("appliedDate", "2024-01-10")]),
        );
        assert!(matches!(blank, Err(Error::Validation(_))));
    }
}
