use chrono::NaiveDate;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::str::FromStr;
use tracing::debug;

use crate::db::{APPLICATION_COLUMNS, Database, now_timestamp};
use crate::error::Result;
use crate::models::{Application, DashboardStats, OwnerId, Source, Stage, Status};
use crate::validation::format_date;

/// Ordering for the application list. Both keys sort newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListSort {
    #[default]
    AppliedDate,
    UpdatedAt,
}

impl FromStr for ListSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "applied" | "appliedDate" => Ok(ListSort::AppliedDate),
            "updated" | "updatedAt" => Ok(ListSort::UpdatedAt),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub status: Option<Status>,
    pub source: Option<Source>,
    /// Case-insensitive substring of the company name.
    pub search: Option<String>,
    pub sort: ListSort,
}

/// A validated application ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub company_name: String,
    pub role: String,
    pub stage: Stage,
    pub status: Status,
    pub source: Option<Source>,
    pub applied_date: String,
    pub job_url: Option<String>,
    pub contact_person: Option<String>,
    pub contact_url: Option<String>,
    pub last_contacted_at: Option<String>,
    pub follow_up_date: Option<String>,
    pub notes: Option<String>,
}

/// Column assignment for an owner-scoped update.
pub(crate) type FieldChange = (&'static str, Value);

pub(crate) fn text_value(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

fn status_list(statuses: &[Status]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whole-number percentage, rounding halves up.
fn percent(part: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (part, total) = (u64::from(part), u64::from(total));
    ((part * 200 + total) / (total * 2)) as u32
}

impl Database {
    // --- Reads ---

    pub fn list_applications(
        &self,
        owner: &OwnerId,
        filters: &ListFilters,
    ) -> Result<Vec<Application>> {
        let mut sql = format!(
            "SELECT {} FROM applications WHERE owner_id = ?1",
            APPLICATION_COLUMNS
        );
        let mut params: Vec<Value> = vec![Value::Text(owner.as_str().to_string())];

        if let Some(status) = filters.status {
            params.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }

        if let Some(source) = filters.source {
            params.push(Value::Text(source.as_str().to_string()));
            sql.push_str(&format!(" AND source = ?{}", params.len()));
        }

        if let Some(search) = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            params.push(Value::Text(search.to_lowercase()));
            sql.push_str(&format!(
                " AND instr(fold_case(company_name), ?{}) > 0",
                params.len()
            ));
        }

        sql.push_str(match filters.sort {
            ListSort::AppliedDate => " ORDER BY applied_date DESC, id DESC",
            ListSort::UpdatedAt => " ORDER BY updated_at DESC, id DESC",
        });

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), Self::row_to_application)?;
        let apps = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(owner = %owner, count = apps.len(), "listed applications");
        Ok(apps)
    }

    pub fn get_application(&self, owner: &OwnerId, id: i64) -> Result<Option<Application>> {
        let result = self.conn().query_row(
            &format!(
                "SELECT {} FROM applications WHERE id = ?1 AND owner_id = ?2",
                APPLICATION_COLUMNS
            ),
            rusqlite::params![id, owner.as_str()],
            Self::row_to_application,
        );
        match result {
            Ok(app) => Ok(Some(app)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Aggregates over every application the owner has, ignoring list filters.
    pub fn dashboard_stats(&self, owner: &OwnerId) -> Result<DashboardStats> {
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status IN ({}) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = '{}' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = '{}' THEN 1 ELSE 0 END), 0)
             FROM applications WHERE owner_id = ?1",
            status_list(&Status::REPLIES),
            Status::Interview.as_str(),
            Status::Offer.as_str(),
        );
        let (total, replies, interviews, offers): (u32, u32, u32, u32) =
            self.conn().query_row(&sql, [owner.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;

        Ok(DashboardStats {
            total,
            replies,
            interviews,
            offers,
            reply_rate: percent(replies, total),
            offer_rate: percent(offers, total),
        })
    }

    /// Open applications whose follow-up date is on or before `today`,
    /// earliest first. Dates compare as `YYYY-MM-DD` strings.
    pub fn overdue_follow_ups(&self, owner: &OwnerId, today: NaiveDate) -> Result<Vec<Application>> {
        let sql = format!(
            "SELECT {} FROM applications
             WHERE owner_id = ?1
               AND follow_up_date IS NOT NULL
               AND follow_up_date <= ?2
               AND status NOT IN ({})
             ORDER BY follow_up_date ASC, id ASC",
            APPLICATION_COLUMNS,
            status_list(&Status::CLOSED),
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![owner.as_str(), format_date(today)],
            Self::row_to_application,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every application of the owner in export order.
    pub fn export_projection(&self, owner: &OwnerId) -> Result<Vec<Application>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM applications WHERE owner_id = ?1 ORDER BY applied_date DESC, id DESC",
            APPLICATION_COLUMNS
        ))?;
        let rows = stmt.query_map([owner.as_str()], Self::row_to_application)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // --- Owner-scoped write primitives ---

    pub(crate) fn insert_application(
        &self,
        owner: &OwnerId,
        app: &NewApplication,
    ) -> Result<Application> {
        let now = now_timestamp();
        self.conn().execute(
            "INSERT INTO applications (owner_id, company_name, role, stage, status, source,
                 applied_date, job_url, contact_person, contact_url, last_contacted_at,
                 follow_up_date, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            rusqlite::params![
                owner.as_str(),
                app.company_name,
                app.role,
                app.stage.as_str(),
                app.status.as_str(),
                app.source.map(|s| s.as_str()),
                app.applied_date,
                app.job_url,
                app.contact_person,
                app.contact_url,
                app.last_contacted_at,
                app.follow_up_date,
                app.notes,
                now,
            ],
        )?;
        let id = self.conn().last_insert_rowid();

        self.get_application(owner, id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// Apply `changes` to the row matching both `id` and `owner`, refreshing
    /// `updated_at`. `None` when no such row exists for this owner.
    pub(crate) fn update_application_fields(
        &self,
        owner: &OwnerId,
        id: i64,
        changes: Vec<FieldChange>,
    ) -> Result<Option<Application>> {
        let mut assignments = Vec::with_capacity(changes.len() + 1);
        let mut params = Vec::with_capacity(changes.len() + 3);
        for (column, value) in changes {
            params.push(value);
            assignments.push(format!("{} = ?{}", column, params.len()));
        }
        params.push(Value::Text(now_timestamp()));
        assignments.push(format!("updated_at = ?{}", params.len()));

        params.push(Value::Integer(id));
        let id_param = params.len();
        params.push(Value::Text(owner.as_str().to_string()));
        let owner_param = params.len();

        let sql = format!(
            "UPDATE applications SET {} WHERE id = ?{} AND owner_id = ?{}",
            assignments.join(", "),
            id_param,
            owner_param
        );
        let affected = self.conn().execute(&sql, params_from_iter(params.iter()))?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_application(owner, id)
    }

    pub(crate) fn delete_application(&self, owner: &OwnerId, id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM applications WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![id, owner.as_str()],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::NewApplication;
    use crate::models::{Source, Stage, Status};

    pub fn new_app(company: &str, applied: &str, status: Status) -> NewApplication {
        NewApplication {
            company_name: company.to_string(),
            role: "Engineer".to_string(),
            stage: Stage::Seed,
            status,
            source: Some(Source::Other),
            applied_date: applied.to_string(),
            job_url: None,
            contact_person: None,
            contact_url: None,
            last_contacted_at: None,
            follow_up_date: None,
            notes: None,
        }
    }
}
