use chrono::{SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Application, ResumeFile, Source, Stage, Status, UserProfile, VaultSnippet};

pub(crate) const APPLICATION_COLUMNS: &str = "id, owner_id, company_name, role, stage, status, source, \
     applied_date, job_url, contact_person, contact_url, last_contacted_at, follow_up_date, notes, \
     created_at, updated_at";

pub(crate) const PROFILE_COLUMNS: &str = "owner_id, full_name, email, phone, location, \
     portfolio_url, github_url, linkedin_url, twitter_url, resume_url, \
     resume_file_key, resume_file_name, resume_mime_type, resume_uploaded_at, \
     default_follow_up_days, updated_at";

pub(crate) const SNIPPET_COLUMNS: &str = "id, owner_id, title, content, created_at, updated_at";

/// `fold_case(text)`: Unicode lowercase, since SQLite's `LOWER` only folds ASCII.
fn register_fold_case(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
    )
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        register_fold_case(&conn)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                company_name TEXT NOT NULL,
                role TEXT NOT NULL,
                stage TEXT NOT NULL DEFAULT 'unknown'
                    CHECK (stage IN ('pre-seed', 'seed', 'series-a', 'series-b', 'unknown')),
                status TEXT NOT NULL DEFAULT 'applied'
                    CHECK (status IN ('applied', 'dm_sent', 'replied', 'interview', 'rejected', 'offer', 'ghosted')),
                source TEXT DEFAULT 'other'
                    CHECK (source IN ('wellfound', 'linkedin', 'referral', 'twitter', 'cold_email', 'other')),
                applied_date TEXT NOT NULL,
                job_url TEXT,
                contact_person TEXT,
                contact_url TEXT,
                last_contacted_at TEXT,
                follow_up_date TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL UNIQUE,
                full_name TEXT,
                email TEXT,
                phone TEXT,
                location TEXT,
                portfolio_url TEXT,
                github_url TEXT,
                linkedin_url TEXT,
                twitter_url TEXT,
                resume_url TEXT,
                resume_file_key TEXT,
                resume_file_name TEXT,
                resume_mime_type TEXT,
                resume_uploaded_at TEXT,
                default_follow_up_days INTEGER NOT NULL DEFAULT 7
                    CHECK (default_follow_up_days BETWEEN 1 AND 30),
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vault_snippets (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_applications_owner_applied ON applications(owner_id, applied_date);
            CREATE INDEX IF NOT EXISTS idx_applications_owner_follow_up ON applications(owner_id, follow_up_date);
            CREATE INDEX IF NOT EXISTS idx_snippets_owner ON vault_snippets(owner_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    pub(crate) fn row_to_application(row: &Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            company_name: row.get(2)?,
            role: row.get(3)?,
            stage: Stage::from_str_lossy(&row.get::<_, String>(4)?),
            status: Status::from_str_lossy(&row.get::<_, String>(5)?),
            source: row
                .get::<_, Option<String>>(6)?
                .map(|s| Source::from_str_lossy(&s)),
            applied_date: row.get(7)?,
            job_url: row.get(8)?,
            contact_person: row.get(9)?,
            contact_url: row.get(10)?,
            last_contacted_at: row.get(11)?,
            follow_up_date: row.get(12)?,
            notes: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    pub(crate) fn row_to_profile(row: &Row) -> rusqlite::Result<UserProfile> {
        let key: Option<String> = row.get(10)?;
        let resume_file = match key {
            Some(key) => Some(ResumeFile {
                key,
                name: row
                    .get::<_, Option<String>>(11)?
                    .unwrap_or_else(|| "resume".to_string()),
                mime_type: row
                    .get::<_, Option<String>>(12)?
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                uploaded_at: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
            }),
            None => None,
        };
        Ok(UserProfile {
            owner_id: row.get(0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            location: row.get(4)?,
            portfolio_url: row.get(5)?,
            github_url: row.get(6)?,
            linkedin_url: row.get(7)?,
            twitter_url: row.get(8)?,
            resume_url: row.get(9)?,
            resume_file,
            default_follow_up_days: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    pub(crate) fn row_to_snippet(row: &Row) -> rusqlite::Result<VaultSnippet> {
        Ok(VaultSnippet {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

/// Audit timestamp for `created_at` / `updated_at` columns.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
