//! The owner's reusable vault: profile settings, text snippets and the resume
//! file pointer.
//!
//! The resume file itself lives in a [`BlobStore`]; the profile only keeps a
//! pointer to it. A pointer is written only after the blob write succeeded,
//! and cleanup of a replaced blob never blocks the pointer swap.

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::db::{Database, PROFILE_COLUMNS, SNIPPET_COLUMNS, now_timestamp};
use crate::error::{Error, FieldErrors, Result};
use crate::models::{OwnerId, ResumeFile, UserProfile, VaultSnippet};
use crate::queries::{FieldChange, text_value};

pub const MAX_RESUME_BYTES: usize = 5 * 1024 * 1024;
pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Partial profile update. Outer `None` leaves a column alone; `Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub full_name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub portfolio_url: Option<Option<String>>,
    pub github_url: Option<Option<String>>,
    pub linkedin_url: Option<Option<String>>,
    pub twitter_url: Option<Option<String>>,
    pub resume_url: Option<Option<String>>,
    pub default_follow_up_days: Option<u32>,
    pub resume_file: Option<Option<ResumeFile>>,
}

impl ProfilePatch {
    fn changes(&self) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        let text_fields = [
            ("full_name", &self.full_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("location", &self.location),
            ("portfolio_url", &self.portfolio_url),
            ("github_url", &self.github_url),
            ("linkedin_url", &self.linkedin_url),
            ("twitter_url", &self.twitter_url),
            ("resume_url", &self.resume_url),
        ];
        for (column, field) in text_fields {
            if let Some(value) = field {
                changes.push((column, text_value(value.clone())));
            }
        }
        if let Some(days) = self.default_follow_up_days {
            changes.push(("default_follow_up_days", Value::Integer(i64::from(days))));
        }
        if let Some(file) = &self.resume_file {
            let file = file.as_ref();
            changes.push(("resume_file_key", text_value(file.map(|f| f.key.clone()))));
            changes.push(("resume_file_name", text_value(file.map(|f| f.name.clone()))));
            changes.push(("resume_mime_type", text_value(file.map(|f| f.mime_type.clone()))));
            changes.push((
                "resume_uploaded_at",
                text_value(file.map(|f| f.uploaded_at.clone())),
            ));
        }
        changes
    }
}

/// Validated snippet title and content.
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetInput {
    pub title: String,
    pub content: String,
}

impl Database {
    // --- Profile ---

    pub fn get_profile(&self, owner: &OwnerId) -> Result<Option<UserProfile>> {
        let result = self.conn().query_row(
            &format!(
                "SELECT {} FROM user_profiles WHERE owner_id = ?1",
                PROFILE_COLUMNS
            ),
            [owner.as_str()],
            Self::row_to_profile,
        );
        match result {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert the owner's profile or update it in place, as one statement
    /// keyed on the owner uniqueness constraint. Input is assumed validated.
    pub fn upsert_profile(&self, owner: &OwnerId, patch: &ProfilePatch) -> Result<UserProfile> {
        let mut columns = vec!["owner_id"];
        let mut values = vec![Value::Text(owner.as_str().to_string())];
        for (column, value) in patch.changes() {
            columns.push(column);
            values.push(value);
        }
        columns.push("updated_at");
        values.push(Value::Text(now_timestamp()));

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = columns[1..]
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let sql = format!(
            "INSERT INTO user_profiles ({}) VALUES ({})
             ON CONFLICT(owner_id) DO UPDATE SET {}",
            columns.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );
        self.conn().execute(&sql, params_from_iter(values.iter()))?;

        self.get_profile(owner)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// The owner's follow-up delay, or the default when no profile exists.
    pub fn follow_up_days(&self, owner: &OwnerId) -> Result<u32> {
        Ok(self
            .get_profile(owner)?
            .map(|p| p.default_follow_up_days)
            .unwrap_or(UserProfile::DEFAULT_FOLLOW_UP_DAYS))
    }

    // --- Snippets ---

    pub fn create_snippet(&self, owner: &OwnerId, input: &SnippetInput) -> Result<VaultSnippet> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        self.conn().execute(
            "INSERT INTO vault_snippets (id, owner_id, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![id, owner.as_str(), input.title, input.content, now],
        )?;
        self.get_snippet(owner, &id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows.into())
    }

    pub fn list_snippets(&self, owner: &OwnerId) -> Result<Vec<VaultSnippet>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM vault_snippets WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
            SNIPPET_COLUMNS
        ))?;
        let rows = stmt.query_map([owner.as_str()], Self::row_to_snippet)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_snippet(&self, owner: &OwnerId, id: &str) -> Result<Option<VaultSnippet>> {
        let result = self.conn().query_row(
            &format!(
                "SELECT {} FROM vault_snippets WHERE id = ?1 AND owner_id = ?2",
                SNIPPET_COLUMNS
            ),
            [id, owner.as_str()],
            Self::row_to_snippet,
        );
        match result {
            Ok(snippet) => Ok(Some(snippet)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_snippet(
        &self,
        owner: &OwnerId,
        id: &str,
        input: &SnippetInput,
    ) -> Result<Option<VaultSnippet>> {
        let affected = self.conn().execute(
            "UPDATE vault_snippets SET title = ?1, content = ?2, updated_at = ?3
             WHERE id = ?4 AND owner_id = ?5",
            rusqlite::params![input.title, input.content, now_timestamp(), id, owner.as_str()],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_snippet(owner, id)
    }

    pub fn delete_snippet(&self, owner: &OwnerId, id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM vault_snippets WHERE id = ?1 AND owner_id = ?2",
            [id, owner.as_str()],
        )?;
        Ok(affected > 0)
    }
}

// --- Resume file ---

#[derive(Debug, Clone)]
pub struct ResumeUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ResumeUpload {
    fn validate(&self) -> Result<&'static str> {
        let mut errors = FieldErrors::new();
        let extension = match self.mime_type.as_str() {
            PDF_MIME => "pdf",
            DOCX_MIME => "docx",
            _ => {
                errors.add("resume", "Only PDF and DOCX files are allowed.");
                ""
            }
        };
        if self.bytes.is_empty() {
            errors.add("resume", "No file selected.");
        } else if self.bytes.len() > MAX_RESUME_BYTES {
            errors.add("resume", "File exceeds 5 MB limit.");
        }
        errors.into_result()?;
        Ok(extension)
    }
}

/// Resume bytes ready to hand back to the owner. The blob URL is not included.
#[derive(Debug, Clone)]
pub struct ResumeDownload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ResumeDownload {
    pub const CACHE_CONTROL: &'static str = "private, no-store";

    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.file_name.replace('"', ""))
    }
}

/// Owner ids are opaque; keep them from steering blob paths.
fn blob_segment(owner: &OwnerId) -> String {
    owner
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn discard_blob(blobs: &dyn BlobStore, url: &str) {
    if let Err(e) = blobs.delete(url) {
        warn!(error = %e, "could not delete previous resume blob; leaving it behind");
    }
}

/// Store a new resume file and point the profile at it, then clean up the
/// previous file if there was one.
pub fn upload_resume(
    db: &Database,
    blobs: &dyn BlobStore,
    owner: &OwnerId,
    upload: &ResumeUpload,
) -> Result<UserProfile> {
    let extension = upload.validate()?;
    let previous = db.get_profile(owner)?.and_then(|p| p.resume_file);

    let key = format!("resumes/{}/{}.{}", blob_segment(owner), Uuid::new_v4(), extension);
    let url = blobs.put(&key, &upload.bytes, &upload.mime_type)?;

    let patch = ProfilePatch {
        resume_file: Some(Some(ResumeFile {
            key: url.clone(),
            name: upload.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            uploaded_at: now_timestamp(),
        })),
        ..Default::default()
    };
    let profile = db.upsert_profile(owner, &patch)?;
    info!(owner = %owner, file = %upload.file_name, "resume uploaded");

    if let Some(old) = previous.filter(|old| old.key != url) {
        discard_blob(blobs, &old.key);
    }
    Ok(profile)
}

pub fn delete_resume(db: &Database, blobs: &dyn BlobStore, owner: &OwnerId) -> Result<UserProfile> {
    if let Some(file) = db.get_profile(owner)?.and_then(|p| p.resume_file) {
        discard_blob(blobs, &file.key);
    }
    let patch = ProfilePatch {
        resume_file: Some(None),
        ..Default::default()
    };
    let profile = db.upsert_profile(owner, &patch)?;
    info!(owner = %owner, "resume removed");
    Ok(profile)
}

/// Resolve the caller's resume and read its bytes from blob storage.
pub fn fetch_resume(
    db: &Database,
    blobs: &dyn BlobStore,
    owner: Option<&OwnerId>,
) -> Result<ResumeDownload> {
    let owner = owner.ok_or(Error::Unauthenticated)?;
    let file = db
        .get_profile(owner)?
        .and_then(|p| p.resume_file)
        .ok_or(Error::NoResume)?;
    let bytes = blobs
        .get(&file.key)
        .map_err(|e| Error::BlobUnreachable(e.to_string()))?;
    Ok(ResumeDownload {
        file_name: file.name,
        mime_type: file.mime_type,
        bytes,
    })
}
