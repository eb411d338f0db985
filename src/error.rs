//! Error taxonomy for the tracking core.
//!
//! Not-found is deliberately absent: reads and writes against rows that are
//! missing or owned by someone else come back as `Ok(None)` / `Ok(false)`.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication required")]
    Unauthenticated,

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("no resume on file")]
    NoResume,

    #[error("resume file is unreachable: {0}")]
    BlobUnreachable(String),

    #[error("blob storage error: {0}")]
    Blob(String),

    #[error("database not initialized. Run 'jobtrack init' first.")]
    NotInitialized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Field name to messages, as reported back to a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("role", "Role is required");
        errors.add("companyName", "Company is required");
        errors.add("role", "Too long");

        assert_eq!(errors.get("role").unwrap().len(), 2);
        assert_eq!(
            errors.to_string(),
            "companyName: Company is required; role: Role is required, Too long"
        );
        assert!(matches!(errors.into_result(), Err(Error::Validation(_))));
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
