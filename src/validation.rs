//! Boundary parsing for form-encoded input.
//!
//! Required-field and range checks become field-tagged validation errors.
//! Malformed application URLs are a different matter: they are dropped to
//! `None` by [`sanitize_url`] instead of failing the mutation.

use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::error::{FieldErrors, Result};
use crate::models::UserProfile;
use crate::vault::{ProfilePatch, SnippetInput};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const MAX_NAME_CHARS: usize = 100;
const MAX_PHONE_CHARS: usize = 30;
const MAX_LOCATION_CHARS: usize = 100;
pub const MAX_SNIPPET_TITLE_CHARS: usize = 100;
pub const MAX_SNIPPET_CONTENT_CHARS: usize = 5000;
pub const MIN_FOLLOW_UP_DAYS: u32 = 1;
pub const MAX_FOLLOW_UP_DAYS: u32 = 30;

/// Decoded `key=value` form input. Later duplicates win.
#[derive(Debug, Clone, Default)]
pub struct FormData(HashMap<String, String>);

impl FormData {
    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn from_urlencoded(body: &str) -> Self {
        url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Trimmed value, with blank treated as absent.
pub fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Free text kept verbatim, unless it is only whitespace.
pub fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// Keep `raw` only if it is an absolute http(s) URL.
pub fn sanitize_url(raw: Option<&str>) -> Option<String> {
    let candidate = non_blank(raw)?;
    match Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(candidate),
        _ => {
            debug!(url = %candidate, "dropping non-http(s) url");
            None
        }
    }
}

/// Strict `YYYY-MM-DD` parse; zero padding is required so stored dates sort
/// lexicographically.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .filter(|date| date.format(DATE_FORMAT).to_string() == raw)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Validate an optional date field, recording an error if present but malformed.
pub(crate) fn optional_date(
    raw: Option<&str>,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = non_blank(raw)?;
    match parse_date(&value) {
        Some(date) => Some(format_date(date)),
        None => {
            errors.add(field, "Must be a date (YYYY-MM-DD)");
            None
        }
    }
}

/// Validate a required field, recording an error if blank. The text is kept
/// as entered.
pub(crate) fn required_text(
    raw: Option<&str>,
    field: &str,
    label: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = optional_text(raw);
    if value.is_none() {
        errors.add(field, format!("{} is required", label));
    }
    value
}

fn capped_text(
    raw: Option<&str>,
    field: &str,
    max: usize,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = non_blank(raw)?;
    if value.chars().count() > max {
        errors.add(field, format!("Max {} chars", max));
    }
    Some(value)
}

fn strict_url(raw: Option<&str>, field: &str, errors: &mut FieldErrors) -> Option<String> {
    let value = non_blank(raw)?;
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(value),
        Ok(_) => {
            errors.add(field, "URL must start with http:// or https://");
            None
        }
        Err(_) => {
            errors.add(field, "Must be a valid URL");
            None
        }
    }
}

/// Validate the vault profile form. Only fields present in the form end up in
/// the patch; a present but blank field clears the stored value.
pub fn parse_profile_form(form: &FormData) -> Result<ProfilePatch> {
    let mut errors = FieldErrors::new();
    let mut patch = ProfilePatch::default();

    let text = |key: &str, max: usize, errors: &mut FieldErrors| {
        form.get(key)
            .map(|raw| capped_text(Some(raw), key, max, errors))
    };
    patch.full_name = text("fullName", MAX_NAME_CHARS, &mut errors);
    patch.phone = text("phone", MAX_PHONE_CHARS, &mut errors);
    patch.location = text("location", MAX_LOCATION_CHARS, &mut errors);

    if let Some(raw) = form.get("email") {
        let email = non_blank(Some(raw));
        if let Some(value) = &email {
            if !EMAIL_RE.is_match(value) {
                errors.add("email", "Invalid email");
            }
        }
        patch.email = Some(email);
    }

    let link = |key: &str, errors: &mut FieldErrors| {
        form.get(key).map(|raw| strict_url(Some(raw), key, errors))
    };
    patch.portfolio_url = link("portfolioUrl", &mut errors);
    patch.github_url = link("githubUrl", &mut errors);
    patch.linkedin_url = link("linkedinUrl", &mut errors);
    patch.twitter_url = link("twitterUrl", &mut errors);
    patch.resume_url = link("resumeUrl", &mut errors);

    if let Some(raw) = form.get("defaultFollowUpDays") {
        patch.default_follow_up_days = match non_blank(Some(raw)) {
            None => Some(UserProfile::DEFAULT_FOLLOW_UP_DAYS),
            Some(value) => match value.parse::<i64>() {
                Ok(days) if days < MIN_FOLLOW_UP_DAYS as i64 => {
                    errors.add("defaultFollowUpDays", "Must be at least 1");
                    None
                }
                Ok(days) if days > MAX_FOLLOW_UP_DAYS as i64 => {
                    errors.add("defaultFollowUpDays", "Must be at most 30");
                    None
                }
                Ok(days) => Some(days as u32),
                Err(_) => {
                    errors.add("defaultFollowUpDays", "Must be a whole number");
                    None
                }
            },
        };
    }

    errors.into_result()?;
    Ok(patch)
}

/// Validate snippet title and content after trimming.
pub fn parse_snippet_input(title: &str, content: &str) -> Result<SnippetInput> {
    let mut errors = FieldErrors::new();
    let title = title.trim();
    let content = content.trim();

    if title.is_empty() {
        errors.add("title", "Title is required");
    } else if title.chars().count() > MAX_SNIPPET_TITLE_CHARS {
        errors.add("title", format!("Max {} chars", MAX_SNIPPET_TITLE_CHARS));
    }
    if content.is_empty() {
        errors.add("content", "Content is required");
    } else if content.chars().count() > MAX_SNIPPET_CONTENT_CHARS {
        errors.add("content", format!("Max {} chars", MAX_SNIPPET_CONTENT_CHARS));
    }

    errors.into_result()?;
    Ok(SnippetInput {
        title: title.to_string(),
        content: content.to_string(),
    })
}
