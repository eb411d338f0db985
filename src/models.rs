use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Authenticated identity that owns applications, a profile and snippets.
///
/// Built only at the boundary; every store call takes one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    /// Resolve an owner from whatever identity the boundary has. A missing or
    /// blank identity is refused rather than mapped to an anonymous owner.
    pub fn resolve(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(Self(id.to_string())),
            _ => Err(Error::Unauthenticated),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Funding stage of the company applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    PreSeed,
    Seed,
    SeriesA,
    SeriesB,
    #[default]
    Unknown,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::PreSeed,
        Stage::Seed,
        Stage::SeriesA,
        Stage::SeriesB,
        Stage::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreSeed => "pre-seed",
            Stage::Seed => "seed",
            Stage::SeriesA => "series-a",
            Stage::SeriesB => "series-b",
            Stage::Unknown => "unknown",
        }
    }

    /// Parse form input, falling back to `unknown` on anything unrecognised.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

/// Where an application sits in the pipeline. Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Applied,
    DmSent,
    Replied,
    Interview,
    Rejected,
    Offer,
    Ghosted,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Applied,
        Status::DmSent,
        Status::Replied,
        Status::Interview,
        Status::Rejected,
        Status::Offer,
        Status::Ghosted,
    ];

    /// Statuses that close out follow-up reminders.
    pub const CLOSED: [Status; 3] = [Status::Rejected, Status::Offer, Status::Ghosted];

    /// Statuses counted as a reply on the dashboard.
    pub const REPLIES: [Status; 3] = [Status::Replied, Status::Interview, Status::Offer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Applied => "applied",
            Status::DmSent => "dm_sent",
            Status::Replied => "replied",
            Status::Interview => "interview",
            Status::Rejected => "rejected",
            Status::Offer => "offer",
            Status::Ghosted => "ghosted",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Applied => "Applied",
            Status::DmSent => "DM Sent",
            Status::Replied => "Replied",
            Status::Interview => "Interview",
            Status::Rejected => "Rejected",
            Status::Offer => "Offer",
            Status::Ghosted => "Ghosted",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

/// Channel the opportunity was found through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Wellfound,
    Linkedin,
    Referral,
    Twitter,
    ColdEmail,
    #[default]
    Other,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::Wellfound,
        Source::Linkedin,
        Source::Referral,
        Source::Twitter,
        Source::ColdEmail,
        Source::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Wellfound => "wellfound",
            Source::Linkedin => "linkedin",
            Source::Referral => "referral",
            Source::Twitter => "twitter",
            Source::ColdEmail => "cold_email",
            Source::Other => "other",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == s.trim())
            .ok_or_else(|| format!("unknown source '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub owner_id: String,
    pub company_name: String,
    pub role: String,
    pub stage: Stage,
    pub status: Status,
    pub source: Option<Source>,
    pub applied_date: String, // YYYY-MM-DD
    pub job_url: Option<String>,
    pub contact_person: Option<String>,
    pub contact_url: Option<String>,
    pub last_contacted_at: Option<String>,
    pub follow_up_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Pointer into blob storage for the owner's resume file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFile {
    pub key: String,
    pub name: String,
    pub mime_type: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub owner_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub portfolio_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub resume_url: Option<String>,
    pub resume_file: Option<ResumeFile>,
    pub default_follow_up_days: u32,
    pub updated_at: String,
}

impl UserProfile {
    pub const DEFAULT_FOLLOW_UP_DAYS: u32 = 7;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSnippet {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: u32,
    pub replies: u32,
    pub interviews: u32,
    pub offers: u32,
    pub reply_rate: u32,
    pub offer_rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_requires_non_blank_identity() {
        assert!(matches!(OwnerId::resolve(None), Err(Error::Unauthenticated)));
        assert!(matches!(OwnerId::resolve(Some("  ")), Err(Error::Unauthenticated)));
        assert_eq!(OwnerId::resolve(Some("user-1")).unwrap().as_str(), "user-1");
    }

    #[test]
    fn lossy_parsing_falls_back_to_defaults() {
        assert_eq!(Stage::from_str_lossy("series-a"), Stage::SeriesA);
        assert_eq!(Stage::from_str_lossy("series-z"), Stage::Unknown);
        assert_eq!(Status::from_str_lossy("dm_sent"), Status::DmSent);
        assert_eq!(Status::from_str_lossy(""), Status::Applied);
        assert_eq!(Source::from_str_lossy("cold_email"), Source::ColdEmail);
        assert_eq!(Source::from_str_lossy("myspace"), Source::Other);
    }

    #[test]
    fn strict_parsing_rejects_unknown_values() {
        assert!("hired".parse::<Status>().is_err());
        assert_eq!("offer".parse::<Status>().unwrap(), Status::Offer);
    }

    #[test]
    fn serde_names_match_storage_names() {
        for status in Status::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        for stage in Stage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
        for source in Source::ALL {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
        }
    }
}
