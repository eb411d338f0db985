use chrono::NaiveDate;

use crate::models::Application;
use crate::validation::format_date;

/// Column set of the CSV export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportLayout {
    #[default]
    Full,
    /// Older 10-column layout without source, URLs, last contact or update time.
    Legacy,
}

const FULL_HEADERS: [&str; 15] = [
    "ID",
    "Company",
    "Role",
    "Stage",
    "Status",
    "Source",
    "Applied Date",
    "Job URL",
    "Follow-up Date",
    "Contact Person",
    "Contact URL",
    "Last Contacted",
    "Notes",
    "Created At",
    "Updated At",
];

const LEGACY_HEADERS: [&str; 10] = [
    "ID",
    "Company",
    "Role",
    "Stage",
    "Status",
    "Applied Date",
    "Follow-up Date",
    "Contact Person",
    "Notes",
    "Created At",
];

impl ExportLayout {
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            ExportLayout::Full => &FULL_HEADERS,
            ExportLayout::Legacy => &LEGACY_HEADERS,
        }
    }

    fn fields(&self, app: &Application) -> Vec<Option<String>> {
        let id = Some(app.id.to_string());
        let company = Some(app.company_name.clone());
        let role = Some(app.role.clone());
        let stage = Some(app.stage.as_str().to_string());
        let status = Some(app.status.as_str().to_string());
        let applied = Some(app.applied_date.clone());
        let created = Some(app.created_at.clone());
        match self {
            ExportLayout::Full => vec![
                id,
                company,
                role,
                stage,
                status,
                app.source.map(|s| s.as_str().to_string()),
                applied,
                app.job_url.clone(),
                app.follow_up_date.clone(),
                app.contact_person.clone(),
                app.contact_url.clone(),
                app.last_contacted_at.clone(),
                app.notes.clone(),
                created,
                Some(app.updated_at.clone()),
            ],
            ExportLayout::Legacy => vec![
                id,
                company,
                role,
                stage,
                status,
                applied,
                app.follow_up_date.clone(),
                app.contact_person.clone(),
                app.notes.clone(),
                created,
            ],
        }
    }
}

/// Quote a field only when it holds a comma, a double quote or a newline.
pub fn escape_field(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render applications as CSV: a header row, then one row per application
/// in the order given.
pub fn export_csv(apps: &[Application], layout: ExportLayout) -> String {
    let mut lines = Vec::with_capacity(apps.len() + 1);
    lines.push(layout.headers().join(","));
    for app in apps {
        let row: Vec<String> = layout
            .fields(app)
            .iter()
            .map(|field| escape_field(field.as_deref()))
            .collect();
        lines.push(row.join(","));
    }
    lines.join("\n")
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("applications-{}.csv", format_date(today))
}
