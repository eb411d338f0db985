mod actions;
mod blob;
mod config;
mod db;
mod error;
mod export;
mod models;
mod queries;
mod validation;
mod vault;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use actions::ApplicationForm;
use blob::FsBlobStore;
use config::Settings;
use db::Database;
use export::ExportLayout;
use models::{Application, OwnerId, Source, Status};
use queries::{ListFilters, ListSort};
use validation::{FormData, parse_date, parse_profile_form, parse_snippet_input};
use vault::{DOCX_MIME, PDF_MIME, ResumeDownload, ResumeUpload};

const PROFILE_FIELDS: [&str; 10] = [
    "fullName",
    "email",
    "phone",
    "location",
    "portfolioUrl",
    "githubUrl",
    "linkedinUrl",
    "twitterUrl",
    "resumeUrl",
    "defaultFollowUpDays",
];

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications, follow-ups and your re-application vault")]
struct Cli {
    /// Authenticated user id that owns the data
    #[arg(short, long, env = "JOBTRACK_USER", global = true)]
    user: Option<String>,

    /// Path to the SQLite database
    #[arg(long, env = "JOBTRACK_DB", global = true)]
    db: Option<PathBuf>,

    /// Directory holding uploaded files
    #[arg(long, env = "JOBTRACK_BLOBS", global = true)]
    blobs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Record a new application from FIELD=VALUE pairs
    Add {
        /// Fields such as companyName=Acme role=Engineer appliedDate=2024-01-10
        fields: Vec<String>,

        /// URL-encoded form body, merged before the pairs
        #[arg(long)]
        form: Option<String>,
    },

    /// List applications
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<Status>,

        /// Filter by source
        #[arg(long)]
        source: Option<Source>,

        /// Case-insensitive company name search
        #[arg(long)]
        search: Option<String>,

        /// Sort key (applied, updated)
        #[arg(long, default_value = "applied")]
        sort: ListSort,

        #[arg(long)]
        json: bool,
    },

    /// Show application details
    Show {
        /// Application ID
        id: i64,
    },

    /// Edit an application with FIELD=VALUE pairs
    Edit {
        id: i64,

        fields: Vec<String>,

        #[arg(long)]
        form: Option<String>,
    },

    /// Delete an application
    Delete { id: i64 },

    /// Change an application's status (unknown values fall back to applied)
    Status { id: i64, status: String },

    /// Set the follow-up date, or clear it when no date is given
    FollowUp {
        id: i64,

        /// YYYY-MM-DD
        date: Option<String>,
    },

    /// Record that you followed up today and reschedule the reminder
    Contacted { id: i64 },

    /// Show follow-ups that are due
    Due,

    /// Show dashboard numbers
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Export applications as CSV
    Export {
        /// Output file (defaults to applications-<today>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the 10-column legacy layout
        #[arg(long)]
        legacy: bool,
    },

    /// Manage your vault profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage reusable text snippets
    Snippet {
        #[command(subcommand)]
        command: SnippetCommands,
    },

    /// Manage your resume file
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the profile
    Show,

    /// Update profile fields with FIELD=VALUE pairs
    Set {
        fields: Vec<String>,

        #[arg(long)]
        form: Option<String>,
    },
}

#[derive(Subcommand)]
enum SnippetCommands {
    /// Add a snippet
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        content: String,
    },

    /// List snippets
    List,

    /// Show a snippet
    Show { id: String },

    /// Edit a snippet
    Edit {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        content: Option<String>,
    },

    /// Delete a snippet
    Delete { id: String },
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Upload a PDF or DOCX resume, replacing any previous one
    Upload {
        file: PathBuf,

        /// MIME type (inferred from the extension by default)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Download your resume
    Get {
        /// Output file (defaults to the stored file name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print response headers to stderr
        #[arg(long)]
        headers: bool,
    },

    /// Remove your resume
    Delete,
}

fn parse_form(fields: &[String], encoded: Option<&str>, allowed: &[&str]) -> Result<FormData> {
    let mut form = encoded.map(FormData::from_urlencoded).unwrap_or_default();
    for pair in fields {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected FIELD=VALUE, got '{}'", pair))?;
        form.insert(key.trim(), value);
    }
    if let Some(unknown) = form.keys().find(|k| !allowed.contains(k)) {
        bail!("Unknown field '{}'. Expected one of: {}", unknown, allowed.join(", "));
    }
    Ok(form)
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn mime_for(path: &std::path::Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("pdf") => PDF_MIME.to_string(),
        Some("docx") => DOCX_MIME.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

fn print_table(apps: &[Application]) {
    println!(
        "{:<6} {:<10} {:<24} {:<22} {:<11} {:<11}",
        "ID", "STATUS", "COMPANY", "ROLE", "APPLIED", "FOLLOW-UP"
    );
    println!("{}", "-".repeat(89));
    for app in apps {
        println!(
            "{:<6} {:<10} {:<24} {:<22} {:<11} {:<11}",
            app.id,
            app.status.label(),
            truncate(&app.company_name, 22),
            truncate(&app.role, 20),
            app.applied_date,
            app.follow_up_date.as_deref().unwrap_or("-")
        );
    }
}

fn print_application(app: &Application) {
    println!("Application #{}", app.id);
    println!("Company: {}", app.company_name);
    println!("Role: {}", app.role);
    println!("Stage: {}", app.stage.as_str());
    println!("Status: {}", app.status.label());
    if let Some(source) = app.source {
        println!("Source: {}", source.as_str());
    }
    println!("Applied: {}", app.applied_date);
    if let Some(url) = &app.job_url {
        println!("Job URL: {}", url);
    }
    if let Some(person) = &app.contact_person {
        println!("Contact: {}", person);
    }
    if let Some(url) = &app.contact_url {
        println!("Contact URL: {}", url);
    }
    if let Some(date) = &app.last_contacted_at {
        println!("Last contacted: {}", date);
    }
    if let Some(date) = &app.follow_up_date {
        println!("Follow-up: {}", date);
    }
    println!("Created: {}", app.created_at);
    println!("Updated: {}", app.updated_at);
    if let Some(notes) = &app.notes {
        println!("\n--- Notes ---\n{}", textwrap::fill(notes, 80));
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::resolve(cli.db, cli.blobs);
    let db = Database::open_at(&settings.db_path)
        .with_context(|| format!("Failed to open {}", settings.db_path.display()))?;
    let owner = OwnerId::resolve(cli.user.as_deref());

    let result = match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
            Ok(())
        }
        Commands::Resume { command } => {
            db.ensure_initialized()?;
            run_resume(&db, &settings, owner, command)
        }
        command => {
            db.ensure_initialized()?;
            run(&db, &owner?, command)
        }
    };
    result.map_err(report_validation)
}

/// List field errors one per line instead of as a single sentence.
fn report_validation(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<error::Error>() {
        Ok(error::Error::Validation(fields)) => {
            let lines: Vec<String> = fields
                .fields()
                .map(|(field, messages)| format!("  {}: {}", field, messages.join(", ")))
                .collect();
            anyhow!("Invalid input:\n{}", lines.join("\n"))
        }
        Ok(other) => other.into(),
        Err(err) => err,
    }
}

fn run(db: &Database, owner: &OwnerId, command: Commands) -> Result<()> {
    match command {
        // Dispatched in main.
        Commands::Init | Commands::Resume { .. } => {}

        Commands::Add { fields, form } => {
            let form = parse_form(&fields, form.as_deref(), &ApplicationForm::FIELDS)?;
            let app = actions::create_application(db, owner, &ApplicationForm::from_form(&form))?;
            println!("Added application #{} ({} - {})", app.id, app.company_name, app.role);
            if let Some(date) = &app.follow_up_date {
                println!("Follow-up scheduled for {}", date);
            }
        }

        Commands::List {
            status,
            source,
            search,
            sort,
            json,
        } => {
            let filters = ListFilters {
                status,
                source,
                search,
                sort,
            };
            let apps = db.list_applications(owner, &filters)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&apps)?);
            } else if apps.is_empty() {
                println!("No applications found.");
            } else {
                print_table(&apps);
            }
        }

        Commands::Show { id } => match db.get_application(owner, id)? {
            Some(app) => print_application(&app),
            None => println!("Application #{} not found.", id),
        },

        Commands::Edit { id, fields, form } => {
            let form = parse_form(&fields, form.as_deref(), &ApplicationForm::FIELDS)?;
            match actions::update_application(db, owner, id, &ApplicationForm::from_form(&form))? {
                Some(app) => println!("Updated application #{}", app.id),
                None => println!("Application #{} not found.", id),
            }
        }

        Commands::Delete { id } => {
            if actions::delete_application(db, owner, id)? {
                println!("Deleted application #{}", id);
            } else {
                println!("Application #{} not found.", id);
            }
        }

        Commands::Status { id, status } => match actions::set_status(
            db,
            owner,
            id,
            Status::from_str_lossy(&status),
        )? {
            Some(app) => println!("#{} is now {}", app.id, app.status.label()),
            None => println!("Application #{} not found.", id),
        },

        Commands::FollowUp { id, date } => {
            let date = match date.as_deref() {
                Some(raw) => Some(
                    parse_date(raw).ok_or_else(|| anyhow!("Expected YYYY-MM-DD, got '{}'", raw))?,
                ),
                None => None,
            };
            match actions::set_follow_up(db, owner, id, date)? {
                Some(app) => match &app.follow_up_date {
                    Some(date) => println!("Follow-up for #{} set to {}", app.id, date),
                    None => println!("Follow-up for #{} cleared", app.id),
                },
                None => println!("Application #{} not found.", id),
            }
        }

        Commands::Contacted { id } => match actions::mark_contacted(db, owner, id, today())? {
            Some(app) => println!(
                "Marked #{} contacted; next follow-up {}",
                app.id,
                app.follow_up_date.as_deref().unwrap_or("-")
            ),
            None => println!("Application #{} not found.", id),
        },

        Commands::Due => {
            let due = db.overdue_follow_ups(owner, today())?;
            if due.is_empty() {
                println!("No follow-ups due.");
            } else {
                println!("Follow-ups due ({}):", due.len());
                print_table(&due);
            }
        }

        Commands::Stats { json } => {
            let stats = db.dashboard_stats(owner)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total:       {}", stats.total);
                println!("Replies:     {} ({}%)", stats.replies, stats.reply_rate);
                println!("Interviews:  {}", stats.interviews);
                println!("Offers:      {} ({}%)", stats.offers, stats.offer_rate);
            }
        }

        Commands::Export { output, legacy } => {
            let layout = if legacy {
                ExportLayout::Legacy
            } else {
                ExportLayout::Full
            };
            let apps = db.export_projection(owner)?;
            let csv = export::export_csv(&apps, layout);
            let path = output.unwrap_or_else(|| PathBuf::from(export::export_file_name(today())));
            std::fs::write(&path, csv)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            println!("Exported {} application(s) to {}", apps.len(), path.display());
        }

        Commands::Profile { command } => match command {
            ProfileCommands::Show => match db.get_profile(owner)? {
                Some(profile) => {
                    let show = |label: &str, value: &Option<String>| {
                        if let Some(v) = value {
                            println!("{:<18} {}", label, v);
                        }
                    };
                    show("Name:", &profile.full_name);
                    show("Email:", &profile.email);
                    show("Phone:", &profile.phone);
                    show("Location:", &profile.location);
                    show("Portfolio:", &profile.portfolio_url);
                    show("GitHub:", &profile.github_url);
                    show("LinkedIn:", &profile.linkedin_url);
                    show("Twitter:", &profile.twitter_url);
                    show("Resume link:", &profile.resume_url);
                    if let Some(file) = &profile.resume_file {
                        println!("{:<18} {} ({}, {})", "Resume file:", file.name, file.mime_type, file.uploaded_at);
                    }
                    println!("{:<18} {} days", "Follow-up delay:", profile.default_follow_up_days);
                }
                None => println!("No profile saved yet."),
            },

            ProfileCommands::Set { fields, form } => {
                let form = parse_form(&fields, form.as_deref(), &PROFILE_FIELDS)?;
                let patch = parse_profile_form(&form)?;
                db.upsert_profile(owner, &patch)?;
                println!("Profile saved.");
            }
        },

        Commands::Snippet { command } => match command {
            SnippetCommands::Add { title, content } => {
                let input = parse_snippet_input(&title, &content)?;
                let snippet = db.create_snippet(owner, &input)?;
                println!("Added snippet '{}' ({})", snippet.title, snippet.id);
            }

            SnippetCommands::List => {
                let snippets = db.list_snippets(owner)?;
                if snippets.is_empty() {
                    println!("No snippets found.");
                } else {
                    println!("{:<36}  {:<30} {:<20}", "ID", "TITLE", "UPDATED");
                    println!("{}", "-".repeat(88));
                    for snippet in snippets {
                        println!(
                            "{:<36}  {:<30} {:<20}",
                            snippet.id,
                            truncate(&snippet.title, 28),
                            truncate(&snippet.updated_at, 19)
                        );
                    }
                }
            }

            SnippetCommands::Show { id } => match db.get_snippet(owner, &id)? {
                Some(snippet) => {
                    println!("{}\n", snippet.title);
                    println!("{}", textwrap::fill(&snippet.content, 80));
                }
                None => println!("Snippet '{}' not found.", id),
            },

            SnippetCommands::Edit { id, title, content } => {
                let Some(existing) = db.get_snippet(owner, &id)? else {
                    println!("Snippet '{}' not found.", id);
                    return Ok(());
                };
                let input = parse_snippet_input(
                    title.as_deref().unwrap_or(&existing.title),
                    content.as_deref().unwrap_or(&existing.content),
                )?;
                match db.update_snippet(owner, &id, &input)? {
                    Some(snippet) => println!("Updated snippet '{}'", snippet.title),
                    None => println!("Snippet '{}' not found.", id),
                }
            }

            SnippetCommands::Delete { id } => {
                if db.delete_snippet(owner, &id)? {
                    println!("Deleted snippet {}", id);
                } else {
                    println!("Snippet '{}' not found.", id);
                }
            }
        },
    }

    Ok(())
}

/// Resume commands. Downloads report a missing identity through their own
/// error path, so the owner is resolved per command.
fn run_resume(
    db: &Database,
    settings: &Settings,
    owner: error::Result<OwnerId>,
    command: ResumeCommands,
) -> Result<()> {
    let blobs = FsBlobStore::new(&settings.blob_root)?;
    match command {
        ResumeCommands::Upload { file, mime } => {
            let owner = owner?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read resume file: {}", file.display()))?;
            let upload = ResumeUpload {
                file_name: file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "resume".to_string()),
                mime_type: mime.unwrap_or_else(|| mime_for(&file)),
                bytes,
            };
            vault::upload_resume(db, &blobs, &owner, &upload)?;
            println!("Uploaded resume '{}'", upload.file_name);
        }

        ResumeCommands::Get { output, headers } => {
            let download = vault::fetch_resume(db, &blobs, owner.as_ref().ok())?;
            save_download(&download, output, headers)?;
        }

        ResumeCommands::Delete => {
            let owner = owner?;
            vault::delete_resume(db, &blobs, &owner)?;
            println!("Resume removed.");
        }
    }

    Ok(())
}

fn save_download(download: &ResumeDownload, output: Option<PathBuf>, headers: bool) -> Result<()> {
    if headers {
        eprintln!("Content-Type: {}", download.mime_type);
        eprintln!("Content-Disposition: {}", download.content_disposition());
        eprintln!("Cache-Control: {}", ResumeDownload::CACHE_CONTROL);
    }
    let path = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
    std::fs::write(&path, &download.bytes)
        .with_context(|| format!("Failed to write to {}", path.display()))?;
    println!(
        "Saved {} ({}, {} bytes) to {}",
        download.file_name,
        download.mime_type,
        download.bytes.len(),
        path.display()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Société Générale", 10), "Société...");
    }

    #[test]
    fn form_pairs_override_encoded_body() {
        let fields = vec!["role=Lead".to_string(), "notes=a=b".to_string()];
        let form = parse_form(
            &fields,
            Some("companyName=Acme%2C+Inc.&role=Engineer"),
            &ApplicationForm::FIELDS,
        )
        .unwrap();
        assert_eq!(form.get("companyName"), Some("Acme, Inc."));
        assert_eq!(form.get("role"), Some("Lead"));
        assert_eq!(form.get("notes"), Some("a=b"));
    }

    #[test]
    fn form_rejects_unknown_and_malformed_pairs() {
        assert!(parse_form(&["compnay=Acme".to_string()], None, &ApplicationForm::FIELDS).is_err());
        assert!(parse_form(&["companyName".to_string()], None, &ApplicationForm::FIELDS).is_err());
        assert!(parse_form(&["fullName=Ada".to_string()], None, &PROFILE_FIELDS).is_ok());
    }

    #[test]
    fn mime_is_inferred_from_extension() {
        assert_eq!(mime_for(std::path::Path::new("cv.PDF")), PDF_MIME);
        assert_eq!(mime_for(std::path::Path::new("cv.docx")), DOCX_MIME);
        assert_eq!(mime_for(std::path::Path::new("cv.txt")), "application/octet-stream");
    }

    #[test]
    fn cli_parses_typed_arguments() {
        let cli = Cli::try_parse_from(["jobtrack", "--user", "alice", "list", "--status", "dm_sent"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::List { status: Some(Status::DmSent), .. }
        ));
        assert!(Cli::try_parse_from(["jobtrack", "list", "--status", "hired"]).is_err());
    }

    #[test]
    fn status_command_falls_back_to_applied() {
        let cli = Cli::try_parse_from(["jobtrack", "status", "3", "hired"]).unwrap();
        let Commands::Status { id, status } = cli.command else {
            panic!("expected status command");
        };
        assert_eq!(id, 3);
        assert_eq!(Status::from_str_lossy(&status), Status::Applied);
        assert_eq!(Status::from_str_lossy("dm_sent"), Status::DmSent);
    }
}
