mod ai;
mod config;
mod contacts;
mod db;
mod extract;
mod mail;
mod models;
mod pipeline;
mod prompts;
mod resume;
mod tui;

use ai::{GeminiProvider, ResearchProvider, DEFAULT_MODEL};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use config::{LogTarget, Settings};
use db::Database;
use models::{Contact, OutreachResult, ProfileField, RunOutcome, Status};
use pipeline::{Pipeline, StopFlag};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coffeechat")]
#[command(about = "Research companies and draft coffee-chat outreach emails from a contact list")]
struct Cli {
    /// Database path (defaults to the platform data directory)
    #[arg(long, global = true, env = "COFFEECHAT_DB")]
    db: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// View or edit your sender profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Preview the contacts parsed from a CSV or plain list
    Contacts {
        /// Path to the contacts file
        file: PathBuf,
    },

    /// Research and draft an email for every contact in a file
    Run {
        /// Path to the contacts file (CSV with email first, or one address per line)
        file: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Watch progress in the interactive view
        #[arg(long)]
        tui: bool,
    },

    /// Continue with the contacts a halted run left behind
    Resume {
        #[command(flatten)]
        model: ModelArgs,

        /// Watch progress in the interactive view
        #[arg(long)]
        tui: bool,
    },

    /// List results of the latest run
    Results {
        /// Filter by status (processing, completed, error)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show research, draft and sources for a contact
    Show {
        /// Contact email address
        email: String,
    },

    /// Copy a drafted email to the clipboard
    Copy {
        /// Contact email address
        email: String,
    },

    /// Open a drafted email in the default mail client
    Mail {
        /// Contact email address
        email: String,

        /// Subject line
        #[arg(short, long, default_value = mail::DEFAULT_SUBJECT)]
        subject: String,
    },

    /// Browse results of the latest run interactively
    Browse,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Model (flash, pro, 2.5-flash, 2.5-pro, or a gemini-* id)
    #[arg(short, long, env = "COFFEECHAT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Request timeout in seconds (0 waits indefinitely)
    #[arg(long, env = "COFFEECHAT_TIMEOUT_SECS", default_value = "0")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the stored profile
    Show,

    /// Set one profile field
    Set {
        /// Field to set
        #[arg(value_enum)]
        field: ProfileField,

        /// New value (use an empty string to clear)
        value: String,
    },

    /// Load resume text from a PDF, TXT or MD file
    Resume {
        /// Path to the resume file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    // Before parsing, so `.env` can supply the clap env defaults and RUST_LOG
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();

    let interactive = matches!(
        cli.command,
        Commands::Browse | Commands::Run { tui: true, .. } | Commands::Resume { tui: true, .. }
    );
    let log_target = if interactive {
        LogTarget::File(Database::data_dir().join("coffeechat.log"))
    } else {
        LogTarget::Stderr
    };
    config::init_logging(cli.verbose, log_target)?;
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let mut db = Database::open(cli.db.as_deref())?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Profile { command } => {
            db.ensure_initialized()?;
            match command {
                ProfileCommands::Show => {
                    let profile = db.load_profile_or_default()?;
                    for field in ProfileField::ALL {
                        let value = profile.get(field);
                        if field == ProfileField::Resume {
                            let source = if profile.resume_file_name.is_empty() {
                                String::new()
                            } else {
                                format!(" from {}", profile.resume_file_name)
                            };
                            println!("{:<20} {} chars{}", field.label(), value.chars().count(), source);
                        } else {
                            println!("{:<20} {}", field.label(), if value.is_empty() { "-" } else { value });
                        }
                    }
                    if !profile.is_ready() {
                        println!("\nName and resume are required before running.");
                    }
                }

                ProfileCommands::Set { field, value } => {
                    let mut profile = db.load_profile_or_default()?;
                    profile.set(field, value);
                    db.save_profile(&profile)?;
                    println!("Updated {}.", field.label().to_lowercase());
                }

                ProfileCommands::Resume { file } => {
                    // Parse before touching the stored profile
                    let resume = match resume::extract_resume_text(&file) {
                        Ok(resume) => resume,
                        Err(e) => {
                            eprintln!("{}", e);
                            return Err(anyhow!("Resume not loaded; profile left unchanged"));
                        }
                    };
                    let mut profile = db.load_profile_or_default()?;
                    profile.resume_text = resume.text;
                    profile.resume_file_name = resume.file_name;
                    db.save_profile(&profile)?;
                    println!(
                        "Loaded resume '{}' ({} chars).",
                        profile.resume_file_name,
                        profile.resume_text.chars().count()
                    );
                }
            }
        }

        Commands::Contacts { file } => {
            let contacts = contacts::read_contacts_file(&file)?;
            if contacts.is_empty() {
                println!("No contacts found. Lines need an '@' to count.");
            } else {
                println!("Queue ({}):", contacts.len());
                for (i, contact) in contacts.iter().enumerate() {
                    let identity = contacts::derive_identity(&contact.email);
                    println!("{:>4}. {:<40} {}", i + 1, truncate(&contact.email, 38), identity.domain);
                }
            }
        }

        Commands::Run { file, model, tui } => {
            db.ensure_initialized()?;
            let contacts = contacts::read_contacts_file(&file)?;
            let settings = Settings::new(&model.model, model.timeout_secs)?;
            run_batch(&mut db, contacts, &settings, tui)?;
        }

        Commands::Resume { model, tui } => {
            db.ensure_initialized()?;
            let contacts = db.pending_contacts()?;
            if contacts.is_empty() {
                println!("No preserved contacts to resume.");
                return Ok(());
            }
            println!("Resuming {} preserved contact(s).", contacts.len());
            let settings = Settings::new(&model.model, model.timeout_secs)?;
            run_batch(&mut db, contacts, &settings, tui)?;
        }

        Commands::Results { status } => {
            db.ensure_initialized()?;
            let status = status.as_deref().map(str::parse::<Status>).transpose()?;
            let Some(run) = db.latest_run()? else {
                println!("No runs yet.");
                return Ok(());
            };
            let results = db.list_results(run.id, status)?;
            println!(
                "Run #{} ({}, {}) started {}",
                run.id,
                run.model,
                run.outcome.as_str(),
                run.started_at
            );
            if let Some(finished_at) = &run.finished_at {
                println!("Finished {}", finished_at);
            }
            if results.is_empty() {
                println!("No results found.");
            } else {
                println!("{:<5} {:<12} {:<32} {:<28}", "#", "STATUS", "EMAIL", "COMPANY");
                println!("{}", "-".repeat(78));
                for (i, result) in results.iter().enumerate() {
                    println!(
                        "{:<5} {:<12} {:<32} {:<28}",
                        i + 1,
                        result.status,
                        truncate(&result.email, 30),
                        truncate(&result.company_name, 26)
                    );
                }
            }
            let pending = db.pending_contacts()?.len();
            if pending > 0 {
                println!("\n{} contact(s) preserved. Run 'coffeechat resume' to continue.", pending);
            }
        }

        Commands::Show { email } => {
            db.ensure_initialized()?;
            let result = find_latest_result(&db, &email)?;
            println!("{} ({})", result.email, result.company_name);
            println!("Status: {}", result.status);
            if let Some(error) = &result.error {
                println!("Error: {}", error);
            }
            if result.status == Status::Completed {
                println!("\n--- Drafted Email ---\n{}", result.drafted_email);
                println!("\n--- Strategic Context ---\n{}", result.research);
                if !result.sources.is_empty() {
                    println!("\n--- Sources ---");
                    for source in &result.sources {
                        println!("  {} <{}>", source.title, source.uri);
                    }
                }
            }
        }

        Commands::Copy { email } => {
            db.ensure_initialized()?;
            let result = find_latest_result(&db, &email)?;
            let draft = require_draft(&result)?;
            mail::copy_to_clipboard(draft)?;
            println!("Draft copied to clipboard!");
        }

        Commands::Mail { email, subject } => {
            db.ensure_initialized()?;
            let result = find_latest_result(&db, &email)?;
            let draft = require_draft(&result)?;
            println!("{}", mail::ATTACH_REMINDER);
            mail::compose(&result.email, &subject, draft)?;
        }

        Commands::Browse => {
            db.ensure_initialized()?;
            tui::run_browse(&mut db)?;
        }
    }

    Ok(())
}

fn run_batch(db: &mut Database, contacts: Vec<Contact>, settings: &Settings, tui: bool) -> Result<()> {
    let profile = db.load_profile_or_default()?;
    pipeline::check_preconditions(&profile, &contacts)?;

    let provider = GeminiProvider::new(settings.model.model_id.clone(), settings.timeout)?;

    if tui {
        return tui::run_live(db, Box::new(provider), profile, contacts);
    }

    let stop = StopFlag::new();
    let pipeline = Pipeline::new(&provider, stop.clone());
    install_stop_handler(stop);

    let run_id = db.start_run(provider.model_name())?;
    println!(
        "Drafting for {} contact(s) with {} (Ctrl-C to stop after the current one)",
        contacts.len(),
        settings.model.short_name
    );

    let report = {
        let total = contacts.len();
        let db_ref: &Database = db;
        let mut observer = |position: usize, result: &OutreachResult| {
            if let Err(e) = db_ref.save_result(run_id, position, result) {
                tracing::warn!(email = %result.email, error = %e, "failed to save result");
            }
            print_progress(position, total, result);
        };
        pipeline.run(&profile, &contacts, &mut observer)?
    };

    let unprocessed = report.resumable();
    db.record_outcome(run_id, report.outcome, &unprocessed)?;

    let completed = report.results.iter().filter(|r| r.status == Status::Completed).count();
    let failed = report.results.iter().filter(|r| r.status == Status::Error).count();
    println!("\nResults:");
    println!("  Completed: {}", completed);
    if failed > 0 {
        println!("  Errors:    {}", failed);
    }

    match report.outcome {
        RunOutcome::QuotaExhausted => {
            println!("\n!! API quota reached. Processing halted.");
            println!(
                "   {} contact(s) were preserved, not lost. Run 'coffeechat resume' once the quota resets.",
                unprocessed.len()
            );
        }
        RunOutcome::Cancelled => {
            println!(
                "\nStopped. {} contact(s) preserved; run 'coffeechat resume' to continue.",
                unprocessed.len()
            );
        }
        RunOutcome::Completed | RunOutcome::Running => {}
    }

    Ok(())
}

fn print_progress(position: usize, total: usize, result: &OutreachResult) {
    let prefix = format!("[{}/{}]", position + 1, total);
    match result.status {
        Status::Processing | Status::Pending => {
            println!("{} {} ... researching {}", prefix, result.email, result.company_name);
        }
        Status::Completed => {
            println!("{} {} -> {}", prefix, result.email, result.company_name);
        }
        Status::Error => {
            println!(
                "{} {} failed: {}",
                prefix,
                result.email,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// First Ctrl-C asks the pipeline to stop at the next contact; a second one exits.
fn install_stop_handler(stop: StopFlag) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(error = %e, "could not start signal listener");
                return;
            }
        };
        runtime.block_on(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if stop.is_requested() {
                    eprintln!("\nAborting.");
                    std::process::exit(130);
                }
                stop.request();
                eprintln!("\nStop requested. Finishing the current contact (Ctrl-C again to abort).");
            }
        });
    });
}

fn find_latest_result(db: &Database, email: &str) -> Result<OutreachResult> {
    let run = db
        .latest_run()?
        .ok_or_else(|| anyhow!("No runs yet. Start one with 'coffeechat run <file>'"))?;
    db.find_result(run.id, email)?
        .ok_or_else(|| anyhow!("No result for '{}' in run #{}", email, run.id))
}

fn require_draft(result: &OutreachResult) -> Result<&str> {
    if result.status != Status::Completed {
        return Err(anyhow!(
            "No draft for {} (status: {})",
            result.email,
            result.status
        ));
    }
    Ok(&result.drafted_email)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
