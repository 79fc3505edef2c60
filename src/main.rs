//! listening-study - session driver for an A/B music listening study
//!
//! Replays a participant's recorded interactions against a study session,
//! reports what was collected, and stages the data: a local backup first,
//! then a best-effort submission to the study backend.
//!
//! Exit codes:
//!   0 - Success (session backed up; the backend may still have been unreachable)
//!   1 - Runtime error (bad script, config, or the local backup could not be written)

use anyhow::{Context, Result};
use chrono::Utc;
use listening_study::cli::{Args, OutputFormat};
use listening_study::config::{Config, CONFIG_FILE};
use listening_study::models::SessionDocument;
use listening_study::session::{ManualClock, ProgressGates, SessionAggregator};
use listening_study::storage::{self, BackupStore, FileBackupStore};
use listening_study::submit::{RemoteOutcome, Submitter};
use listening_study::{analysis, report, script};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("listening-study v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = if args.list_backups {
        handle_list_backups(&args)
    } else {
        run_session(args).await
    };

    if let Err(e) = result {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .listening-study.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the endpoint, backup location and progress gates.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(Some(config)) => {
                info!("Loaded default config from {}", CONFIG_FILE);
                config
            }
            Ok(None) => {
                debug!("No config file found, using defaults");
                Config::default()
            }
            Err(e) => {
                warn!("Failed to load config: {:#}", e);
                Config::default()
            }
        }
    };

    config.merge_with_args(args);
    Ok(config)
}

/// Handle --list-backups: print the sessions stored locally.
fn handle_list_backups(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let store = FileBackupStore::new(&config.storage.backup_path);
    let submissions = store.load()?;

    println!(
        "📦 {} session(s) in {}",
        submissions.len(),
        store.path().display()
    );
    for (i, entry) in submissions.iter().enumerate() {
        let field = |name: &str| entry.get(name).and_then(|v| v.as_str()).unwrap_or("-").to_string();
        println!(
            "   {}. session {} | user {} | ended {}",
            i + 1,
            field("sessionId"),
            field("userId"),
            field("endTime")
        );
    }

    Ok(())
}

/// Replay a script, then report, back up, submit and export.
async fn run_session(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    let script_path = args
        .script
        .clone()
        .context("No interaction script given (use --script)")?;
    let actions = script::load_script(&script_path)?;
    println!(
        "📜 Loaded {} actions from {}",
        actions.len(),
        script_path.display()
    );

    // Step 1: Build the session
    let clock = ManualClock::starting_at(Utc::now());
    let mut session = SessionAggregator::with_clock(Box::new(clock.clone()))
        .with_gates(ProgressGates::from(&config.gates));
    session.set_language(config.session.language.clone());
    session.init_session();

    // Step 2: Replay the participant's actions
    let stats = script::replay(&mut session, &clock, &actions)?;
    if session.record_play_end().is_some() {
        debug!("Closed playback left open at the end of the script");
    }
    println!(
        "🎧 Replayed {} actions ({:.1}s of participant time, step: {})",
        stats.actions,
        stats.elapsed_seconds,
        session.task_step()
    );
    if stats.blocked_advances > 0 {
        println!(
            "   ⛔ {} step change(s) refused by progress gates",
            stats.blocked_advances
        );
    }

    // Step 3: Back up and submit
    let document = if args.no_submit {
        info!("Submission skipped (--no-submit)");
        session.session_data()
    } else {
        submit_session(&config, &mut session).await?
    };

    // Step 4: Export and report
    if args.export {
        let path = storage::export_session(&document, &config.storage.export_dir, Utc::now())?;
        println!("💾 Exported session to {}", path.display());
    }

    if let Some(ref report_path) = args.report {
        let output = match args.format {
            OutputFormat::Json => report::generate_json_report(&document)?,
            OutputFormat::Markdown => report::generate_markdown_report(&document),
        };
        std::fs::write(report_path, &output)
            .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
        println!("📝 Report saved to {}", report_path.display());
    }

    print_summary(&document);
    Ok(())
}

/// Submit the session; only a failed local backup is an error.
async fn submit_session(config: &Config, session: &mut SessionAggregator) -> Result<SessionDocument> {
    let store = FileBackupStore::new(&config.storage.backup_path);
    let mut submitter = Submitter::new(
        Box::new(store),
        config.submit_endpoint(),
        config.submit.timeout_seconds,
    )?;

    println!("📤 Submitting session...");
    let outcome = submitter
        .submit(session)
        .await
        .context("Failed to save session locally")?;

    println!(
        "   Backed up to {}",
        config.storage.backup_path.display()
    );
    match outcome.remote {
        RemoteOutcome::Delivered { status } => {
            println!("   Delivered to backend (HTTP {})", status)
        }
        RemoteOutcome::Failed(ref reason) => {
            println!("   ⚠️  Backend unreachable, data kept locally: {}", reason)
        }
        RemoteOutcome::Skipped => println!("   Backend submission disabled"),
    }

    Ok(outcome.document)
}

/// Print a short summary of the collected data.
fn print_summary(document: &SessionDocument) {
    let summary = analysis::SessionSummary::from_document(document);

    println!("\n📊 Session Summary:");
    println!("   Participant: {}", document.user_id);
    if let Some(mapping) = document.version_mapping {
        println!("   Mapping: A = {}, B = {}", mapping.a, mapping.b);
    }
    println!(
        "   Contexts: {} | Events: {} | Responses: {}",
        summary.contexts, summary.total_events, summary.responses
    );
    println!(
        "   Listened: {:.1}s | Liked songs: {}",
        summary.total_listened_seconds, summary.liked_songs
    );
    println!("\n✅ Session {} complete.", document.session_id);
}
