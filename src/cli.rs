//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// listening-study - session driver for the A/B music listening study
///
/// Replays a recorded interaction script against a fresh study session,
/// writes a session report, and stages the collected data: a local backup
/// first, then a best-effort submission to the study backend.
///
/// Examples:
///   listening-study --script participant.jsonl
///   listening-study --script participant.jsonl --offline --export
///   listening-study --script participant.jsonl --report run.md --no-submit
///   listening-study --list-backups
///   listening-study --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Interaction script to replay (JSON lines, one action per line)
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["init_config", "list_backups"]
    )]
    pub script: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .listening-study.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Interface language recorded with the session (zh, en, ja)
    #[arg(short, long, env = "LISTENING_STUDY_LANGUAGE")]
    pub language: Option<String>,

    /// Backend submission endpoint
    #[arg(long, value_name = "URL", env = "LISTENING_STUDY_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Submission request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep submissions local: back up, but do not contact the backend
    #[arg(long)]
    pub offline: bool,

    /// Skip submission entirely (no backup, no network)
    #[arg(long)]
    pub no_submit: bool,

    /// Backup file holding every submitted session
    #[arg(long, value_name = "FILE")]
    pub backup: Option<PathBuf>,

    /// Also export the session as a standalone JSON file
    #[arg(long)]
    pub export: bool,

    /// Directory for exported session files
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Write a session report to this file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Refuse to leave a task until its progress gate is met
    #[arg(long)]
    pub enforce_gates: bool,

    /// List the sessions stored in the backup file and exit
    #[arg(long)]
    pub list_backups: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .listening-study.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the session report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config || self.list_backups {
            return Ok(());
        }

        if let Some(ref script) = self.script {
            if !script.is_file() {
                return Err(format!("Script file does not exist: {}", script.display()));
            }
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err("Endpoint URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.offline && self.no_submit {
            return Err("Cannot use both --offline and --no-submit".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            script: None,
            config: None,
            language: None,
            endpoint: None,
            timeout: None,
            offline: false,
            no_submit: false,
            backup: None,
            export: false,
            export_dir: None,
            report: None,
            format: OutputFormat::Markdown,
            enforce_gates: false,
            list_backups: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_invalid_endpoint() {
        let mut args = make_args();
        args.endpoint = Some("localhost:8000".to_string());
        assert!(args.validate().is_err());

        args.endpoint = Some("https://study.example.org/api/submit".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_script() {
        let mut args = make_args();
        args.script = Some(PathBuf::from("does/not/exist.jsonl"));
        assert!(args.validate().is_err());

        args.list_backups = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.offline = true;
        args.no_submit = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_script_required_unless_utility_flag() {
        assert!(Args::try_parse_from(["listening-study"]).is_err());
        assert!(Args::try_parse_from(["listening-study", "--init-config"]).is_ok());
        assert!(Args::try_parse_from(["listening-study", "--list-backups"]).is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
