//! FixMyArea - report local issues, even offline
//!
//! Reports are queued on disk immediately and synced to the backend
//! (photo hosting, then the issue document) whenever `fixmyarea sync` runs.

use clap::{Parser, Subcommand, ValueEnum};
use fixmyarea_api_client::ApiError;
use fixmyarea_core::error::{exit_codes, ErrorCode, ErrorReport};
use fixmyarea_sync::{ReportId, SyncError};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::{config, manage, status, submit, sync};

/// Queue civic issue reports offline and sync them later
#[derive(Parser)]
#[command(name = "fixmyarea")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./fixmyarea.toml when present)
    #[arg(long, global = true, env = "FIXMYAREA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the report store directory
    #[arg(long, global = true, env = "FIXMYAREA_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a new report
    Submit(submit::SubmitArgs),

    /// Show queued and failed reports
    Status,

    /// Upload queued reports
    Sync {
        /// Keep running, retrying failed attempts as their backoff expires
        #[arg(short, long)]
        watch: bool,

        /// Ignore backoff delays from earlier failures
        #[arg(long)]
        now: bool,
    },

    /// Move a failed report back into the queue
    Retry {
        /// Report id
        id: ReportId,
    },

    /// Drop a failed report for good
    Discard {
        /// Report id
        id: ReportId,
    },

    /// Delete a report, queued or failed
    Delete {
        /// Report id
        id: ReportId,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let ctx = match commands::Context::load(cli.config.as_deref(), cli.store_dir, cli.verbose) {
        Ok(ctx) => ctx,
        Err(e) => return fail(&e, cli.format),
    };

    let result = match cli.command {
        Commands::Submit(args) => submit::run(&ctx, args, cli.format).await,
        Commands::Status => status::run(&ctx, cli.format),
        Commands::Sync { watch, now } => sync::run(&ctx, watch, now, cli.format).await,
        Commands::Retry { id } => manage::retry(&ctx, id, cli.format),
        Commands::Discard { id } => manage::discard(&ctx, id, cli.format),
        Commands::Delete { id } => manage::delete(&ctx, id, cli.format),
        Commands::Config => config::run(&ctx, cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e, cli.format),
    }
}

fn fail(err: &anyhow::Error, format: Format) -> ExitCode {
    match format {
        Format::Json => eprintln!("{}", serde_json::json!({ "error": error_report(err) })),
        Format::Text => eprintln!("{} {:#}", "Error:".red().bold(), err),
    }
    let code = exit_code(err);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn error_report(err: &anyhow::Error) -> ErrorReport {
    let mut report = if let Some(e) = err.downcast_ref::<SyncError>() {
        e.to_report()
    } else if let Some(e) = err.downcast_ref::<fixmyarea_core::Error>() {
        e.to_report()
    } else {
        let code = match err.downcast_ref::<ApiError>() {
            Some(ApiError::Config(_) | ApiError::MissingEnvVar(_) | ApiError::InvalidUrl(_)) => {
                ErrorCode::ConfigError
            }
            Some(_) => ErrorCode::RemoteError,
            None => ErrorCode::Unknown,
        };
        fixmyarea_core::Error::new(code, format!("{err:#}")).to_report()
    };

    // outermost anyhow context, e.g. which store could not be opened
    if report.context.is_none() && err.chain().nth(1).is_some() {
        report.context = Some(err.to_string());
    }
    report
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<SyncError>() {
        return e.exit_code();
    }
    if let Some(e) = err.downcast_ref::<fixmyarea_core::Error>() {
        return if e.code.category() == "Configuration" {
            exit_codes::CONFIG_ERROR
        } else {
            exit_codes::FAILURE
        };
    }
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Config(_) | ApiError::MissingEnvVar(_) | ApiError::InvalidUrl(_)) => {
            exit_codes::CONFIG_ERROR
        }
        Some(_) => exit_codes::REMOTE_ERROR,
        None => exit_codes::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_codes_by_error_kind() {
        let missing = anyhow::Error::new(SyncError::NotFound(ReportId::new()));
        assert_eq!(exit_code(&missing), exit_codes::NOT_FOUND);

        let env = anyhow::Error::new(ApiError::missing_env("FIRESTORE_PROJECT_ID"));
        assert_eq!(exit_code(&env), exit_codes::CONFIG_ERROR);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&other), exit_codes::FAILURE);
    }

    #[test]
    fn test_error_report_keeps_code_and_context() {
        let err = anyhow::Error::new(SyncError::StoreLocked(PathBuf::from("/tmp/q")))
            .context("cannot open report store at /tmp/q");
        let report = error_report(&err);
        assert_eq!(report.code, ErrorCode::StoreLocked);
        assert_eq!(report.context.as_deref(), Some("cannot open report store at /tmp/q"));

        let report = error_report(&anyhow::Error::new(ApiError::missing_env("FIRESTORE_PROJECT_ID")));
        assert_eq!(report.code, ErrorCode::ConfigError);
        assert!(report.message.contains("FIRESTORE_PROJECT_ID"));

        assert_eq!(error_report(&anyhow::anyhow!("boom")).code, ErrorCode::Unknown);
    }
}
