//! Binary entry point for rssd.
//!
//! Runs the feed reader service, or one-shot schema commands against its
//! database.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stdout for command output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use rssd::config::{parse_addr, parse_duration};
use rssd::observability::{self, ObservabilityConfig};
use rssd::storage::{self, Database};
use rssd::{Error, MigrationReport, RssdConfig, SchemaState, schema, server};
use std::path::PathBuf;
use std::process::ExitCode;

/// rssd - A self-hosted RSS reader.
#[derive(Parser)]
#[command(name = "rssd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// HTTP listening address, e.g. `:8080`.
    #[arg(long, global = true)]
    http: Option<String>,

    /// Shutdown grace period for existing connections, e.g. `10s`.
    #[arg(long, global = true)]
    grace: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Migrate the database and serve HTTP (default).
    Serve,

    /// Migrate the database and exit.
    Migrate,

    /// Report the database schema version without migrating.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let handle = match ObservabilityConfig::from_config(&config, cli.verbose)
        .and_then(|obs| observability::init(&obs))
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => server::run(config, handle.prometheus()).await,
        Commands::Migrate => cmd_migrate(&config),
        Commands::Status => cmd_status(&config),
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    };
    tracing::info!("exit");
    code
}

/// Loads config from file and environment, then applies CLI flags.
fn load_config(cli: &Cli) -> rssd::Result<RssdConfig> {
    let mut config = match &cli.config {
        Some(path) => RssdConfig::load_from_file(path)?,
        None => RssdConfig::load_default()?,
    };
    config.apply_env_overrides()?;

    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    if let Some(http) = &cli.http {
        config.http_addr = parse_addr(http)?;
    }
    if let Some(grace) = &cli.grace {
        config.http_grace = parse_duration(grace)?;
    }

    Ok(config)
}

fn cmd_migrate(config: &RssdConfig) -> rssd::Result<()> {
    let (db, report) =
        Database::open_with_report(&config.db_path, &config.storage, &schema::registry())?;
    print_report(&config.db_path, &report);
    db.close()
}

fn print_report(path: &std::path::Path, report: &MigrationReport) {
    if report.is_noop() {
        println!("{}: schema up to date at version {}", path.display(), report.to);
        return;
    }
    println!(
        "{}: migrated schema from version {} to {}",
        path.display(),
        report.from,
        report.to
    );
    for step in &report.applied {
        println!(
            "  {:>4}  {}  ({} ms)",
            step.version,
            step.description,
            step.duration.as_millis()
        );
    }
}

fn cmd_status(config: &RssdConfig) -> rssd::Result<()> {
    let registry = schema::registry();
    let status = storage::inspect(&config.db_path, &config.storage, &registry)?;

    println!("Database: {}", status.path.display());
    if !status.exists {
        println!("  (file does not exist yet)");
    }
    println!("Schema:   {}", status.state);

    match status.state {
        SchemaState::UpToDate(_) => {},
        SchemaState::Behind { current, target } => {
            for version in (current + 1)..=target {
                if let Some(step) = registry.step_for_version(version) {
                    println!("  pending {version:>4}  {}", step.description());
                }
            }
        },
        SchemaState::Ahead { current, target } => {
            return Err(Error::VersionSkew {
                current,
                supported: target,
            });
        },
    }

    Ok(())
}
