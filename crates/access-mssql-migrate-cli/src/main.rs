//! access-mssql-migrate CLI - Microsoft Access to SQL Server migration.

use access_mssql_migrate::target::OutcomeStatus;
use access_mssql_migrate::{Config, MigrateError, MigrationOutcome, Orchestrator, ProgressEvent};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "access-mssql-migrate")]
#[command(about = "Migrate Microsoft Access databases to SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress events as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Only migrate these tables (comma separated, case-insensitive)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Override rows per insert transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Do not create secondary indexes
        #[arg(long)]
        skip_indexes: bool,

        /// Do not create foreign keys
        #[arg(long)]
        skip_foreign_keys: bool,
    },

    /// Print the DDL a run would execute without changing the target
    Plan {
        /// Only plan these tables (comma separated, case-insensitive)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            tables,
            batch_size,
            skip_indexes,
            skip_foreign_keys,
        } => {
            // Apply overrides
            if !tables.is_empty() {
                config.migration.tables = tables;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if skip_indexes {
                config.migration.create_indexes = false;
            }
            if skip_foreign_keys {
                config.migration.create_foreign_keys = false;
            }

            let cancel_token = setup_signal_handler();
            let mut orchestrator = Orchestrator::connect(&config)?;

            let printer = if cli.progress {
                let (tx, rx) = mpsc::unbounded_channel();
                orchestrator = orchestrator.with_progress(tx);
                Some(spawn_progress_printer(rx))
            } else {
                None
            };

            let outcome = orchestrator.execute(cancel_token).await;
            drop(orchestrator);
            if let Some(printer) = printer {
                let _ = printer.await;
            }

            report_outcome(&outcome, cli.output_json)?;
            Ok(ExitCode::from(outcome.exit_code))
        }

        Commands::Plan { tables } => {
            if !tables.is_empty() {
                config.migration.tables = tables;
            }

            let orchestrator = Orchestrator::connect(&config)?;
            let plan = orchestrator.plan().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for (table, reason) in &plan.skipped {
                    eprintln!("-- skipped {}: {}", table, reason);
                }
                print!("{}", plan.to_sql());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::connect(&config)?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (Access): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (SQL Server): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check failed",
                    "testing source and target connections",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report_outcome(outcome: &MigrationOutcome, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    if let Some(ref error) = outcome.error {
        eprintln!("{}", error);
    }

    if let Some(ref result) = outcome.result {
        println!("\nMigration {}!", result.status);
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!(
            "  Tables: {}/{}",
            result.tables_migrated, result.tables_total
        );
        println!("  Rows: {}", result.rows_transferred);
        println!(
            "  Indexes: {} created, {} failed",
            result.indexes_created, result.indexes_failed
        );
        if result.foreign_keys_enabled {
            println!(
                "  Foreign keys: {} created, {} failed",
                result.foreign_keys_created, result.foreign_keys_failed
            );
        } else {
            println!("  Foreign keys: not created");
        }
        for table in &result.tables {
            match &table.status {
                OutcomeStatus::Success => println!(
                    "    {:<30} {:>10} rows {:>4} columns {:>3} indexes",
                    table.name, table.rows_migrated, table.columns, table.indexes
                ),
                OutcomeStatus::Skipped(reason) => {
                    println!("    {:<30} skipped: {}", table.name, reason)
                }
            }
        }
    }

    Ok(())
}

/// Print each progress event as one JSON line on stderr until the sender closes.
fn spawn_progress_printer(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("{}", line);
            }
        }
    })
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    tokio::spawn(async move {
        match signal(SignalKind::interrupt()) {
            Ok(mut sigint) => {
                sigint.recv().await;
                eprintln!("\nReceived SIGINT. Finishing the current batch and stopping...");
                token_int.cancel();
            }
            Err(e) => eprintln!("Failed to install SIGINT handler: {}", e),
        }
    });

    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                eprintln!("\nReceived SIGTERM. Finishing the current batch and stopping...");
                token_term.cancel();
            }
            Err(e) => eprintln!("Failed to install SIGTERM handler: {}", e),
        }
    });

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current batch and stopping...");
            token.cancel();
        }
    });

    cancel_token
}
