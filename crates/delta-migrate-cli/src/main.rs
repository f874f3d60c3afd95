//! delta-migrate CLI - Delta planning between two record-store deployments.

use clap::{Parser, Subcommand};
use delta_migrate::{
    bucketize, Config, ListBucketProvider, MemoryGroupingStore, MemorySystem, MigrateError,
    Orchestrator, PlanResult, SpoolBucketProvider, SpoolFile, TypeStatus,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "delta-migrate")]
#[command(about = "Checksum-driven delta planning between two deployments")]
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

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute insert/update/delete ranges for every type
    Plan {
        /// Override differ batch size
        #[arg(long)]
        batch_size: Option<u64>,

        /// Expand ranges into row spools under this directory
        #[arg(long)]
        spool_dir: Option<PathBuf>,
    },

    /// Show per-type counts on both sides
    Counts,

    /// Split a spool of rows to create into dependency levels
    Bucketize {
        /// Spool file of `id,parent_id` lines
        spool: PathBuf,

        /// Write one id file per level into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // Bucketize works on a spool file alone and needs no configuration
    if let Commands::Bucketize { spool, out_dir } = &cli.command {
        return run_bucketize(spool, out_dir.as_deref(), cli.output_json);
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Bucketize { .. } => unreachable!(), // Handled above
        Commands::Plan {
            batch_size,
            spool_dir,
        } => {
            // Apply overrides
            if let Some(b) = batch_size {
                config.migration.batch_size = Some(b);
            }
            if let Some(dir) = spool_dir {
                config.migration.spool_dir = Some(dir);
            }
            config.validate()?;

            let cancel_token = setup_signal_handler().await?;
            let orchestrator = open_orchestrator(config)?;
            let result = orchestrator.run(Some(cancel_token)).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_plan(&result);
            }

            if result.status == "cancelled" {
                return Err(MigrateError::Cancelled);
            }
            if !result.failed_types.is_empty() {
                let failed: Vec<&str> = result.failed_types.iter().map(|t| t.as_str()).collect();
                return Err(MigrateError::type_failed(
                    failed.join(", "),
                    "planning failed, see the per-type errors above",
                ));
            }
        }

        Commands::Counts => {
            let orchestrator = open_orchestrator(config)?;
            let counts = orchestrator.counts().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("{:<24} {:>12} {:>12}", "TYPE", "SOURCE", "DESTINATION");
                for m in &counts {
                    println!(
                        "{:<24} {:>12} {:>12}",
                        m.migration_type,
                        m.src_count.unwrap_or(0),
                        m.dest_count.unwrap_or(0)
                    );
                    if m.src_count != m.dest_count {
                        warn!(
                            "{}: source={} destination={} (MISMATCH)",
                            m.migration_type,
                            m.src_count.unwrap_or(0),
                            m.dest_count.unwrap_or(0)
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn open_orchestrator(config: Config) -> Result<Orchestrator, MigrateError> {
    let source = MemorySystem::load(&config.source.name, &config.source.snapshot)?;
    let destination = MemorySystem::load(&config.destination.name, &config.destination.snapshot)?;
    Orchestrator::new(config, Arc::new(source), Arc::new(destination))
}

fn print_plan(result: &PlanResult) {
    println!("\nPlan {}!", result.status);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Types: {} ({} in sync, {} failed)",
        result.types_total, result.types_in_sync, result.types_failed
    );

    for plan in &result.types {
        match (plan.status, &plan.ranges) {
            (TypeStatus::Failed, _) | (_, None) => println!(
                "  ✗ {}: {}",
                plan.migration_type,
                plan.error.as_deref().unwrap_or("failed")
            ),
            (TypeStatus::InSync, Some(_)) => println!("  ✓ {}: in sync", plan.migration_type),
            (TypeStatus::Planned, Some(ranges)) => {
                println!(
                    "  ~ {}: insert {:?}, update {:?}, delete {:?}",
                    plan.migration_type,
                    ranges.insert_ranges.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                    ranges.update_ranges.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                    ranges.delete_ranges.iter().map(|r| r.to_string()).collect::<Vec<_>>()
                );
                if let Some(c) = &plan.counts {
                    println!(
                        "      rows: create {}, update {}, delete {}",
                        c.create, c.update, c.delete
                    );
                }
            }
        }
    }

    let join = |types: &[delta_migrate::MigrationType]| {
        types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
    };
    println!("  Delete order: {}", join(&result.delete_order));
    println!("  Create order: {}", join(&result.create_order));
    println!("  Update order: {}", join(&result.update_order));
}

fn run_bucketize(
    spool: &Path,
    out_dir: Option<&Path>,
    output_json: bool,
) -> Result<(), MigrateError> {
    let reader = SpoolFile::new(spool).open()?;
    let mut store = MemoryGroupingStore::new();

    if let Some(dir) = out_dir {
        let mut provider = SpoolBucketProvider::new(dir)?;
        let summary = bucketize(reader, &mut store, &mut provider)?;
        let levels = provider.finish()?;
        info!("{} rows in {} levels", summary.rows, summary.levels);

        if output_json {
            println!("{}", serde_json::to_string_pretty(&levels)?);
        } else {
            for level in &levels {
                println!("Level {}: {} ids -> {}", level.level, level.ids, level.path.display());
            }
        }
        return Ok(());
    }

    let mut provider = ListBucketProvider::<i64>::new();
    let summary = bucketize(reader, &mut store, &mut provider)?;
    info!("{} rows in {} levels", summary.rows, summary.levels);

    if output_json {
        let out = json!({ "levels": provider.buckets(), "rows": summary.rows });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (level, ids) in provider.buckets().iter().enumerate() {
            let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            println!("Level {}: {}", level, ids.join(" "));
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stderr keeps --output-json clean on stdout
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Finishing types in flight...");
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Finishing types in flight...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing types in flight...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
