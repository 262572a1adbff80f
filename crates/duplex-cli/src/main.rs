//! duplex - reconciliation core of a two-way file sync client
//!
//! Runs the reconciliation pipeline over a scenario file holding a Synced Tree and
//! both Update Trees, and manages the configuration the pipeline uses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use duplex_config::{Config, ConfigLoader};
use duplex_sync::{ConflictNaming, ReconciliationPipeline, SyncSnapshot, SyncState};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod display;
mod json_output;

/// duplex - reconciliation core of a two-way file sync client
#[derive(Parser)]
#[command(
    name = "duplex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reconcile the pending changes of two replicas",
    long_about = "duplex merges the changes detected on a remote and a local replica since their\n\
                  last synchronized state into a conflict-resolved propagation plan."
)]
struct Cli {
    /// Verbose mode - debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a scenario and print the Propagation Tree
    Reconcile {
        /// JSON file with the Synced Tree and both Update Trees
        scenario: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print or write the default configuration
    Config {
        /// Write to this file instead of printing; the extension picks the format
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Indented tree for terminals
    Text,
    /// Machine-readable result
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config, cli.verbose, cli.quiet, cli.json_logs)?;
    info!("duplex v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Reconcile { scenario, format } => reconcile_command(&config, &scenario, format).await?,
        Commands::Config { output } => config_command(output.as_deref())?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };
    Ok(config)
}

fn init_logging(config: &Config, verbose: bool, quiet: bool, json: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let installed = if json || config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn conflict_naming(config: &Config) -> Result<ConflictNaming> {
    let naming = &config.naming;
    ConflictNaming::from_templates(
        &naming.name_clash_template,
        &naming.delete_conflict_template,
        &naming.edit_conflict_template,
        naming.max_name_length,
        naming.suffix_length,
    )
    .context("Invalid conflict name template")
}

/// Read a scenario file
fn load_scenario(path: &Path) -> Result<SyncSnapshot> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid scenario {}", path.display()))
}

async fn reconcile_command(config: &Config, scenario: &Path, format: OutputFormat) -> Result<()> {
    let snapshot = load_scenario(scenario)?;
    debug!(
        "Scenario has {} synced, {} remote and {} local nodes",
        snapshot.synced.len(),
        snapshot.remote_updates.len(),
        snapshot.local_updates.len()
    );
    let state = SyncState::from_snapshot(snapshot).context("Scenario trees are inconsistent")?;

    let pipeline =
        ReconciliationPipeline::spawn(state, conflict_naming(config)?, config.scheduler.queue_capacity);
    let report = pipeline.execute(&CancellationToken::new()).await?;
    let result = pipeline.snapshot().await?;

    match format {
        OutputFormat::Text => display::print_reconciliation(&report, &result)?,
        OutputFormat::Json => {
            let output = json_output::ReconcileResultJson::new(scenario, &report, result);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn config_command(output: Option<&Path>) -> Result<()> {
    let config = Config::default();
    match output {
        Some(path) => {
            ConfigLoader::save_to_file(&config, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Default configuration written to {}",
                style("✓").green().bold(),
                path.display()
            );
        }
        None => print!("{}", ConfigLoader::to_string_for(&config, Path::new("duplex.yaml"))?),
    }
    Ok(())
}
