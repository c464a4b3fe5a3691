use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sheetsync_core::config::DEFAULT_CONFIG_FILE;
use sheetsync_core::{RunOptions, SyncConfig, TableOutcome};
use std::path::PathBuf;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

mod formatter;

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "Synchronize agency spreadsheets into a master workbook", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upsert agency store and tablet rows into the master sheets
    Sync {
        /// Root folder of the agency workbooks (overrides the configuration)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Master workbook (overrides the configuration)
        #[arg(long, value_name = "FILE")]
        master: Option<PathBuf>,

        /// Show what would be written without saving the master workbook
        #[arg(long)]
        dry_run: bool,
    },
    /// Post pending request rows to the webhook
    Notify {
        /// Log the messages instead of sending them; nothing is saved
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    let mut config = load_config(cli.config.as_ref())?;

    let exit_code = match cli.command {
        Command::Sync {
            root,
            master,
            dry_run,
        } => {
            if let Some(root) = root {
                config.root_folder = Some(root);
            }
            if let Some(master) = master {
                config.master_workbook = master;
            }
            match sheetsync_core::run_sync(&config, RunOptions { dry_run }) {
                Ok(report) => {
                    match cli.format {
                        OutputFormat::Human => formatter::print_sync_human(&report, dry_run),
                        OutputFormat::Json => formatter::print_json(&report)?,
                    }
                    let failed =
                        report.count(|o| matches!(o, TableOutcome::DoneWithError { .. }));
                    if failed > 0 { 1 } else { 0 }
                }
                Err(e) => {
                    error!("sync failed: {:#}", e);
                    2
                }
            }
        }
        Command::Notify { dry_run } => {
            match sheetsync_core::run_notify(&config, RunOptions { dry_run }) {
                Ok(report) => {
                    match cli.format {
                        OutputFormat::Human => formatter::print_notify_human(&report),
                        OutputFormat::Json => formatter::print_json(&report)?,
                    }
                    if report.failed > 0 { 1 } else { 0 }
                }
                Err(e) => {
                    error!("notify failed: {:#}", e);
                    2
                }
            }
        }
    };

    std::process::exit(exit_code);
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig> {
    let config = if let Some(config_path) = path {
        SyncConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_config_path.exists() {
            SyncConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            SyncConfig::default()
        }
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
