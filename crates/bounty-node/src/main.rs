use anyhow::{Context, Result};
use bounty_ledger::{Autosave, FileStateStore, PersistenceError, RewardEngine, StateStore};
use bounty_node::cli::{self, OperatorCommand};
use bounty_node::config::{NodeConfig, DEFAULT_CONFIG_FILE};
use bounty_node::logging;
use bounty_node::notify::{spawn_pump, LogNotifier};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bounty")]
#[command(about = "Bounty reward ledger: balances, referrals, tasks and withdrawals", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// State file (overrides config and BOUNTY_DATA_FILE)
    #[arg(long, global = true, value_name = "FILE")]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine with autosave and the notification pump until Ctrl-C
    Start {
        /// Seconds between autosaves
        #[arg(long)]
        autosave_secs: Option<u64>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    #[command(flatten)]
    Operator(OperatorCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (ignore if it doesn't)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Priority order: CLI args > ENV vars > Config file > Defaults
    let mut config = match cli.command {
        Commands::Init { .. } => NodeConfig::default(),
        _ => NodeConfig::load(cli.config.as_deref())?,
    };
    config.apply_env_overrides();
    if let Some(data_file) = &cli.data_file {
        config.storage.data_file = data_file.clone();
    }

    let is_start = matches!(cli.command, Commands::Start { .. });
    if is_start
        && config.logging.show_boot_banner
        && cli.verbose == 0
        && std::env::var("RUST_LOG").is_err()
    {
        logging::display_boot_banner(env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        // Fall back to basic logging
        let level = logging::resolve_level(&config.logging, cli.verbose);
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                logging::default_directives(&level),
            ))
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    }

    match cli.command {
        Commands::Start { autosave_secs } => {
            if let Some(secs) = autosave_secs {
                config.storage.autosave_interval_secs = secs;
            }
            run(config).await
        }
        Commands::Init { output } => init(&output, cli.config.as_deref()),
        Commands::Operator(command) => {
            let engine = open_engine(&config).map_err(|e| {
                if matches!(e.downcast_ref(), Some(PersistenceError::Locked(_))) {
                    e.context("stop `bounty start` before running operator commands")
                } else {
                    e
                }
            })?;
            // Mutating commands persist through the engine
            let output = cli::execute(&engine, command).await?;
            println!("{output}");
            Ok(())
        }
    }
}

/// Holds the state file's single-writer lock until the engine is dropped.
fn open_engine(config: &NodeConfig) -> Result<RewardEngine> {
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::open(
        config.storage.data_file.clone(),
        config.storage.backup_file.clone(),
    )?);
    Ok(RewardEngine::open(
        config.ledger.clone(),
        store,
        config.storage.save_timeout(),
    ))
}

async fn run(config: NodeConfig) -> Result<()> {
    info!(
        data_file = %config.storage.data_file.display(),
        backup_file = %config.storage.backup_file.display(),
        operator = %config.ledger.operator_id,
        bot = %config.ledger.links.bot_username,
        "⚙️ Configuration loaded"
    );

    let engine = Arc::new(open_engine(&config).context("opening state file")?);
    let pump = spawn_pump(
        engine.subscribe(),
        Arc::new(LogNotifier),
        config.ledger.operator_id,
    );
    let autosave = Autosave::spawn(engine.clone(), config.storage.autosave_interval());

    info!("✅ Bounty ledger running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("🛑 Shutdown requested");

    let report = autosave
        .shutdown()
        .await
        .context("final save on shutdown")?;
    pump.abort();

    info!(
        accounts = report.accounts,
        bytes = report.bytes,
        "👋 Bounty ledger stopped"
    );
    Ok(())
}

fn init(output: &Path, config_path: Option<&Path>) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating {}", output.display()))?;

    let default_name = Path::new(DEFAULT_CONFIG_FILE)
        .file_name()
        .context("default config name")?;
    let target = match config_path {
        Some(path) => path.to_path_buf(),
        None => output.join(default_name),
    };
    if target.exists() {
        warn!(path = %target.display(), "⚠️ Config already exists, not overwriting");
        return Ok(());
    }

    let mut config = NodeConfig::default();
    config.storage.data_file = output.join("bounty_data.json");
    config.storage.backup_file = output.join("bounty_data_backup.json");
    config.save_to_file(&target)?;

    info!(path = %target.display(), "✨ Configuration written");
    Ok(())
}
