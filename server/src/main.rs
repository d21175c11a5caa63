use clap::Parser;
use log::{error, info, warn};
use server::accounts::{AccountDefaults, AccountStore};
use server::config::{GameConfig, MatchMode};
use server::network::Server;
use server::specs::SpecCatalog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long running matches get to report and save on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Account store (JSON)
    #[arg(short, long, default_value = "accounts.json")]
    accounts: PathBuf,

    /// Troop and tower stat tables (JSON)
    #[arg(short, long, default_value = "specs.json")]
    specs: PathBuf,

    /// Optional game parameter file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Match mode, overrides the config file
    #[arg(short, long, value_enum)]
    mode: Option<MatchMode>,

    /// Matchmaking queue capacity, overrides the config file
    #[arg(long)]
    max_players: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(max_players) = args.max_players {
        config.max_players = max_players;
    }
    config.validate()?;

    let catalog = SpecCatalog::load(
        &args.specs,
        &[config.guard_tower.as_str(), config.king_tower.as_str()],
    )?;
    info!(
        "Loaded {} troops and {} towers from {}",
        catalog.troops.len(),
        catalog.towers.len(),
        args.specs.display()
    );

    let defaults = AccountDefaults {
        next_level: config.initial_next_level,
        multiplier: config.initial_multiplier,
    };
    let store = AccountStore::load(&args.accounts, defaults)?;

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, Arc::new(store), Arc::new(catalog), Arc::new(config)).await?;
    let matches = server.abort_handle();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Server stopped: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, aborting running matches");
            if !matches.abort_all(SHUTDOWN_GRACE).await {
                warn!("Some matches did not finish saving within {:?}", SHUTDOWN_GRACE);
            }
            Ok(())
        }
    }
}
