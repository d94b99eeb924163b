use clap::Parser;
use log::{error, info};
use server::config::{GameConfig, ServerConfig};
use server::game::GameState;
use server::network::Server;
use server::store::{AccountStore, Catalog};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Creature catalog (JSON array of templates)
    #[arg(long, default_value = "pokedex.json")]
    catalog: PathBuf,

    /// Account file, rewritten after every catch
    #[arg(long, default_value = "players.json")]
    accounts: PathBuf,

    /// Board rows
    #[arg(long, default_value = "10")]
    rows: usize,

    /// Board columns
    #[arg(long, default_value = "18")]
    cols: usize,

    /// Seconds between spawn batches
    #[arg(long, default_value = "60")]
    spawn_interval: u64,

    /// Seconds between despawn batches
    #[arg(long, default_value = "60")]
    despawn_interval: u64,

    /// Creatures per spawn and despawn batch
    #[arg(long, default_value = "5")]
    spawn_batch: usize,

    /// Multiplier applied to Attack when computing damage
    #[arg(long, default_value = "50.0")]
    damage_multiplier: f64,

    /// Maximum concurrent players
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Fixed RNG seed for reproducible spawns and placements
    #[arg(long)]
    seed: Option<u64>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            catalog_path: args.catalog,
            accounts_path: args.accounts,
            game: GameConfig {
                rows: args.rows,
                cols: args.cols,
                spawn_batch: args.spawn_batch,
                damage_multiplier: args.damage_multiplier,
                max_clients: args.max_clients,
                seed: args.seed,
            },
            spawn_interval: Duration::from_secs(args.spawn_interval),
            despawn_interval: Duration::from_secs(args.despawn_interval),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());

    info!("Starting server...");
    info!(
        "Board {}x{}, {} creatures every {}s",
        config.game.rows,
        config.game.cols,
        config.game.spawn_batch,
        config.spawn_interval.as_secs()
    );

    let catalog = Catalog::load(&config.catalog_path).inspect_err(|e| error!("{}", e))?;
    let accounts = AccountStore::load(&config.accounts_path).inspect_err(|e| error!("{}", e))?;

    let game = GameState::new(&config.game, catalog, accounts);
    let mut server = Server::bind(&config, game).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
