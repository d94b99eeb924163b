use crate::battle::DEFAULT_DAMAGE_MULTIPLIER;
use crate::scheduler::DEFAULT_SPAWN_BATCH;
use shared::{DEFAULT_COLS, DEFAULT_ROWS};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub catalog_path: PathBuf,
    pub accounts_path: PathBuf,
    pub game: GameConfig,
    pub spawn_interval: Duration,
    pub despawn_interval: Duration,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            catalog_path: PathBuf::from("pokedex.json"),
            accounts_path: PathBuf::from("players.json"),
            game: GameConfig::default(),
            spawn_interval: Duration::from_secs(60),
            despawn_interval: Duration::from_secs(60),
        }
    }
}

/// Rules of the world itself.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub rows: usize,
    pub cols: usize,
    pub spawn_batch: usize,
    pub damage_multiplier: f64,
    pub max_clients: usize,
    /// Fixed RNG seed; spawns and placements are random per run when unset.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            spawn_batch: DEFAULT_SPAWN_BATCH,
            damage_multiplier: DEFAULT_DAMAGE_MULTIPLIER,
            max_clients: 64,
            seed: None,
        }
    }
}
