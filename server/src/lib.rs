//! # Creature World Server Library
//!
//! This library provides the authoritative server for a shared creature-
//! collecting world. Players log in over TCP, walk a fixed grid, catch the
//! creatures that periodically spawn on it, and challenge each other to
//! turn-based battles with the creatures they own.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! The server owns the grid, the spawn queue, every battle and the account
//! file. Clients only send intents; all placement, catch and combat
//! decisions are made here and broadcast as JSON documents.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Credential check against the account file
//! - Duplicate-login and capacity refusal
//! - Disconnect cleanup, including forfeiting an ongoing battle
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! One task owns the [`game::GameState`] and applies commands and timer
//! ticks strictly one at a time. Connection tasks only parse lines and
//! forward [`network::GameCommand`]s, so every world mutation is
//! serialized without locks.
//!
//! ### Per-Connection Writers
//! Each connection gets an unbounded outbound channel drained by its own
//! writer task. Broadcasting never blocks on a slow socket; a closed
//! channel is treated as a disconnect.
//!
//! ## Module Organization
//!
//! - `grid`: the board and its coordinate/identity indices
//! - `scheduler`: FIFO spawn queue with batched despawns
//! - `battle`: battle sessions and the damage rule
//! - `store`: creature catalog and persisted accounts
//! - `client_manager`: connection registry and broadcast fan-out
//! - `game`: the world state tying the above together
//! - `network`: TCP accept loop, sessions and the main server loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::GameState;
//! use server::network::Server;
//! use server::store::{AccountStore, Catalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let catalog = Catalog::load(&config.catalog_path)?;
//!     let accounts = AccountStore::load(&config.accounts_path)?;
//!
//!     let game = GameState::new(&config.game, catalog, accounts);
//!     let mut server = Server::bind(&config, game).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod battle;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod grid;
pub mod network;
pub mod scheduler;
pub mod store;
