//! World state and the rules applied to it
//!
//! This module ties the grid, spawn queue, battles and accounts together:
//! - Login admission and the initial snapshot sequence
//! - Movement, which resolves to exactly one of catch, battle or step
//! - Roster submission with ownership checks
//! - Disconnect cleanup and timer-driven spawns and despawns

use crate::battle::{BattleEngine, BattleError, Combatant, Notice};
use crate::client_manager::{ClientManager, Outbound};
use crate::config::GameConfig;
use crate::error::ServerError;
use crate::grid::{GridError, Occupant, WorldGrid};
use crate::scheduler::SpawnScheduler;
use crate::store::{AccountStore, Catalog};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    document, encode_document, Command, Coord, Document, ProtocolError, AUTH_FAILED,
    AUTH_SUCCESS, QUIT,
};
use std::net::SocketAddr;

fn line(text: &str) -> String {
    format!("{}\n", text)
}

/// The authoritative world: grid, spawn queue, battles, accounts and the
/// connection registry.
///
/// Only the server loop holds a `GameState`, and it applies one command or
/// timer tick at a time, so no method here ever races another. Messages are
/// queued on outbound channels while the state is mutated; identities whose
/// writer turned out to be gone are disconnected before the method returns.
pub struct GameState {
    grid: WorldGrid,
    spawns: SpawnScheduler,
    battles: BattleEngine,
    clients: ClientManager,
    catalog: Catalog,
    accounts: AccountStore,
    rng: StdRng,
    dead: Vec<String>,
}

impl GameState {
    /// Creates an empty world from loaded data
    ///
    /// The RNG is seeded from `config.seed` when given, so spawn placement
    /// and login positions are reproducible in tests.
    pub fn new(config: &GameConfig, catalog: Catalog, accounts: AccountStore) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            grid: WorldGrid::new(config.rows, config.cols),
            spawns: SpawnScheduler::new(config.spawn_batch),
            battles: BattleEngine::new(config.damage_multiplier),
            clients: ClientManager::new(config.max_clients),
            catalog,
            accounts,
            rng,
            dead: Vec::new(),
        }
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    pub fn battles(&self) -> &BattleEngine {
        &self.battles
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Authenticates and admits a new connection.
    ///
    /// On success the connection receives, in order: the success line, its
    /// owned creature ids, and the creature snapshot. The player is then
    /// placed on a random empty cell and everyone receives the player
    /// snapshot. On failure the connection receives the failure line only.
    pub fn login(
        &mut self,
        username: &str,
        password: &str,
        addr: SocketAddr,
        outbound: Outbound,
    ) -> Result<u32, ServerError> {
        let client_id = match self.admit(username, password, addr, outbound.clone()) {
            Ok(id) => id,
            Err(e) => {
                let _ = outbound.send(line(AUTH_FAILED));
                return Err(e);
            }
        };

        let owned = self
            .accounts
            .get(username)
            .map(|account| account.creature_list())
            .unwrap_or_default();
        self.send_to(username, &line(AUTH_SUCCESS));
        self.send_to(username, &line(&owned));
        self.send_to(username, &encode_document(&self.grid.creature_snapshot()));

        match self.grid.place_randomly(username, &mut self.rng) {
            Ok(coord) => info!("{} entered the world at {}", username, coord),
            Err(e) => warn!("Could not place {}: {}", username, e),
        }
        self.broadcast_players();
        self.reap();
        Ok(client_id)
    }

    fn admit(
        &mut self,
        username: &str,
        password: &str,
        addr: SocketAddr,
        outbound: Outbound,
    ) -> Result<u32, ServerError> {
        if !self.accounts.verify(username, password) {
            return Err(ServerError::auth(username, "bad credentials"));
        }
        if self.clients.contains(username) {
            return Err(ServerError::auth(username, "already connected"));
        }
        if self.grid.empty_cells().is_empty() {
            return Err(ServerError::auth(username, "board is full"));
        }
        self.clients
            .add_client(username, addr, outbound)
            .ok_or_else(|| ServerError::auth(username, "server full"))
    }

    /// Applies one command from `identity`'s connection `client_id`.
    ///
    /// Commands from a connection that is no longer registered are dropped.
    pub fn handle_command(
        &mut self,
        identity: &str,
        client_id: u32,
        command: Command,
    ) -> Result<(), ServerError> {
        if !self.clients.is_current(identity, client_id) {
            debug!("Dropping command from stale connection {} ({})", client_id, identity);
            return Ok(());
        }
        if let Some(claimed) = command.claimed_identity() {
            if claimed != identity {
                return Err(ProtocolError::BadCommand(command.to_string()).into());
            }
        }

        let result = match command {
            Command::Move(target) => self.handle_move(identity, target),
            Command::SubmitCreature { creature_id, .. } => {
                self.submit_creature(identity, &creature_id)
            }
            Command::Battle { action, .. } => self
                .battles
                .act(identity, action)
                .map(|notices| self.deliver(notices))
                .map_err(ServerError::from),
            Command::Surrender { .. } => self
                .battles
                .surrender(identity)
                .map(|notices| self.deliver(notices))
                .map_err(ServerError::from),
        };
        self.reap();
        result
    }

    /// Resolves a movement request
    ///
    /// Exactly one of catch, battle or step happens. A creature on the
    /// target is caught and the mover steps onto its cell; a player on the
    /// target is challenged while the mover stays put. Players in a battle
    /// cannot move. Every accepted move ends with a player snapshot.
    fn handle_move(&mut self, identity: &str, target: Coord) -> Result<(), ServerError> {
        if !self.grid.in_bounds(target) {
            return Err(GridError::OutOfBounds(target).into());
        }
        if self.battles.is_battling(identity) {
            return Err(BattleError::AlreadyInBattle(identity.to_string()).into());
        }
        let current = self
            .grid
            .locate(identity)
            .ok_or_else(|| GridError::NotPlaced(identity.to_string()))?;
        if current == target {
            return Ok(());
        }

        match self.grid.lookup_at(target).cloned() {
            Some(Occupant::Creature { id, .. }) => self.catch_creature(identity, target, &id)?,
            Some(Occupant::Player(other)) => {
                let notices = self.battles.start(identity, &other)?;
                self.deliver(notices);
            }
            None => {
                self.grid.move_identity(identity, target)?;
            }
        }

        self.broadcast_players();
        Ok(())
    }

    /// Records the catch before touching the board, so a failed write
    /// leaves the creature where it was.
    fn catch_creature(
        &mut self,
        identity: &str,
        coord: Coord,
        creature_id: &str,
    ) -> Result<(), ServerError> {
        let template = self
            .catalog
            .get(creature_id)
            .cloned()
            .ok_or_else(|| BattleError::UnknownCreature(creature_id.to_string()))?;

        self.accounts.record_catch(identity, template)?;
        self.grid.clear(coord);
        self.grid.move_identity(identity, coord)?;
        info!("{} caught creature {} at {}", identity, creature_id, coord);

        self.send_to(identity, &encode_document(&document(identity, creature_id)));
        self.broadcast(&document(coord.to_string(), ""), Some(identity));
        Ok(())
    }

    /// Adds an owned creature to the caller's battle roster
    ///
    /// Each submitted copy must be backed by a separately owned copy.
    fn submit_creature(&mut self, identity: &str, creature_id: &str) -> Result<(), ServerError> {
        if !self.battles.is_battling(identity) {
            return Err(BattleError::NotInBattle(identity.to_string()).into());
        }
        let owned = self
            .accounts
            .get(identity)
            .map(|account| account.owned_count(creature_id))
            .unwrap_or(0);
        if self.battles.submitted_count(identity, creature_id) >= owned {
            return Err(BattleError::NotOwned {
                identity: identity.to_string(),
                creature_id: creature_id.to_string(),
            }
            .into());
        }
        let combatant = self
            .catalog
            .get(creature_id)
            .and_then(Combatant::from_template)
            .ok_or_else(|| BattleError::UnknownCreature(creature_id.to_string()))?;

        let notices = self.battles.submit(identity, combatant)?;
        self.deliver(notices);
        Ok(())
    }

    /// Handles a closed connection. Ignored unless `client_id` is still current.
    pub fn disconnect(&mut self, identity: &str, client_id: u32) {
        if self.clients.is_current(identity, client_id) {
            self.drop_connection(identity);
        }
        self.reap();
    }

    /// Unregisters, removes from the board, forfeits and announces the quit
    fn drop_connection(&mut self, identity: &str) {
        if !self.clients.remove_client(identity) {
            return;
        }
        self.grid.remove_identity(identity);
        let notices = self.battles.forfeit(identity);
        self.deliver(notices);
        self.broadcast(&document(identity, QUIT), None);
    }

    /// Runs one spawn batch
    ///
    /// Places up to a batch of creatures on empty cells and broadcasts only
    /// the new cells. A full board spawns nothing and sends nothing.
    pub fn spawn_tick(&mut self) {
        let spawned = self
            .spawns
            .spawn(&mut self.grid, &self.catalog, &mut self.rng);
        if !spawned.is_empty() {
            let delta: Document = spawned
                .into_iter()
                .map(|(coord, id)| (coord.to_string(), id))
                .collect();
            self.broadcast(&delta, None);
        }
        self.reap();
    }

    /// Runs one despawn batch
    ///
    /// Skipped while fewer than a batch of spawns are queued. Otherwise the
    /// oldest batch is retired and only the cells that still held their
    /// creature are broadcast as emptied.
    pub fn despawn_tick(&mut self) {
        match self.spawns.despawn(&mut self.grid) {
            None => debug!(
                "Despawn skipped: {} of {} spawns queued",
                self.spawns.queued(),
                self.spawns.batch()
            ),
            Some(cleared) if cleared.is_empty() => {}
            Some(cleared) => {
                let delta: Document = cleared
                    .into_iter()
                    .map(|coord| (coord.to_string(), String::new()))
                    .collect();
                self.broadcast(&delta, None);
            }
        }
        self.reap();
    }

    fn deliver(&mut self, notices: Vec<Notice>) {
        for (identity, notice) in notices {
            self.send_to(&identity, &encode_document(&notice.to_document()));
        }
    }

    fn send_to(&mut self, identity: &str, frame: &str) {
        if !self.clients.send(identity, frame) && self.clients.contains(identity) {
            self.dead.push(identity.to_string());
        }
    }

    fn broadcast(&mut self, doc: &Document, exclude: Option<&str>) {
        let dead = self.clients.broadcast(&encode_document(doc), exclude);
        self.dead.extend(dead);
    }

    fn broadcast_players(&mut self) {
        let snapshot = self.grid.player_snapshot();
        self.broadcast(&snapshot, None);
    }

    /// Disconnects every identity whose writer was found gone.
    fn reap(&mut self) {
        while let Some(identity) = self.dead.pop() {
            warn!("Outbound channel for {} is closed, disconnecting", identity);
            self.drop_connection(&identity);
        }
    }
}
