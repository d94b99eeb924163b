//! Connection registry and broadcast fan-out for authenticated players
//!
//! This module handles the server-side bookkeeping of connected players:
//! - Connection lifecycle (register on login, unregister on disconnect)
//! - Capacity limits and duplicate-login refusal
//! - Per-identity sends and broadcasts through outbound channels
//!
//! Sends never touch a socket. Each connection owns a writer task draining an
//! unbounded channel, so a slow peer cannot stall the broadcaster. A send
//! fails only when that writer is gone, which the caller treats as a
//! disconnect.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// Outbound half of a connection: frames queued for its writer task.
pub type Outbound = mpsc::UnboundedSender<String>;

/// A registered, authenticated connection
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: u32,
    /// Account name the connection authenticated as
    pub identity: String,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the login completed
    pub connected_at: Instant,
    outbound: Outbound,
}

impl Client {
    pub fn new(id: u32, identity: &str, addr: SocketAddr, outbound: Outbound) -> Self {
        Self {
            id,
            identity: identity.to_string(),
            addr,
            connected_at: Instant::now(),
            outbound,
        }
    }

    /// Queues a frame for the writer task. Returns false if the writer is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.outbound.send(frame.to_string()).is_ok()
    }
}

/// Registry of every authenticated connection, keyed by identity
pub struct ClientManager {
    clients: HashMap<String, Client>,
    /// Next available connection ID
    next_client_id: u32,
    /// Maximum number of concurrent players allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry with the given capacity
    ///
    /// Connection IDs start from 1 and increment for each login.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a connection for `identity`
    ///
    /// Returns None if the server is at capacity or the identity is already
    /// connected.
    pub fn add_client(
        &mut self,
        identity: &str,
        addr: SocketAddr,
        outbound: Outbound,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients || self.clients.contains_key(identity) {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, identity, addr);
        self.clients
            .insert(identity.to_string(), Client::new(client_id, identity, addr, outbound));

        Some(client_id)
    }

    /// Unregisters `identity`, dropping its outbound channel
    ///
    /// Returns true if the identity was registered.
    pub fn remove_client(&mut self, identity: &str) -> bool {
        if let Some(client) = self.clients.remove(identity) {
            info!(
                "Client {} ({}) disconnected after {:.1}s",
                client.id,
                client.identity,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.clients.contains_key(identity)
    }

    /// True if `identity` is registered under connection `client_id`
    ///
    /// Commands from a stale connection of a re-logged identity fail this check.
    pub fn is_current(&self, identity: &str, client_id: u32) -> bool {
        self.clients
            .get(identity)
            .is_some_and(|client| client.id == client_id)
    }

    /// Sends a frame to one identity
    ///
    /// Returns false if the identity is unknown or its writer is gone.
    pub fn send(&self, identity: &str, frame: &str) -> bool {
        self.clients
            .get(identity)
            .is_some_and(|client| client.send(frame))
    }

    /// Sends a frame to every registered identity except `exclude`
    ///
    /// Returns the identities whose writer is gone.
    pub fn broadcast(&self, frame: &str, exclude: Option<&str>) -> Vec<String> {
        self.clients
            .values()
            .filter(|client| Some(client.identity.as_str()) != exclude)
            .filter(|client| !client.send(frame))
            .map(|client| client.identity.clone())
            .collect()
    }

    pub fn identities(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Returns the number of connected players
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no players are connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
