//! Creature spawning and despawning.
//!
//! Spawns go into a FIFO queue. A despawn pops the oldest `batch` entries,
//! whether or not those creatures were caught in the meantime; each entry
//! only clears the creature it placed.

use crate::grid::{Occupant, SpawnId, WorldGrid};
use crate::store::Catalog;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::Coord;
use std::collections::VecDeque;

pub const DEFAULT_SPAWN_BATCH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRecord {
    pub coord: Coord,
    pub spawn: SpawnId,
}

#[derive(Debug)]
pub struct SpawnScheduler {
    queue: VecDeque<SpawnRecord>,
    next_spawn: SpawnId,
    batch: usize,
}

impl SpawnScheduler {
    pub fn new(batch: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            next_spawn: 1,
            batch,
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_coords(&self) -> Vec<Coord> {
        self.queue.iter().map(|r| r.coord).collect()
    }

    /// Places `creature_id` at an empty `coord` and queues it for despawn.
    pub fn spawn_at(&mut self, grid: &mut WorldGrid, coord: Coord, creature_id: &str) -> bool {
        let spawn = self.next_spawn;
        let occupant = Occupant::Creature {
            id: creature_id.to_string(),
            spawn,
        };
        if grid.place(occupant, coord).is_err() {
            return false;
        }
        self.next_spawn += 1;
        self.queue.push_back(SpawnRecord { coord, spawn });
        true
    }

    /// Spawns up to `batch` creatures on distinct random empty cells.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        grid: &mut WorldGrid,
        catalog: &Catalog,
        rng: &mut R,
    ) -> Vec<(Coord, String)> {
        let empty = grid.empty_cells();
        let cells: Vec<Coord> = empty.choose_multiple(rng, self.batch).copied().collect();

        let mut spawned = Vec::with_capacity(cells.len());
        for coord in cells {
            let creature_id = catalog.choose(rng).id.clone();
            if self.spawn_at(grid, coord, &creature_id) {
                spawned.push((coord, creature_id));
            }
        }
        debug!("Spawned {} creatures, {} queued", spawned.len(), self.queue.len());
        spawned
    }

    /// Pops the `batch` oldest spawns and clears their creatures.
    ///
    /// Returns `None` when fewer than `batch` spawns are queued, leaving
    /// everything untouched. Otherwise returns the cells actually cleared.
    pub fn despawn(&mut self, grid: &mut WorldGrid) -> Option<Vec<Coord>> {
        if self.queue.len() < self.batch {
            return None;
        }

        let cleared: Vec<Coord> = self
            .queue
            .drain(..self.batch)
            .filter(|record| grid.clear_creature(record.coord, record.spawn))
            .map(|record| record.coord)
            .collect();
        debug!("Despawned {} creatures, {} queued", cleared.len(), self.queue.len());
        Some(cleared)
    }
}
