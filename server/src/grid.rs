//! World grid and its reverse location indices.
//!
//! Each cell holds at most one occupant. Two indices mirror the cells:
//! coordinate → creature id for creatures, and a coordinate ↔ identity
//! bijection for players. Every mutating method keeps cells and indices in
//! step; `check_consistency` verifies that after the fact.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Coord, Document};
use std::collections::HashMap;

/// Serial number of one spawn event.
pub type SpawnId = u64;

/// What a single cell holds
///
/// Creatures carry the spawn event that placed them so a late despawn can
/// tell them apart from a newer creature on the same cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupant {
    Creature { id: String, spawn: SpawnId },
    Player(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("{0} is outside the board")]
    OutOfBounds(Coord),
    #[error("{0} is already occupied")]
    Occupied(Coord),
    #[error("'{0}' is already on the board")]
    AlreadyPlaced(String),
    #[error("'{0}' is not on the board")]
    NotPlaced(String),
    #[error("board is full")]
    Full,
}

/// Fixed-size board of `rows` x `cols` cells
///
/// Owned by the game state and mutated only from the server loop, so no
/// locking happens here.
#[derive(Debug, Clone)]
pub struct WorldGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Option<Occupant>>,
    creatures: HashMap<Coord, String>,
    players: HashMap<Coord, String>,
    positions: HashMap<String, Coord>,
}

impl WorldGrid {
    /// Creates an empty board
    ///
    /// All cells start unoccupied and both indices start empty.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
            creatures: HashMap::new(),
            players: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns true if `coord` addresses a cell on this board
    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.row < self.rows && coord.col < self.cols
    }

    fn index(&self, coord: Coord) -> Result<usize, GridError> {
        if self.in_bounds(coord) {
            Ok(coord.row * self.cols + coord.col)
        } else {
            Err(GridError::OutOfBounds(coord))
        }
    }

    /// Returns the occupant of `coord`
    ///
    /// Off-board coordinates read as empty rather than failing.
    pub fn lookup_at(&self, coord: Coord) -> Option<&Occupant> {
        let idx = self.index(coord).ok()?;
        self.cells[idx].as_ref()
    }

    /// Finds the cell a player identity stands on, if it is placed
    pub fn locate(&self, identity: &str) -> Option<Coord> {
        self.positions.get(identity).copied()
    }

    /// Places `occupant` on an empty cell
    ///
    /// Fails if the cell is off the board or occupied, or if a player
    /// identity is already placed elsewhere. Creatures go into the creature
    /// index and players into the coordinate and identity indices.
    pub fn place(&mut self, occupant: Occupant, coord: Coord) -> Result<(), GridError> {
        let idx = self.index(coord)?;
        if self.cells[idx].is_some() {
            return Err(GridError::Occupied(coord));
        }
        match &occupant {
            Occupant::Creature { id, .. } => {
                self.creatures.insert(coord, id.clone());
            }
            Occupant::Player(identity) => {
                if self.positions.contains_key(identity) {
                    return Err(GridError::AlreadyPlaced(identity.clone()));
                }
                self.players.insert(coord, identity.clone());
                self.positions.insert(identity.clone(), coord);
            }
        }
        self.cells[idx] = Some(occupant);
        Ok(())
    }

    /// Empties a cell and returns what was on it
    ///
    /// Clearing an empty or out-of-bounds cell is a no-op returning None,
    /// so repeated clears of the same cell are harmless.
    pub fn clear(&mut self, coord: Coord) -> Option<Occupant> {
        let idx = self.index(coord).ok()?;
        let occupant = self.cells[idx].take()?;
        match &occupant {
            Occupant::Creature { .. } => {
                self.creatures.remove(&coord);
            }
            Occupant::Player(identity) => {
                self.players.remove(&coord);
                self.positions.remove(identity);
            }
        }
        Some(occupant)
    }

    /// Clears `coord` only if it still holds the creature from `spawn`
    ///
    /// Returns false when the creature was already caught or replaced by a
    /// later spawn, leaving the cell untouched.
    pub fn clear_creature(&mut self, coord: Coord, spawn: SpawnId) -> bool {
        match self.lookup_at(coord) {
            Some(Occupant::Creature { spawn: current, .. }) if *current == spawn => {
                self.clear(coord);
                true
            }
            _ => false,
        }
    }

    /// Moves a placed identity to an empty cell, returning its old coordinate.
    ///
    /// Fails without side effects when the target is occupied or off the board.
    pub fn move_identity(&mut self, identity: &str, to: Coord) -> Result<Coord, GridError> {
        let from = self
            .locate(identity)
            .ok_or_else(|| GridError::NotPlaced(identity.to_string()))?;
        let to_idx = self.index(to)?;
        if self.cells[to_idx].is_some() {
            return Err(GridError::Occupied(to));
        }
        self.clear(from);
        self.place(Occupant::Player(identity.to_string()), to)?;
        Ok(from)
    }

    /// Takes a player off the board, returning the cell it vacated
    pub fn remove_identity(&mut self, identity: &str) -> Option<Coord> {
        let coord = self.locate(identity)?;
        self.clear(coord);
        Some(coord)
    }

    /// Lists every unoccupied cell in row-major order
    pub fn empty_cells(&self) -> Vec<Coord> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| Coord::new(row, col)))
            .filter(|coord| self.lookup_at(*coord).is_none())
            .collect()
    }

    /// Picks a uniformly random unoccupied cell, or None if the board is full
    pub fn random_empty_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Coord> {
        self.empty_cells().choose(rng).copied()
    }

    /// Places `identity` on a uniformly random empty cell
    ///
    /// Used at login. Fails with `GridError::Full` when no cell is free.
    pub fn place_randomly<R: Rng + ?Sized>(
        &mut self,
        identity: &str,
        rng: &mut R,
    ) -> Result<Coord, GridError> {
        let coord = self.random_empty_cell(rng).ok_or(GridError::Full)?;
        self.place(Occupant::Player(identity.to_string()), coord)?;
        Ok(coord)
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// `{"row-col": creatureId}` for every creature on the board.
    pub fn creature_snapshot(&self) -> Document {
        self.creatures
            .iter()
            .map(|(coord, id)| (coord.to_string(), id.clone()))
            .collect()
    }

    /// `{"row-col": identity}` for every player on the board.
    pub fn player_snapshot(&self) -> Document {
        self.players
            .iter()
            .map(|(coord, identity)| (coord.to_string(), identity.clone()))
            .collect()
    }

    /// Verifies that cells and both indices describe the same occupancy.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut creature_cells = 0;
        let mut player_cells = 0;

        for row in 0..self.rows {
            for col in 0..self.cols {
                let coord = Coord::new(row, col);
                match &self.cells[row * self.cols + col] {
                    None => {
                        if self.creatures.contains_key(&coord) || self.players.contains_key(&coord) {
                            return Err(format!("empty cell {} is indexed", coord));
                        }
                    }
                    Some(Occupant::Creature { id, .. }) => {
                        creature_cells += 1;
                        if self.creatures.get(&coord) != Some(id) {
                            return Err(format!("creature at {} missing from index", coord));
                        }
                        if self.players.contains_key(&coord) {
                            return Err(format!("creature cell {} indexed as player", coord));
                        }
                    }
                    Some(Occupant::Player(identity)) => {
                        player_cells += 1;
                        if self.players.get(&coord) != Some(identity) {
                            return Err(format!("player at {} missing from index", coord));
                        }
                        if self.positions.get(identity) != Some(&coord) {
                            return Err(format!("'{}' has a stale position", identity));
                        }
                    }
                }
            }
        }

        if creature_cells != self.creatures.len() {
            return Err("creature index has extra entries".to_string());
        }
        if player_cells != self.players.len() || player_cells != self.positions.len() {
            return Err("player index has extra entries".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn creature(id: &str, spawn: SpawnId) -> Occupant {
        Occupant::Creature {
            id: id.to_string(),
            spawn,
        }
    }

    fn player(identity: &str) -> Occupant {
        Occupant::Player(identity.to_string())
    }

    #[test]
    fn test_place_requires_empty_cell() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(creature("25", 1), Coord::new(1, 1)).unwrap();

        let err = grid.place(player("ash"), Coord::new(1, 1)).unwrap_err();
        assert_eq!(err, GridError::Occupied(Coord::new(1, 1)));
        assert_eq!(grid.locate("ash"), None);
        grid.check_consistency().unwrap();
    }

    #[test]
    fn test_place_out_of_bounds() {
        let mut grid = WorldGrid::new(3, 3);
        assert_eq!(
            grid.place(player("ash"), Coord::new(3, 0)),
            Err(GridError::OutOfBounds(Coord::new(3, 0)))
        );
    }

    #[test]
    fn test_identity_placed_once() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(player("ash"), Coord::new(0, 0)).unwrap();
        assert_eq!(
            grid.place(player("ash"), Coord::new(0, 1)),
            Err(GridError::AlreadyPlaced("ash".to_string()))
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(creature("7", 1), Coord::new(2, 2)).unwrap();

        assert_eq!(grid.clear(Coord::new(2, 2)), Some(creature("7", 1)));
        assert_eq!(grid.clear(Coord::new(2, 2)), None);
        assert_eq!(grid.clear(Coord::new(9, 9)), None);
        assert_eq!(grid.creature_count(), 0);
        grid.check_consistency().unwrap();
    }

    #[test]
    fn test_move_identity_updates_both_cells() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(player("ash"), Coord::new(0, 0)).unwrap();

        let from = grid.move_identity("ash", Coord::new(2, 1)).unwrap();
        assert_eq!(from, Coord::new(0, 0));
        assert_eq!(grid.lookup_at(Coord::new(0, 0)), None);
        assert_eq!(grid.lookup_at(Coord::new(2, 1)), Some(&player("ash")));
        assert_eq!(grid.locate("ash"), Some(Coord::new(2, 1)));
        grid.check_consistency().unwrap();
    }

    #[test]
    fn test_move_into_occupied_cell_changes_nothing() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(player("ash"), Coord::new(0, 0)).unwrap();
        grid.place(player("gary"), Coord::new(0, 1)).unwrap();

        assert!(grid.move_identity("ash", Coord::new(0, 1)).is_err());
        assert_eq!(grid.locate("ash"), Some(Coord::new(0, 0)));
        assert_eq!(grid.locate("gary"), Some(Coord::new(0, 1)));
        grid.check_consistency().unwrap();
    }

    #[test]
    fn test_clear_creature_checks_spawn() {
        let mut grid = WorldGrid::new(2, 2);
        grid.place(creature("1", 10), Coord::new(0, 0)).unwrap();

        assert!(!grid.clear_creature(Coord::new(0, 0), 9));
        assert!(grid.clear_creature(Coord::new(0, 0), 10));
        assert!(!grid.clear_creature(Coord::new(0, 0), 10));
    }

    #[test]
    fn test_snapshots() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(creature("25", 1), Coord::new(1, 2)).unwrap();
        grid.place(player("ash"), Coord::new(0, 0)).unwrap();

        assert_eq!(grid.creature_snapshot(), shared::document("1-2", "25"));
        assert_eq!(grid.player_snapshot(), shared::document("0-0", "ash"));
    }

    #[test]
    fn test_place_randomly_fills_board_then_fails() {
        let mut grid = WorldGrid::new(1, 2);
        let mut rng = StdRng::seed_from_u64(1);
        grid.place_randomly("ash", &mut rng).unwrap();
        grid.place_randomly("gary", &mut rng).unwrap();
        assert_eq!(grid.place_randomly("misty", &mut rng), Err(GridError::Full));
        assert!(grid.empty_cells().is_empty());
    }

    #[test]
    fn test_remove_identity_leaves_others() {
        let mut grid = WorldGrid::new(3, 3);
        grid.place(player("ash"), Coord::new(0, 0)).unwrap();
        grid.place(player("gary"), Coord::new(1, 1)).unwrap();
        grid.place(creature("4", 1), Coord::new(2, 2)).unwrap();

        assert_eq!(grid.remove_identity("ash"), Some(Coord::new(0, 0)));
        assert_eq!(grid.locate("gary"), Some(Coord::new(1, 1)));
        assert_eq!(grid.creature_count(), 1);
        grid.check_consistency().unwrap();
    }

    #[test]
    fn test_random_operation_sequences_stay_consistent() {
        let identities = ["ash", "gary", "misty", "brock"];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut grid = WorldGrid::new(4, 5);
            let mut spawn = 0;

            for _ in 0..300 {
                let coord = Coord::new(rng.gen_range(0..4), rng.gen_range(0..5));
                let identity = identities[rng.gen_range(0..identities.len())];
                match rng.gen_range(0..5) {
                    0 => {
                        spawn += 1;
                        let _ = grid.place(creature("1", spawn), coord);
                    }
                    1 => {
                        let _ = grid.place(player(identity), coord);
                    }
                    2 => {
                        grid.clear(coord);
                    }
                    3 => {
                        let _ = grid.move_identity(identity, coord);
                    }
                    _ => {
                        grid.remove_identity(identity);
                    }
                }
                grid.check_consistency()
                    .unwrap_or_else(|e| panic!("seed {}: {}", seed, e));
            }
        }
    }
}
