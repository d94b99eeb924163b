use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

mod codec;

pub use codec::DocumentDecoder;

pub const DEFAULT_ROWS: usize = 10;
pub const DEFAULT_COLS: usize = 18;
pub const ROSTER_SIZE: usize = 3;
/// Longest client line (credentials or command) the server will buffer
pub const MAX_LINE_BYTES: usize = 1024;

pub const AUTH_SUCCESS: &str = "successful";
pub const AUTH_FAILED: &str = "failed";
pub const BATTLE_KEY: &str = "battle";
pub const QUIT: &str = "quit";

/// A server-to-client message: a flat string-to-string JSON object.
pub type Document = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("malformed coordinate '{0}'")]
    BadCoord(String),
    #[error("malformed command '{0}'")]
    BadCommand(String),
    #[error("unknown battle action '{0}'")]
    BadAction(String),
    #[error("malformed document: {0}")]
    BadDocument(String),
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("line longer than {0} bytes")]
    LineTooLong(usize),
}

/// Grid coordinate, written on the wire as `row-col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

impl FromStr for Coord {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ProtocolError::BadCoord(s.to_string());
        let (row, col) = s.trim().split_once('-').ok_or_else(bad)?;
        let row = row.parse().map_err(|_| bad())?;
        let col = col.parse().map_err(|_| bad())?;
        Ok(Coord { row, col })
    }
}

/// Catalog entry for a creature species.
///
/// Field names and the string-valued `stats` map follow the catalog file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub stats: BTreeMap<String, String>,
    #[serde(rename = "exp", default)]
    pub experience: String,
}

impl CreatureTemplate {
    /// Numeric value of a stat such as `HP` or `Speed`.
    pub fn stat(&self, name: &str) -> Option<i64> {
        self.stats.get(name).and_then(|v| v.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleAction {
    Attack { slot: usize },
    Switch { slot: usize },
}

impl fmt::Display for BattleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BattleAction::Attack { slot } => write!(f, "{}*attack", slot),
            BattleAction::Switch { slot } => write!(f, "{}*switch", slot),
        }
    }
}

impl FromStr for BattleAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slot, action) = s
            .split_once('*')
            .ok_or_else(|| ProtocolError::BadAction(s.to_string()))?;
        let slot = slot
            .trim()
            .parse()
            .map_err(|_| ProtocolError::BadAction(s.to_string()))?;
        match action.trim() {
            "attack" => Ok(BattleAction::Attack { slot }),
            "switch" => Ok(BattleAction::Switch { slot }),
            _ => Err(ProtocolError::BadAction(s.to_string())),
        }
    }
}

/// Client-to-server command, one per line after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Coord),
    SubmitCreature { identity: String, creature_id: String },
    Battle { identity: String, action: BattleAction },
    Surrender { identity: String },
}

impl Command {
    /// Identity the client claims to act as, if the command names one.
    pub fn claimed_identity(&self) -> Option<&str> {
        match self {
            Command::Move(_) => None,
            Command::SubmitCreature { identity, .. }
            | Command::Battle { identity, .. }
            | Command::Surrender { identity } => Some(identity),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        if let Some(rest) = line.strip_prefix("battle-") {
            // Payloads never contain '-', so the identity is everything before the last one.
            let (identity, payload) = rest
                .rsplit_once('-')
                .ok_or_else(|| ProtocolError::BadCommand(line.to_string()))?;
            if identity.is_empty() || payload.is_empty() {
                return Err(ProtocolError::BadCommand(line.to_string()));
            }
            let identity = identity.to_string();
            if payload.contains('*') {
                let action = payload.parse()?;
                return Ok(Command::Battle { identity, action });
            }
            if payload.chars().all(|c| c.is_ascii_digit()) {
                return Ok(Command::SubmitCreature {
                    identity,
                    creature_id: payload.to_string(),
                });
            }
            return Err(ProtocolError::BadCommand(line.to_string()));
        }

        if let Some(identity) = line.strip_prefix("surrender-") {
            if identity.is_empty() {
                return Err(ProtocolError::BadCommand(line.to_string()));
            }
            return Ok(Command::Surrender {
                identity: identity.to_string(),
            });
        }

        line.parse().map(Command::Move)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move(coord) => write!(f, "{}", coord),
            Command::SubmitCreature {
                identity,
                creature_id,
            } => write!(f, "battle-{}-{}", identity, creature_id),
            Command::Battle { identity, action } => write!(f, "battle-{}-{}", identity, action),
            Command::Surrender { identity } => write!(f, "surrender-{}", identity),
        }
    }
}

/// Value carried under the `battle` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleNotice {
    /// A battle against the named identity has started.
    Opponent(String),
    Wait,
    /// The named identity (the receiver) owns the turn.
    Turn(String),
    Attacked { hp: i64, damage: i64, slot: usize },
    Victory(String),
}

impl BattleNotice {
    pub fn encode(&self) -> String {
        match self {
            BattleNotice::Opponent(identity) | BattleNotice::Turn(identity) => identity.clone(),
            BattleNotice::Wait => "wait".to_string(),
            BattleNotice::Attacked { hp, damage, slot } => {
                format!("attacked-{}-{}-{}", hp, damage, slot)
            }
            BattleNotice::Victory(winner) => format!("victory_{}", winner),
        }
    }

    /// Decodes a notice as seen by `receiver`.
    ///
    /// An identity value is a turn grant when it names the receiver and a
    /// battle start otherwise.
    pub fn parse(value: &str, receiver: &str) -> Result<Self, ProtocolError> {
        if value == "wait" {
            return Ok(BattleNotice::Wait);
        }
        if let Some(winner) = value.strip_prefix("victory_") {
            return Ok(BattleNotice::Victory(winner.to_string()));
        }
        if let Some(rest) = value.strip_prefix("attacked-") {
            let bad = || ProtocolError::BadDocument(value.to_string());
            let mut parts = rest.split('-');
            let hp = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
            let damage = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
            let slot = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
            return Ok(BattleNotice::Attacked { hp, damage, slot });
        }
        if value == receiver {
            Ok(BattleNotice::Turn(value.to_string()))
        } else {
            Ok(BattleNotice::Opponent(value.to_string()))
        }
    }

    pub fn to_document(&self) -> Document {
        Document::from([(BATTLE_KEY.to_string(), self.encode())])
    }
}

/// Single-entry document mapping `key` to `value`.
pub fn document(key: impl Into<String>, value: impl Into<String>) -> Document {
    Document::from([(key.into(), value.into())])
}

pub fn encode_document(doc: &Document) -> String {
    // A string-to-string map always serializes.
    serde_json::to_string(doc).unwrap_or_else(|_| "{}".to_string())
}
