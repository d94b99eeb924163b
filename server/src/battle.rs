//! Turn-based battles between two connected players.
//!
//! Every battle is an independent [`BattleSession`] keyed by the unordered
//! pair of participants, so any number of disjoint pairs can fight at once.
//! The engine never talks to sockets: each operation returns the notices to
//! deliver, in order, and the caller routes them.
//!
//! Lifecycle: roster selection (each side submits exactly three creatures),
//! then alternating turns until a roster is empty or someone surrenders.
//! A concluded session is dropped immediately.

use log::info;
use shared::{BattleAction, BattleNotice, CreatureTemplate, ROSTER_SIZE};
use std::collections::HashMap;

/// Damage multiplier applied to the attacker's Attack stat.
pub const DEFAULT_DAMAGE_MULTIPLIER: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BattleError {
    #[error("'{0}' is not in a battle")]
    NotInBattle(String),
    #[error("'{0}' is already in a battle")]
    AlreadyInBattle(String),
    #[error("cannot battle yourself")]
    SelfBattle,
    #[error("roster already holds {ROSTER_SIZE} creatures")]
    RosterFull,
    #[error("rosters are still being chosen")]
    NotStarted,
    #[error("roster selection is over")]
    SelectionClosed,
    #[error("not your turn")]
    NotYourTurn,
    #[error("no creature in slot {0}")]
    InvalidSlot(usize),
    #[error("unknown creature '{0}'")]
    UnknownCreature(String),
    #[error("'{identity}' does not own another '{creature_id}'")]
    NotOwned {
        identity: String,
        creature_id: String,
    },
}

/// A notice addressed to one participant.
pub type Notice = (String, BattleNotice);

/// Battle copy of a creature with its current HP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combatant {
    pub creature_id: String,
    pub name: String,
    pub hp: i64,
    pub attack: i64,
    pub defense: i64,
    pub speed: i64,
}

impl Combatant {
    /// Returns `None` if the template lacks a numeric combat stat.
    pub fn from_template(template: &CreatureTemplate) -> Option<Self> {
        Some(Self {
            creature_id: template.id.clone(),
            name: template.name.clone(),
            hp: template.stat("HP")?,
            attack: template.stat("Attack")?,
            defense: template.stat("Defense")?,
            speed: template.stat("Speed")?,
        })
    }
}

/// floor(attack × multiplier − defense), never below 1.
pub fn damage(attack: i64, defense: i64, multiplier: f64) -> i64 {
    let raw = (attack as f64 * multiplier - defense as f64).floor() as i64;
    raw.max(1)
}

/// Stage of a battle session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RosterSelection,
    InProgress,
}

/// One participant's half of a battle
///
/// `active` indexes the creature currently facing the opponent. Fainted
/// creatures are removed from `roster`, so slots shift down after a knockout.
#[derive(Debug, Clone)]
pub struct Side {
    pub identity: String,
    pub roster: Vec<Combatant>,
    pub active: usize,
}

impl Side {
    fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            roster: Vec::with_capacity(ROSTER_SIZE),
            active: 0,
        }
    }
}

/// Unordered pair of participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey(a.to_string(), b.to_string())
        } else {
            PairKey(b.to_string(), a.to_string())
        }
    }
}

/// State of a single battle between two players
#[derive(Debug, Clone)]
pub struct BattleSession {
    /// `sides[0]` is the initiator.
    sides: [Side; 2],
    phase: Phase,
    turn: usize,
}

impl BattleSession {
    fn new(initiator: &str, opponent: &str) -> Self {
        Self {
            sides: [Side::new(initiator), Side::new(opponent)],
            phase: Phase::RosterSelection,
            turn: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn initiator(&self) -> &str {
        &self.sides[0].identity
    }

    pub fn side(&self, identity: &str) -> Option<&Side> {
        self.sides.iter().find(|s| s.identity == identity)
    }

    /// Identity owning the turn, once the battle is in progress.
    pub fn turn_owner(&self) -> Option<&str> {
        match self.phase {
            Phase::InProgress => Some(&self.sides[self.turn].identity),
            Phase::RosterSelection => None,
        }
    }

    fn index_of(&self, identity: &str) -> usize {
        if self.sides[0].identity == identity {
            0
        } else {
            1
        }
    }

    fn submit(&mut self, identity: &str, combatant: Combatant) -> Result<Vec<Notice>, BattleError> {
        if self.phase != Phase::RosterSelection {
            return Err(BattleError::SelectionClosed);
        }
        let side = &mut self.sides[self.index_of(identity)];
        if side.roster.len() >= ROSTER_SIZE {
            return Err(BattleError::RosterFull);
        }
        side.roster.push(combatant);

        if self.sides.iter().all(|s| s.roster.len() == ROSTER_SIZE) {
            return Ok(self.begin());
        }
        Ok(Vec::new())
    }

    /// Faster slot-0 creature moves first; ties go to the initiator.
    fn begin(&mut self) -> Vec<Notice> {
        self.phase = Phase::InProgress;
        let initiator_speed = self.sides[0].roster[0].speed;
        let opponent_speed = self.sides[1].roster[0].speed;
        self.turn = if initiator_speed >= opponent_speed { 0 } else { 1 };

        let first = self.sides[self.turn].identity.clone();
        let second = self.sides[1 - self.turn].identity.clone();
        info!("Battle {} vs {} begins, {} moves first", self.sides[0].identity, self.sides[1].identity, first);
        vec![
            (first.clone(), BattleNotice::Turn(first)),
            (second, BattleNotice::Wait),
        ]
    }

    fn check_turn(&self, identity: &str) -> Result<usize, BattleError> {
        if self.phase != Phase::InProgress {
            return Err(BattleError::NotStarted);
        }
        let index = self.index_of(identity);
        if index != self.turn {
            return Err(BattleError::NotYourTurn);
        }
        Ok(index)
    }

    /// Applies one action. Returns the notices and the winner, if the battle ended.
    fn act(
        &mut self,
        identity: &str,
        action: BattleAction,
        multiplier: f64,
    ) -> Result<(Vec<Notice>, Option<String>), BattleError> {
        let attacker = self.check_turn(identity)?;
        let defender = 1 - attacker;

        match action {
            BattleAction::Switch { slot } => {
                let side = &mut self.sides[attacker];
                if slot >= side.roster.len() {
                    return Err(BattleError::InvalidSlot(slot));
                }
                side.active = slot;
                // switching keeps the turn
                Ok((Vec::new(), None))
            }
            BattleAction::Attack { slot } => {
                if slot >= self.sides[attacker].roster.len() {
                    return Err(BattleError::InvalidSlot(slot));
                }
                self.sides[attacker].active = slot;
                let attack = self.sides[attacker].roster[slot].attack;

                let def_side = &mut self.sides[defender];
                if def_side.active >= def_side.roster.len() {
                    def_side.active = 0;
                }
                let target = def_side.active;
                let dealt = damage(attack, def_side.roster[target].defense, multiplier);
                let remaining = def_side.roster[target].hp - dealt;

                let reported_hp = if remaining <= 0 {
                    def_side.roster.remove(target);
                    if def_side.active >= def_side.roster.len() {
                        def_side.active = 0;
                    }
                    0
                } else {
                    def_side.roster[target].hp = remaining;
                    remaining
                };

                let attacker_id = self.sides[attacker].identity.clone();
                let defender_id = self.sides[defender].identity.clone();
                let mut notices = vec![(
                    defender_id.clone(),
                    BattleNotice::Attacked {
                        hp: reported_hp,
                        damage: dealt,
                        slot: target,
                    },
                )];

                if self.sides[defender].roster.is_empty() {
                    notices.extend(self.victory(&attacker_id));
                    return Ok((notices, Some(attacker_id)));
                }

                self.turn = defender;
                notices.push((attacker_id, BattleNotice::Wait));
                notices.push((defender_id.clone(), BattleNotice::Turn(defender_id)));
                Ok((notices, None))
            }
        }
    }

    fn victory(&self, winner: &str) -> Vec<Notice> {
        self.sides
            .iter()
            .map(|s| (s.identity.clone(), BattleNotice::Victory(winner.to_string())))
            .collect()
    }

    fn opponent_of(&self, identity: &str) -> &str {
        &self.sides[1 - self.index_of(identity)].identity
    }
}

/// All active battles, keyed by participant pair.
#[derive(Debug)]
pub struct BattleEngine {
    sessions: HashMap<PairKey, BattleSession>,
    participants: HashMap<String, PairKey>,
    multiplier: f64,
}

impl Default for BattleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DAMAGE_MULTIPLIER)
    }
}

impl BattleEngine {
    /// Creates an engine with no active battles
    ///
    /// `multiplier` scales the attacker's Attack stat in the damage rule.
    pub fn new(multiplier: f64) -> Self {
        Self {
            sessions: HashMap::new(),
            participants: HashMap::new(),
            multiplier,
        }
    }

    /// Returns true if `identity` is in a battle, in either phase
    pub fn is_battling(&self, identity: &str) -> bool {
        self.participants.contains_key(identity)
    }

    /// Looks up the battle `identity` takes part in
    pub fn session_of(&self, identity: &str) -> Option<&BattleSession> {
        let key = self.participants.get(identity)?;
        self.sessions.get(key)
    }

    pub fn active_battles(&self) -> usize {
        self.sessions.len()
    }

    /// How many copies of `creature_id` the participant has already submitted.
    pub fn submitted_count(&self, identity: &str, creature_id: &str) -> usize {
        self.session_of(identity)
            .and_then(|s| s.side(identity))
            .map(|side| {
                side.roster
                    .iter()
                    .filter(|c| c.creature_id == creature_id)
                    .count()
            })
            .unwrap_or(0)
    }

    fn session_mut(&mut self, identity: &str) -> Result<&mut BattleSession, BattleError> {
        let key = self
            .participants
            .get(identity)
            .ok_or_else(|| BattleError::NotInBattle(identity.to_string()))?;
        self.sessions
            .get_mut(key)
            .ok_or_else(|| BattleError::NotInBattle(identity.to_string()))
    }

    /// Opens a battle between `initiator` and `opponent`
    ///
    /// Both must be free of other battles and distinct. The new session
    /// starts in roster selection and each side is told who it faces.
    /// The initiator keeps the turn on speed ties once the battle begins.
    pub fn start(&mut self, initiator: &str, opponent: &str) -> Result<Vec<Notice>, BattleError> {
        if initiator == opponent {
            return Err(BattleError::SelfBattle);
        }
        for identity in [initiator, opponent] {
            if self.is_battling(identity) {
                return Err(BattleError::AlreadyInBattle(identity.to_string()));
            }
        }

        let key = PairKey::new(initiator, opponent);
        self.sessions
            .insert(key.clone(), BattleSession::new(initiator, opponent));
        self.participants.insert(initiator.to_string(), key.clone());
        self.participants.insert(opponent.to_string(), key);
        info!("Battle initiated: {} vs {}", initiator, opponent);

        Ok(vec![
            (
                initiator.to_string(),
                BattleNotice::Opponent(opponent.to_string()),
            ),
            (
                opponent.to_string(),
                BattleNotice::Opponent(initiator.to_string()),
            ),
        ])
    }

    /// Adds a creature to the participant's roster
    ///
    /// Each side submits exactly `ROSTER_SIZE` creatures. When the last one
    /// lands the battle moves to in-progress and the notices announce whose
    /// turn it is; until then no notices are produced.
    pub fn submit(&mut self, identity: &str, combatant: Combatant) -> Result<Vec<Notice>, BattleError> {
        self.session_mut(identity)?.submit(identity, combatant)
    }

    /// Applies an attack or switch for the participant holding the turn
    ///
    /// A switch only changes the active slot and keeps the turn. An attack
    /// damages the opponent's active creature, removes it if its HP drops to
    /// zero, and passes the turn. Knocking out the last creature ends the
    /// battle and both sides receive the victory notice.
    pub fn act(&mut self, identity: &str, action: BattleAction) -> Result<Vec<Notice>, BattleError> {
        let multiplier = self.multiplier;
        let (notices, winner) = self.session_mut(identity)?.act(identity, action, multiplier)?;
        if let Some(winner) = winner {
            info!("{} won the battle", winner);
            self.conclude(identity);
        }
        Ok(notices)
    }

    /// Concedes the battle to the opponent
    ///
    /// Allowed in either phase, regardless of whose turn it is.
    pub fn surrender(&mut self, identity: &str) -> Result<Vec<Notice>, BattleError> {
        let session = self.session_mut(identity)?;
        let winner = session.opponent_of(identity).to_string();
        let notices = session.victory(&winner);
        info!("{} surrendered to {}", identity, winner);
        self.conclude(identity);
        Ok(notices)
    }

    /// Ends any battle `identity` is in, awarding it to the opponent.
    pub fn forfeit(&mut self, identity: &str) -> Vec<Notice> {
        self.surrender(identity).unwrap_or_default()
    }

    fn conclude(&mut self, identity: &str) {
        if let Some(key) = self.participants.get(identity).cloned() {
            self.participants.remove(&key.0);
            self.participants.remove(&key.1);
            self.sessions.remove(&key);
        }
    }
}
