//! Session aggregate and the phase state machine.
//!
//! All mutation goes through the `mark_*` methods so the phase invariants
//! hold no matter which channel (poll or push) an update arrived on. The
//! reconciler is the only caller outside of tests.

use log::warn;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use shared::Coord;

/// Lifecycle of one game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Created,
    AwaitingOpponent,
    Placement,
    InProgress,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "Idle",
            Phase::Created => "Created",
            Phase::AwaitingOpponent => "AwaitingOpponent",
            Phase::Placement => "Placement",
            Phase::InProgress => "InProgress",
            Phase::Finished => "Finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Pve,
    Pvp,
}

impl GameMode {
    pub fn as_server_tag(&self) -> &'static str {
        match self {
            GameMode::Pve => "PVE",
            GameMode::Pvp => "PVP",
        }
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PVE" => Ok(GameMode::Pve),
            "PVP" => Ok(GameMode::Pvp),
            other => Err(format!("unknown game mode: {other}")),
        }
    }
}

/// One fired shot, kept for local history display. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub player: String,
    pub coord: Coord,
    pub hit: bool,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub player_name: Option<String>,
    pub opponent_name: Option<String>,
    pub mode: Option<GameMode>,
    phase: Phase,
    turn_owner: Option<String>,
    winner: Option<String>,
    /// Last time any server update was applied, unix millis.
    pub last_update_ms: u64,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn_owner(&self) -> Option<&str> {
        self.turn_owner.as_deref()
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// True when the local player owns the current turn.
    pub fn is_my_turn(&self) -> bool {
        self.phase == Phase::InProgress
            && self.turn_owner.is_some()
            && self.turn_owner == self.player_name
    }

    pub fn mark_created(&mut self, session_id: String, player_name: String, mode: GameMode) {
        if self.advance(Phase::Created) {
            self.session_id = Some(session_id);
            self.player_name = Some(player_name);
            self.mode = Some(mode);
        }
    }

    pub fn mark_joined(&mut self, session_id: String, player_name: String) {
        if self.advance(Phase::Created) {
            self.session_id = Some(session_id);
            self.player_name = Some(player_name);
            self.mode = Some(GameMode::Pvp);
        }
    }

    pub fn mark_awaiting_opponent(&mut self) {
        self.advance(Phase::AwaitingOpponent);
    }

    pub fn mark_placement(&mut self) {
        self.advance(Phase::Placement);
    }

    pub fn mark_in_progress(&mut self, turn_owner: Option<String>) {
        if self.advance(Phase::InProgress) {
            self.turn_owner = turn_owner;
        }
    }

    pub fn mark_finished(&mut self, winner: Option<String>) {
        if self.advance(Phase::Finished) {
            self.winner = winner;
            self.turn_owner = None;
        }
    }

    /// Turn changes do not alter the phase.
    pub fn set_turn_owner(&mut self, owner: Option<String>) {
        if self.phase == Phase::Finished {
            warn!("ignoring turn change after the game finished");
            return;
        }
        self.turn_owner = owner;
    }

    pub fn set_opponent(&mut self, opponent: Option<String>) {
        if opponent.is_some() {
            self.opponent_name = opponent;
        }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_update_ms = now_ms;
    }

    pub fn reset(&mut self) {
        *self = SessionState::default();
    }

    /// Applies a phase transition if the state machine allows it; anything
    /// else is an anomaly that gets logged and ignored, not a failure.
    fn advance(&mut self, next: Phase) -> bool {
        use Phase::*;
        let allowed = match (self.phase, next) {
            (Idle, Created) => true,
            (Created, AwaitingOpponent) => true,
            (Created | AwaitingOpponent, Placement) => true,
            // A joiner can see IN_PROGRESS before it ever polled a waiting
            // snapshot, so InProgress is reachable from every pre-game phase.
            (Created | AwaitingOpponent | Placement, InProgress) => true,
            (Created | AwaitingOpponent | Placement | InProgress, Finished) => true,
            // Repeated snapshots of the same phase are routine, not anomalies.
            (current, next) if current == next && current != Finished && current != Idle => true,
            _ => false,
        };
        if allowed {
            self.phase = next;
        } else if self.phase == next {
            // Finished -> Finished: a duplicate end signal changes nothing.
        } else {
            warn!(
                "ignoring phase transition {} -> {} (not allowed)",
                self.phase, next
            );
        }
        allowed
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
