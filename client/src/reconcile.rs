//! Reconciliation of server updates into the local session and boards.
//!
//! Poll responses and pushed events both funnel through `Reconciler::reconcile`,
//! which is the single place allowed to mutate `GameData`. Applying the same
//! update twice must leave the state unchanged: snapshots and board updates
//! assign, shot results are deduplicated before they append.

use log::{debug, warn};
use std::collections::HashSet;

use shared::protocol::{
    self, FireResponse, GameStateResponse, ServerEvent, ShotResultData,
};
use shared::{Board, Cell, Coord, Ship};

use crate::session::{now_ms, GameMode, MoveRecord, Phase, SessionState};

/// Everything the engine owns for one live session.
#[derive(Debug, Default)]
pub struct GameData {
    pub session: SessionState,
    pub own_board: Board,
    pub opponent_board: Board,
    pub moves: Vec<MoveRecord>,
}

impl GameData {
    pub fn reset(&mut self) {
        self.session.reset();
        self.own_board = Board::empty();
        self.opponent_board = Board::empty();
        self.moves.clear();
    }
}

/// One inbound unit of server truth.
#[derive(Debug, Clone)]
pub enum Update {
    /// A poll-response snapshot.
    Snapshot(GameStateResponse),
    /// A pushed event, with the server's update counter when present.
    Event {
        event: ServerEvent,
        seq: Option<u64>,
    },
    /// Successful create-session outcome.
    SessionCreated {
        session_id: String,
        player_name: String,
        mode: GameMode,
    },
    /// Successful join-session outcome.
    SessionJoined {
        session_id: String,
        player_name: String,
    },
    /// The response to a self-issued shot, already converted to local
    /// coordinates at the dispatcher boundary.
    FireResult {
        player: String,
        coord: Coord,
        response: FireResponse,
    },
    /// Server-accepted manual placement, mirrored into the own board.
    ShipsPlaced(Vec<Ship>),
}

impl Update {
    fn sequence(&self) -> Option<u64> {
        match self {
            Update::Snapshot(snap) => snap.update_id,
            Update::Event { seq, .. } => *seq,
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    last_seq: Option<u64>,
    seen_shots: HashSet<(String, Coord)>,
}

impl Reconciler {
    pub fn new() -> Self {
        Reconciler::default()
    }

    /// Clears per-session bookkeeping; called whenever the session resets.
    pub fn reset(&mut self) {
        self.last_seq = None;
        self.seen_shots.clear();
    }

    pub fn reconcile(&mut self, data: &mut GameData, update: Update) {
        if let Some(seq) = update.sequence() {
            if self.last_seq.is_some_and(|last| seq <= last) {
                debug!("dropping stale update (seq {seq})");
                return;
            }
            self.last_seq = Some(seq);
        }

        match update {
            Update::Snapshot(snap) => self.apply_snapshot(data, snap),
            Update::Event { event, .. } => self.apply_event(data, event),
            Update::SessionCreated {
                session_id,
                player_name,
                mode,
            } => {
                data.session.mark_created(session_id, player_name, mode);
                match mode {
                    GameMode::Pve => data.session.mark_placement(),
                    GameMode::Pvp => data.session.mark_awaiting_opponent(),
                }
            }
            Update::SessionJoined {
                session_id,
                player_name,
            } => data.session.mark_joined(session_id, player_name),
            Update::FireResult {
                player,
                coord,
                response,
            } => self.apply_fire_result(data, player, coord, response),
            Update::ShipsPlaced(ships) => {
                data.own_board = Board::from_ships(&ships);
            }
        }

        data.session.touch(now_ms());
    }

    fn apply_snapshot(&mut self, data: &mut GameData, snap: GameStateResponse) {
        self.note_opponent(data, snap.player1.as_deref(), snap.player2.as_deref());

        // A missing status or board while waiting is the expected shape for
        // the placement phase, not an error.
        let status = snap.status.as_deref().unwrap_or("WAITING_FOR_PLAYERS");
        if protocol::status_is_terminal(status) {
            data.session.mark_finished(snap.winner.clone());
        } else if protocol::status_is_in_progress(status) {
            data.session.mark_in_progress(snap.current_turn.clone());
        } else {
            if !protocol::status_is_waiting(status) {
                debug!("treating unknown status {status:?} as waiting");
            }
            data.session.mark_placement();
        }

        if let Some(raw) = &snap.player_board {
            match Board::from_server(raw, true) {
                Ok(board) => data.own_board = board,
                Err(e) => warn!("keeping previous own board: {e}"),
            }
        }
    }

    fn apply_event(&mut self, data: &mut GameData, event: ServerEvent) {
        match event {
            ServerEvent::GameStateUpdate(snap) => self.apply_snapshot(data, snap),
            ServerEvent::BoardUpdate(update) => {
                let own = data.session.player_name.as_deref() == Some(update.player_name.as_str());
                // The opponent layout stays hidden until the game is over.
                let reveal = own || data.session.phase() == Phase::Finished;
                match Board::from_server(&update.board, reveal) {
                    Ok(board) => {
                        if own {
                            data.own_board = board;
                        } else {
                            data.opponent_board = board;
                        }
                    }
                    Err(e) => warn!("ignoring malformed board update: {e}"),
                }
            }
            ServerEvent::ShotResult(shot) => self.apply_shot(data, shot),
            ServerEvent::TurnChange(turn) => data.session.set_turn_owner(Some(turn.player)),
            ServerEvent::GameEnd(end) => {
                data.session.mark_finished(Some(end.winner));
                if data.session.phase() == Phase::Finished {
                    if let Some(raw) = end.final_board {
                        // Server-confirmed end-of-game reveal of the opponent
                        // layout, the one case where ships may surface there.
                        match Board::from_server(&raw, true) {
                            Ok(board) => data.opponent_board = board,
                            Err(e) => warn!("ignoring malformed final board: {e}"),
                        }
                    }
                }
            }
        }
    }

    fn apply_shot(&mut self, data: &mut GameData, shot: ShotResultData) {
        let coord = Coord::new(shot.row, shot.col);
        if !coord.in_bounds() {
            warn!("ignoring shot result outside the board: {:?}", coord);
            return;
        }
        // The server never accepts firing at the same cell twice, so
        // (actor, coordinate) identifies a shot across both channels.
        if !self.seen_shots.insert((shot.player.clone(), coord)) {
            debug!("duplicate shot result for {:?} ignored", coord);
            return;
        }

        let own_shot = data.session.player_name.as_deref() == Some(shot.player.as_str());
        let cell = if shot.hit { Cell::Hit } else { Cell::Miss };
        let target = if own_shot {
            &mut data.opponent_board
        } else {
            &mut data.own_board
        };
        if let Err(e) = target.set(coord, cell) {
            warn!("shot result not applied: {e}");
        }

        data.moves.push(MoveRecord {
            player: shot.player,
            coord,
            hit: shot.hit,
            timestamp_ms: shot.timestamp.unwrap_or_else(now_ms),
        });
    }

    fn apply_fire_result(
        &mut self,
        data: &mut GameData,
        player: String,
        coord: Coord,
        response: FireResponse,
    ) {
        self.apply_shot(
            data,
            ShotResultData {
                player,
                row: coord.row,
                col: coord.col,
                hit: response.hit,
                timestamp: None,
            },
        );
        if let Some(raw) = response.opponent_board {
            match Board::from_server(&raw, false) {
                Ok(board) => data.opponent_board = board,
                Err(e) => warn!("keeping previous opponent board: {e}"),
            }
        }
    }

    fn note_opponent(&self, data: &mut GameData, player1: Option<&str>, player2: Option<&str>) {
        let me = match data.session.player_name.as_deref() {
            Some(name) => name,
            None => return,
        };
        let opponent = [player1, player2]
            .into_iter()
            .flatten()
            .find(|name| *name != me);
        data.session.set_opponent(opponent.map(str::to_string));
    }
}
