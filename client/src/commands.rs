//! Player-initiated commands and failure classification.
//!
//! Every action validates its local preconditions before touching the
//! network, converts coordinates to wire space exactly once, and feeds the
//! server's answer back through the reconciler. Failures are classified here,
//! at the boundary, so callers only ever see typed `ClientError`s.

use log::{debug, info};
use std::time::Duration;
use thiserror::Error;

use shared::protocol::{FireResponse, GameStateResponse, ReadyResponse, SessionCreated, WireShip};
use shared::{BoardError, Coord, Ship, WireCoord, BOARD_SIZE};

use crate::notify::{NotificationQueue, Severity};
use crate::reconcile::{GameData, Reconciler, Update};
use crate::session::{GameMode, Phase};
use crate::transport::{GameTransport, TransportError};

/// Bounded deadline for every outbound call, matching the original client's
/// 10 second HTTP timeout.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    /// Action attempted with no session or player identity at all.
    #[error("no active game session")]
    NoActiveSession,
    /// The current phase does not allow the action.
    #[error("action not allowed in the current phase: {0}")]
    InvalidSessionState(String),
    /// Malformed local input, rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The server explicitly refused the action.
    #[error("rejected by server ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Outcome of `mark_ready`. `Degraded` means the server has no ready
/// endpoint and the client advanced the phase locally as a best effort.
#[derive(Debug)]
pub enum ReadyOutcome {
    Confirmed(ReadyResponse),
    Degraded,
}

/// A 4xx refusal is the server rejecting the action; everything else is a
/// transport-level failure.
fn classify(err: TransportError) -> ClientError {
    match err {
        TransportError::Status { status, message } if (400..500).contains(&status) => {
            ClientError::Rejected {
                status,
                reason: message,
            }
        }
        other => ClientError::Transport(other),
    }
}

fn is_not_found_class(err: &TransportError) -> bool {
    matches!(err, TransportError::Status { status, .. } if *status == 404 || *status == 405)
}

/// The legacy server reports "board is null" over HTTP 400 while the session
/// is still placing ships; that is a phase signal, not an error.
fn is_board_pending(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::Status { status, message } if *status == 400 && message.contains("board is null")
    )
}

fn notify_failure(notes: &mut NotificationQueue, err: &ClientError, fallback: &str) {
    match err {
        ClientError::Rejected { reason, .. } if !reason.is_empty() => {
            notes.push(reason.clone(), Severity::Error);
        }
        _ => {
            notes.push(fallback.to_string(), Severity::Error);
        }
    }
}

pub struct CommandDispatcher<T> {
    transport: T,
    timeout: Duration,
}

impl<T: GameTransport> CommandDispatcher<T> {
    pub fn new(transport: T) -> Self {
        CommandDispatcher {
            transport,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<R>(
        &self,
        call: impl std::future::Future<Output = Result<R, TransportError>>,
    ) -> Result<R, TransportError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn require_identity(data: &GameData) -> Result<(String, String), ClientError> {
        match (&data.session.session_id, &data.session.player_name) {
            (Some(session), Some(player)) => Ok((session.clone(), player.clone())),
            _ => Err(ClientError::NoActiveSession),
        }
    }

    pub async fn create(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
        player_name: &str,
        mode: GameMode,
    ) -> Result<SessionCreated, ClientError> {
        if player_name.trim().is_empty() {
            notes.push("player name is not set", Severity::Error);
            return Err(ClientError::InvalidInput("player name is empty".to_string()));
        }

        let resp = match self
            .bounded(self.transport.create_session(player_name, mode.as_server_tag()))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let err = classify(e);
                notify_failure(notes, &err, "failed to create the game");
                return Err(err);
            }
        };

        let session_id = match resp.any_session_id() {
            Some(id) => id.to_string(),
            None => {
                let err = ClientError::Transport(TransportError::Decode(
                    "create response carries no session id".to_string(),
                ));
                notify_failure(notes, &err, "failed to create the game");
                return Err(err);
            }
        };

        rec.reconcile(
            data,
            Update::SessionCreated {
                session_id,
                player_name: player_name.to_string(),
                mode,
            },
        );
        notes.push("game created, place your ships", Severity::Success);
        Ok(resp)
    }

    pub async fn join(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
        session_id: &str,
        player_name: &str,
    ) -> Result<SessionCreated, ClientError> {
        if session_id.trim().is_empty() || player_name.trim().is_empty() {
            notes.push("session id and player name are required", Severity::Error);
            return Err(ClientError::InvalidInput(
                "session id and player name are required".to_string(),
            ));
        }

        let resp = match self
            .bounded(self.transport.join_session(session_id, player_name))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let err = classify(e);
                notify_failure(notes, &err, "failed to join the game");
                return Err(err);
            }
        };

        let joined_id = resp
            .any_session_id()
            .unwrap_or(session_id)
            .to_string();
        rec.reconcile(
            data,
            Update::SessionJoined {
                session_id: joined_id,
                player_name: player_name.to_string(),
            },
        );
        notes.push("joined the game", Severity::Success);
        Ok(resp)
    }

    /// Polls the session snapshot. A "board is null" refusal folds into the
    /// placement phase instead of surfacing; nothing is posted for it.
    pub async fn game_state(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
    ) -> Result<(), ClientError> {
        let (session_id, player_name) = Self::require_identity(data)?;

        match self
            .bounded(self.transport.get_session_state(&session_id, &player_name))
            .await
        {
            Ok(snap) => {
                rec.reconcile(data, Update::Snapshot(snap));
                Ok(())
            }
            Err(e) if is_board_pending(&e) => {
                debug!("board not ready yet, staying in placement");
                rec.reconcile(data, Update::Snapshot(GameStateResponse::waiting()));
                Ok(())
            }
            Err(e) => {
                let err = classify(e);
                notify_failure(notes, &err, "failed to load the game state");
                Err(err)
            }
        }
    }

    pub async fn auto_place(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
    ) -> Result<(), ClientError> {
        let (session_id, player_name) = Self::require_identity(data)?;

        match self
            .bounded(self.transport.auto_place_ships(&session_id, &player_name))
            .await
        {
            Ok(resp) => {
                if let Some(board) = resp.board {
                    rec.reconcile(
                        data,
                        Update::Event {
                            event: shared::protocol::ServerEvent::BoardUpdate(
                                shared::protocol::BoardUpdateData {
                                    player_name: player_name.clone(),
                                    board,
                                },
                            ),
                            seq: None,
                        },
                    );
                }
                notes.push("ships placed automatically", Severity::Success);
                Ok(())
            }
            Err(e) => {
                let err = classify(e);
                notify_failure(notes, &err, "automatic placement failed");
                Err(err)
            }
        }
    }

    pub async fn place_ships(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
        ships: &[Ship],
    ) -> Result<(), ClientError> {
        let (session_id, player_name) = Self::require_identity(data)?;
        if data.session.phase() != Phase::Placement {
            notes.push("ships can only be placed during placement", Severity::Error);
            return Err(ClientError::InvalidSessionState(format!(
                "placement requires the Placement phase, currently {}",
                data.session.phase()
            )));
        }
        if ships.is_empty() || ships.iter().any(|s| s.length == 0) {
            notes.push("ship list is malformed", Severity::Error);
            return Err(ClientError::InvalidInput(
                "ships must be non-empty with positive lengths".to_string(),
            ));
        }

        // Local (row, col) leaves the client as (x, y) here and only here.
        let wire_ships: Vec<WireShip> = ships.iter().map(WireShip::from).collect();

        match self
            .bounded(self.transport.place_ships(&session_id, &player_name, &wire_ships))
            .await
        {
            Ok(()) => {
                rec.reconcile(data, Update::ShipsPlaced(ships.to_vec()));
                notes.push("ships saved on the server", Severity::Success);
                Ok(())
            }
            Err(e) => {
                let err = classify(e);
                notify_failure(notes, &err, "ship placement failed");
                Err(err)
            }
        }
    }

    pub async fn fire(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
        coord: Coord,
    ) -> Result<FireResponse, ClientError> {
        let (session_id, player_name) = Self::require_identity(data)?;
        if data.session.phase() != Phase::InProgress {
            notes.push("the game has not started yet", Severity::Error);
            return Err(ClientError::InvalidSessionState(format!(
                "firing requires the InProgress phase, currently {}",
                data.session.phase()
            )));
        }
        if !coord.in_bounds() {
            notes.push("that shot is off the board", Severity::Error);
            return Err(ClientError::Board(BoardError::CoordinateOutOfBounds(coord)));
        }

        // Local (row, col) leaves the client as (x, y) here and only here.
        let shot = WireCoord::from(coord);

        match self
            .bounded(self.transport.fire(&session_id, &player_name, shot))
            .await
        {
            Ok(resp) => {
                let message = resp.message.clone().unwrap_or_else(|| {
                    format!(
                        "shot at {}{}",
                        (b'A' + coord.col as u8) as char,
                        coord.row + 1
                    )
                });
                rec.reconcile(
                    data,
                    Update::FireResult {
                        player: player_name,
                        coord,
                        response: resp.clone(),
                    },
                );
                notes.push(message, Severity::Info);
                Ok(resp)
            }
            Err(e) => {
                let err = classify(e);
                match &err {
                    ClientError::Rejected { reason, .. } if reason.contains("Already fired") => {
                        notes.push("you already fired at that cell", Severity::Error);
                    }
                    ClientError::Rejected { reason, .. } if reason.contains("Not your turn") => {
                        notes.push("it is not your turn", Severity::Error);
                    }
                    _ => notify_failure(notes, &err, "the shot did not go through"),
                }
                Err(err)
            }
        }
    }

    /// Lightweight poll of the turn owner only, for servers that lag on
    /// full snapshots. Failures stay quiet; the next snapshot catches up.
    pub async fn refresh_turn(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
    ) -> Result<(), ClientError> {
        let (session_id, _) = Self::require_identity(data)?;
        let resp = self
            .bounded(self.transport.get_turn(&session_id))
            .await
            .map_err(classify)?;
        if let Some(player) = resp.any_player() {
            rec.reconcile(
                data,
                Update::Event {
                    event: shared::protocol::ServerEvent::TurnChange(
                        shared::protocol::TurnChangeData {
                            player: player.to_string(),
                        },
                    ),
                    seq: None,
                },
            );
        }
        Ok(())
    }

    /// Marks the local player ready. Servers without the endpoint get the
    /// degraded fallback: advance to InProgress locally and tell the user,
    /// instead of failing the whole flow.
    pub async fn mark_ready(
        &self,
        data: &mut GameData,
        rec: &mut Reconciler,
        notes: &mut NotificationQueue,
    ) -> Result<ReadyOutcome, ClientError> {
        let (session_id, player_name) = Self::require_identity(data)?;

        match self
            .bounded(self.transport.mark_ready(&session_id, &player_name))
            .await
        {
            Ok(resp) => {
                notes.push("you are ready", Severity::Success);
                Ok(ReadyOutcome::Confirmed(resp))
            }
            Err(e) if is_not_found_class(&e) => {
                info!("server has no ready endpoint, advancing locally");
                rec.reconcile(
                    data,
                    Update::Snapshot(GameStateResponse {
                        status: Some("IN_PROGRESS".to_string()),
                        ..Default::default()
                    }),
                );
                notes.push("ready acknowledged locally", Severity::Info);
                Ok(ReadyOutcome::Degraded)
            }
            Err(e) => {
                let err = classify(e);
                notify_failure(notes, &err, "could not mark you ready");
                Err(err)
            }
        }
    }

    pub async fn cancel(&self, session_id: &str) -> Result<(), ClientError> {
        self.bounded(self.transport.cancel_session(session_id))
            .await
            .map_err(classify)
    }

    pub async fn list_active(&self) -> Result<Vec<shared::protocol::SessionInfo>, ClientError> {
        self.bounded(self.transport.list_active_sessions())
            .await
            .map_err(classify)
    }

    pub async fn list_waiting(&self) -> Result<Vec<shared::protocol::SessionInfo>, ClientError> {
        self.bounded(self.transport.list_waiting_sessions())
            .await
            .map_err(classify)
    }
}

// Sanity check the alphabet labelling stays within A..J for a 10-wide board.
const _: () = assert!(BOARD_SIZE <= 26);
