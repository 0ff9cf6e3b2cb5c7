//! Wire-level types exchanged with the game server.
//!
//! The server speaks JSON over HTTP plus a one-way SSE stream. Response
//! shapes are deliberately forgiving: the two server revisions in the wild
//! disagree on field names (`sessionId` vs `id`) and routinely omit fields,
//! so almost everything here is optional and resolved through accessors.

use crate::{Ship, WireCoord};
use serde::{Deserialize, Serialize};

/// Statuses the server reports while a session is waiting for placement.
/// Both spellings exist across server revisions.
pub fn status_is_waiting(status: &str) -> bool {
    matches!(status, "WAITING_FOR_PLAYERS" | "WAITING_FOR_PLAYER")
}

pub fn status_is_in_progress(status: &str) -> bool {
    status == "IN_PROGRESS"
}

/// Terminal statuses, including the per-winner variants of the older server.
pub fn status_is_terminal(status: &str) -> bool {
    matches!(
        status,
        "FINISHED" | "PLAYER1_WON" | "PLAYER2_WON" | "AI_WON" | "PLAYER_WON" | "CANCELLED"
    )
}

/// Response to create-session and join-session calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
}

impl SessionCreated {
    /// The session identifier under either spelling, newer field first.
    pub fn any_session_id(&self) -> Option<&str> {
        self.session_id.as_deref().or(self.id.as_deref())
    }
}

/// Snapshot of a session as returned by the game-state poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_turn: Option<String>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub player1: Option<String>,
    #[serde(default)]
    pub player2: Option<String>,
    #[serde(default)]
    pub player_board: Option<Vec<Vec<String>>>,
    /// Monotonic per-session update counter, when the server provides one.
    #[serde(default)]
    pub update_id: Option<u64>,
}

impl GameStateResponse {
    /// The snapshot shape the client synthesizes while the server has no
    /// board yet (placement phase).
    pub fn waiting() -> Self {
        GameStateResponse {
            status: Some("WAITING_FOR_PLAYERS".to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    #[serde(default)]
    pub board: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireResponse {
    #[serde(default)]
    pub hit: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub opponent_board: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    #[serde(default)]
    pub current_turn: Option<String>,
    #[serde(default)]
    pub player: Option<String>,
}

impl TurnResponse {
    pub fn any_player(&self) -> Option<&str> {
        self.current_turn.as_deref().or(self.player.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// One entry of the active/waiting session listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub player1: Option<String>,
    #[serde(default)]
    pub player2: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SessionInfo {
    pub fn any_session_id(&self) -> Option<&str> {
        self.session_id.as_deref().or(self.id.as_deref())
    }
}

/// Ship placement as the server expects it: x = column, y = row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireShip {
    pub x: usize,
    pub y: usize,
    pub length: usize,
    pub horizontal: bool,
}

impl From<&Ship> for WireShip {
    fn from(ship: &Ship) -> Self {
        let wire = WireCoord::from(ship.origin);
        WireShip {
            x: wire.x,
            y: wire.y,
            length: ship.length,
            horizontal: ship.horizontal,
        }
    }
}

/// Raw SSE frame payload: `{"type": ..., "data": ..., "timestamp": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default, rename = "updateId")]
    pub update_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardUpdateData {
    pub player_name: String,
    pub board: Vec<Vec<String>>,
}

/// Push events already carry (row, col) in local convention; only command
/// responses use the (x, y) wire convention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotResultData {
    pub player: String,
    pub row: usize,
    pub col: usize,
    pub hit: bool,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnChangeData {
    pub player: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndData {
    pub winner: String,
    /// Final layout reveal of the opponent board, when the server sends one.
    #[serde(default)]
    pub final_board: Option<Vec<Vec<String>>>,
}

/// A decoded push event from the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    GameStateUpdate(GameStateResponse),
    BoardUpdate(BoardUpdateData),
    ShotResult(ShotResultData),
    TurnChange(TurnChangeData),
    GameEnd(GameEndData),
}

impl EventFrame {
    /// Decodes the frame into a typed event. Returns `Ok(None)` for event
    /// types the client does not consume (e.g. the initial `CONNECTED`
    /// handshake); a malformed payload is an error the caller drops and logs.
    pub fn decode(self) -> Result<Option<ServerEvent>, serde_json::Error> {
        let event = match self.event_type.as_str() {
            "GAME_STATE_UPDATE" => ServerEvent::GameStateUpdate(serde_json::from_value(self.data)?),
            "BOARD_UPDATE" => ServerEvent::BoardUpdate(serde_json::from_value(self.data)?),
            "SHOT_RESULT" => ServerEvent::ShotResult(serde_json::from_value(self.data)?),
            "TURN_CHANGE" => ServerEvent::TurnChange(serde_json::from_value(self.data)?),
            "GAME_END" => ServerEvent::GameEnd(serde_json::from_value(self.data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}
