//! Transport boundary: the `GameTransport` trait the engine talks through,
//! plus the HTTP + SSE implementation against the real server.
//!
//! Everything above this module works in local (row, col) coordinates and
//! typed payloads; everything below is JSON on the wire.

use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shared::protocol::{
    BoardResponse, EventFrame, FireResponse, GameStateResponse, ReadyResponse, ServerEvent,
    SessionCreated, SessionInfo, TurnResponse, WireShip,
};
use shared::WireCoord;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response payload: {0}")]
    Decode(String),
}

/// A push event together with the session it was subscribed for. The tag is
/// what lets the engine discard events from a torn-down session.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub session_id: String,
    pub seq: Option<u64>,
    pub event: ServerEvent,
}

/// Handle for the one live push-event subscription. Dropping or closing it
/// stops the reader task; the engine never holds more than one.
#[derive(Debug)]
pub struct EventSubscription {
    pub session_id: String,
    pub events: mpsc::Receiver<EventEnvelope>,
    task: Option<JoinHandle<()>>,
}

impl EventSubscription {
    pub fn new(
        session_id: String,
        events: mpsc::Receiver<EventEnvelope>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        EventSubscription {
            session_id,
            events,
            task,
        }
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// The named operations the game server offers. The engine is generic over
/// this trait; tests drive it with an in-memory implementation.
#[allow(async_fn_in_trait)]
pub trait GameTransport {
    async fn create_session(
        &self,
        player_name: &str,
        mode: &str,
    ) -> Result<SessionCreated, TransportError>;

    async fn join_session(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<SessionCreated, TransportError>;

    async fn get_session_state(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<GameStateResponse, TransportError>;

    async fn place_ships(
        &self,
        session_id: &str,
        player_name: &str,
        ships: &[WireShip],
    ) -> Result<(), TransportError>;

    async fn auto_place_ships(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<BoardResponse, TransportError>;

    async fn fire(
        &self,
        session_id: &str,
        player_name: &str,
        shot: WireCoord,
    ) -> Result<FireResponse, TransportError>;

    async fn get_turn(&self, session_id: &str) -> Result<TurnResponse, TransportError>;

    async fn mark_ready(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<ReadyResponse, TransportError>;

    async fn cancel_session(&self, session_id: &str) -> Result<(), TransportError>;

    async fn list_active_sessions(&self) -> Result<Vec<SessionInfo>, TransportError>;

    async fn list_waiting_sessions(&self) -> Result<Vec<SessionInfo>, TransportError>;

    async fn subscribe(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<EventSubscription, TransportError>;
}

/// HTTP + SSE client for the sea battle server's REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the API root, e.g. `http://localhost:8080/api`.
    /// Per-request deadlines are the dispatcher's job; only the connect is
    /// bounded here so the SSE stream can live as long as the session.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(HttpTransport {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        // The server wraps refusals as {"error": "..."}; fall back to the
        // raw body when it does not.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, TransportError> {
        let resp = request.send().await.map_err(request_error)?;
        let resp = Self::check(resp).await?;
        resp.json::<R>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn send_unit(&self, request: reqwest::RequestBuilder) -> Result<(), TransportError> {
        let resp = request.send().await.map_err(request_error)?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn fetch_sessions(&self, path: &str) -> Result<Vec<SessionInfo>, TransportError> {
        let value: serde_json::Value = self.send(self.http.get(self.url(path))).await?;
        parse_session_list(value)
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(err.to_string())
    }
}

/// The listing endpoints answer either a bare array or `{"sessions": [...]}`
/// depending on the server revision.
fn parse_session_list(value: serde_json::Value) -> Result<Vec<SessionInfo>, TransportError> {
    let list = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map
            .remove("sessions")
            .unwrap_or(serde_json::Value::Array(Vec::new())),
        _ => return Err(TransportError::Decode("unexpected session list".to_string())),
    };
    serde_json::from_value(list).map_err(|e| TransportError::Decode(e.to_string()))
}

impl GameTransport for HttpTransport {
    async fn create_session(
        &self,
        player_name: &str,
        mode: &str,
    ) -> Result<SessionCreated, TransportError> {
        self.send(self.http.post(self.url("/game/create")).json(&serde_json::json!({
            "playerName": player_name,
            "gameType": mode,
        })))
        .await
    }

    async fn join_session(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<SessionCreated, TransportError> {
        self.send(
            self.http
                .post(self.url(&format!("/game/{session_id}/join")))
                .json(&serde_json::json!({ "playerName": player_name })),
        )
        .await
    }

    async fn get_session_state(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<GameStateResponse, TransportError> {
        self.send(
            self.http
                .get(self.url(&format!("/gameplay/{session_id}/game-state")))
                .query(&[("playerName", player_name)]),
        )
        .await
    }

    async fn place_ships(
        &self,
        session_id: &str,
        player_name: &str,
        ships: &[WireShip],
    ) -> Result<(), TransportError> {
        self.send_unit(
            self.http
                .post(self.url(&format!("/gameplay/{session_id}/place-ships")))
                .json(&serde_json::json!({
                    "playerName": player_name,
                    "ships": ships,
                })),
        )
        .await
    }

    async fn auto_place_ships(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<BoardResponse, TransportError> {
        self.send(
            self.http
                .post(self.url(&format!("/gameplay/{session_id}/auto-place-ships")))
                .json(&serde_json::json!({ "playerName": player_name })),
        )
        .await
    }

    async fn fire(
        &self,
        session_id: &str,
        player_name: &str,
        shot: WireCoord,
    ) -> Result<FireResponse, TransportError> {
        self.send(
            self.http
                .post(self.url(&format!("/gameplay/{session_id}/fire")))
                .json(&serde_json::json!({
                    "x": shot.x,
                    "y": shot.y,
                    "playerName": player_name,
                })),
        )
        .await
    }

    async fn get_turn(&self, session_id: &str) -> Result<TurnResponse, TransportError> {
        self.send(self.http.get(self.url(&format!("/gameplay/{session_id}/turn"))))
            .await
    }

    async fn mark_ready(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<ReadyResponse, TransportError> {
        self.send(
            self.http
                .post(self.url(&format!("/gameplay/{session_id}/ready")))
                .json(&serde_json::json!({ "playerName": player_name })),
        )
        .await
    }

    async fn cancel_session(&self, session_id: &str) -> Result<(), TransportError> {
        self.send_unit(self.http.post(self.url(&format!("/game/{session_id}/cancel"))))
            .await
    }

    async fn list_active_sessions(&self) -> Result<Vec<SessionInfo>, TransportError> {
        self.fetch_sessions("/game/active-sessions").await
    }

    async fn list_waiting_sessions(&self) -> Result<Vec<SessionInfo>, TransportError> {
        self.fetch_sessions("/game/waiting-sessions").await
    }

    async fn subscribe(
        &self,
        session_id: &str,
        player_name: &str,
    ) -> Result<EventSubscription, TransportError> {
        let resp = self
            .http
            .get(self.url(&format!("/sse/game/{session_id}")))
            .query(&[("playerName", player_name)])
            .send()
            .await
            .map_err(request_error)?;
        let resp = Self::check(resp).await?;

        let (tx, rx) = mpsc::channel(64);
        let tagged_session = session_id.to_string();
        let reader_session = tagged_session.clone();
        let task = tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("event stream error: {e}");
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);
                while let Some(frame) = next_sse_frame(&mut buffer) {
                    if let Some(envelope) = decode_sse_frame(&reader_session, &frame) {
                        if tx.send(envelope).await.is_err() {
                            return; // subscriber gone
                        }
                    }
                }
            }
            info!("event stream for session {reader_session} closed");
        });

        Ok(EventSubscription::new(tagged_session, rx, Some(task)))
    }
}

/// Pops one SSE frame (terminated by a blank line) off the front of `buffer`.
/// Servers delimit with either `\n\n` or `\r\n\r\n`; whichever comes first
/// ends the frame.
fn next_sse_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    let (end, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if b.0 < a.0 {
                b
            } else {
                a
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let frame: Vec<u8> = buffer.drain(..end + len).collect();
    Some(String::from_utf8_lossy(&frame).into_owned())
}

/// Extracts the JSON payload from an SSE frame and decodes it into an
/// envelope. Malformed payloads are dropped and logged, never propagated.
fn decode_sse_frame(session_id: &str, frame: &str) -> Option<EventEnvelope> {
    let payload: String = frame
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start())
        .collect::<Vec<_>>()
        .join("\n");
    if payload.is_empty() {
        return None;
    }

    let frame: EventFrame = match serde_json::from_str(&payload) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("dropping malformed sse payload: {e}");
            return None;
        }
    };
    let seq = frame.update_id;
    match frame.decode() {
        Ok(Some(event)) => Some(EventEnvelope {
            session_id: session_id.to_string(),
            seq,
            event,
        }),
        Ok(None) => None,
        Err(e) => {
            debug!("dropping undecodable sse event: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sse_frame_splits_on_blank_line() {
        let mut buffer = b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\npartial".to_vec();
        let first = next_sse_frame(&mut buffer).unwrap();
        assert!(first.contains("\"a\":1"));
        let second = next_sse_frame(&mut buffer).unwrap();
        assert!(second.contains("\"b\":2"));
        assert!(next_sse_frame(&mut buffer).is_none());
        assert_eq!(buffer, b"partial");
    }

    #[test]
    fn test_next_sse_frame_splits_crlf_streams() {
        let mut buffer =
            b"data: {\"type\": \"TURN_CHANGE\", \"data\": {\"player\": \"p2\"}}\r\n\r\nrest"
                .to_vec();
        let frame = next_sse_frame(&mut buffer).unwrap();
        assert!(frame.contains("TURN_CHANGE"));
        assert_eq!(buffer, b"rest");

        let envelope = decode_sse_frame("s1", &frame).unwrap();
        match envelope.event {
            ServerEvent::TurnChange(turn) => assert_eq!(turn.player, "p2"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_sse_frame_tags_session() {
        let frame = "event: TURN_CHANGE\ndata: {\"type\": \"TURN_CHANGE\", \"data\": {\"player\": \"p2\"}, \"updateId\": 3}\n\n";
        let envelope = decode_sse_frame("s1", frame).unwrap();
        assert_eq!(envelope.session_id, "s1");
        assert_eq!(envelope.seq, Some(3));
        match envelope.event {
            ServerEvent::TurnChange(turn) => assert_eq!(turn.player, "p2"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_sse_frame_drops_garbage() {
        assert!(decode_sse_frame("s1", "data: not json\n\n").is_none());
        assert!(decode_sse_frame("s1", ": keep-alive comment\n\n").is_none());
    }

    #[test]
    fn test_parse_session_list_accepts_both_shapes() {
        let bare = serde_json::json!([{"sessionId": "a"}]);
        let wrapped = serde_json::json!({"sessions": [{"id": "b"}]});
        assert_eq!(parse_session_list(bare).unwrap().len(), 1);
        let sessions = parse_session_list(wrapped).unwrap();
        assert_eq!(sessions[0].any_session_id(), Some("b"));
    }
}
