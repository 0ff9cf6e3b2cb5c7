//! Integration tests for the sea battle client engine
//!
//! These tests drive the full engine stack (dispatcher, reconciler,
//! notifications, event subscription) against a scripted in-memory transport.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use client::engine::GameClient;
use client::notify::Severity;
use client::session::{GameMode, Phase};
use client::transport::{EventEnvelope, EventSubscription, GameTransport, TransportError};
use shared::protocol::{
    BoardResponse, FireResponse, GameEndData, GameStateResponse, ReadyResponse, ServerEvent,
    SessionCreated, SessionInfo, ShotResultData, TurnResponse, WireShip,
};
use shared::{Cell, Coord, WireCoord, BOARD_SIZE};

const SESSION_ID: &str = "game-1";

#[derive(Default)]
struct MockState {
    snapshot: Option<GameStateResponse>,
    snapshot_error: Option<(u16, String)>,
    auto_board: Option<Vec<Vec<String>>>,
    fire_hit: bool,
    fire_calls: Vec<WireCoord>,
    event_tx: Option<mpsc::Sender<EventEnvelope>>,
}

/// Scripted server double; knobs live behind a shared handle so the test can
/// adjust them mid-scenario.
#[derive(Clone, Default)]
struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn with_snapshot(snapshot: GameStateResponse) -> Self {
        let mock = MockTransport::default();
        mock.state.lock().unwrap().snapshot = Some(snapshot);
        mock
    }

    fn in_progress(me: &str, opponent: &str) -> Self {
        MockTransport::with_snapshot(GameStateResponse {
            status: Some("IN_PROGRESS".to_string()),
            current_turn: Some(me.to_string()),
            player1: Some(me.to_string()),
            player2: Some(opponent.to_string()),
            ..Default::default()
        })
    }

    fn live_sender(&self) -> mpsc::Sender<EventEnvelope> {
        self.state
            .lock()
            .unwrap()
            .event_tx
            .clone()
            .expect("no subscription opened yet")
    }

    fn fire_calls(&self) -> Vec<WireCoord> {
        self.state.lock().unwrap().fire_calls.clone()
    }

    async fn push(&self, seq: u64, event: ServerEvent) {
        self.push_for(SESSION_ID, seq, event).await;
    }

    async fn push_for(&self, session_id: &str, seq: u64, event: ServerEvent) {
        let sender = self.live_sender();
        sender
            .send(EventEnvelope {
                session_id: session_id.to_string(),
                seq: Some(seq),
                event,
            })
            .await
            .unwrap();
    }
}

impl GameTransport for MockTransport {
    async fn create_session(
        &self,
        _player_name: &str,
        _mode: &str,
    ) -> Result<SessionCreated, TransportError> {
        Ok(SessionCreated {
            session_id: Some(SESSION_ID.to_string()),
            ..Default::default()
        })
    }

    async fn join_session(
        &self,
        session_id: &str,
        _player_name: &str,
    ) -> Result<SessionCreated, TransportError> {
        Ok(SessionCreated {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        })
    }

    async fn get_session_state(
        &self,
        _session_id: &str,
        _player_name: &str,
    ) -> Result<GameStateResponse, TransportError> {
        let state = self.state.lock().unwrap();
        if let Some((status, message)) = &state.snapshot_error {
            return Err(TransportError::Status {
                status: *status,
                message: message.clone(),
            });
        }
        Ok(state.snapshot.clone().unwrap_or_default())
    }

    async fn place_ships(
        &self,
        _session_id: &str,
        _player_name: &str,
        _ships: &[WireShip],
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn auto_place_ships(
        &self,
        _session_id: &str,
        _player_name: &str,
    ) -> Result<BoardResponse, TransportError> {
        Ok(BoardResponse {
            board: self.state.lock().unwrap().auto_board.clone(),
        })
    }

    async fn fire(
        &self,
        _session_id: &str,
        _player_name: &str,
        shot: WireCoord,
    ) -> Result<FireResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.fire_calls.push(shot);
        Ok(FireResponse {
            hit: state.fire_hit,
            ..Default::default()
        })
    }

    async fn get_turn(&self, _session_id: &str) -> Result<TurnResponse, TransportError> {
        Ok(TurnResponse::default())
    }

    async fn mark_ready(
        &self,
        _session_id: &str,
        _player_name: &str,
    ) -> Result<ReadyResponse, TransportError> {
        Ok(ReadyResponse::default())
    }

    async fn cancel_session(&self, _session_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn list_active_sessions(&self) -> Result<Vec<SessionInfo>, TransportError> {
        Ok(Vec::new())
    }

    async fn list_waiting_sessions(&self) -> Result<Vec<SessionInfo>, TransportError> {
        Ok(Vec::new())
    }

    async fn subscribe(
        &self,
        session_id: &str,
        _player_name: &str,
    ) -> Result<EventSubscription, TransportError> {
        let (tx, rx) = mpsc::channel(32);
        self.state.lock().unwrap().event_tx = Some(tx);
        Ok(EventSubscription::new(session_id.to_string(), rx, None))
    }
}

fn empty_grid() -> Vec<Vec<String>> {
    vec![vec!["EMPTY".to_string(); BOARD_SIZE]; BOARD_SIZE]
}

/// SESSION LIFECYCLE TESTS
mod session_flow_tests {
    use super::*;

    /// Creating a PVE game lands in the placement phase with empty boards
    #[tokio::test]
    async fn creating_a_pve_game_enters_placement() {
        let transport = MockTransport::default();
        let mut game = GameClient::new(transport);
        game.create_new_game("p1", GameMode::Pve).await.unwrap();

        assert_eq!(game.session().phase(), Phase::Placement);
        assert_eq!(game.session().session_id.as_deref(), Some(SESSION_ID));
        assert_eq!(game.own_board().count(Cell::Ship), 0);
        assert_eq!(game.opponent_board().count(Cell::Ship), 0);
    }

    /// Automatic placement mirrors the server's board into the own grid
    #[tokio::test]
    async fn auto_placement_mirrors_server_board() {
        let transport = MockTransport::default();
        {
            let mut grid = empty_grid();
            grid[2][3] = "SHIP".to_string();
            transport.state.lock().unwrap().auto_board = Some(grid);
        }
        let mut game = GameClient::new(transport);
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        game.auto_place_ships().await.unwrap();

        assert_eq!(game.own_board().get(Coord::new(2, 3)), Some(Cell::Ship));
        assert_eq!(game.own_board().count(Cell::Ship), 1);
    }

    /// Joining runs join, auto-placement and the first snapshot in one flow
    #[tokio::test]
    async fn joining_runs_the_full_join_flow() {
        let transport = MockTransport::in_progress("guest", "host");
        let mut game = GameClient::new(transport);
        game.join_game(SESSION_ID, "guest").await.unwrap();

        assert_eq!(game.session().mode, Some(GameMode::Pvp));
        assert_eq!(game.session().phase(), Phase::InProgress);
        assert_eq!(game.session().opponent_name.as_deref(), Some("host"));
        assert!(game.session().is_my_turn());
    }

    /// A "board is null" refusal means placement is still underway, not failure
    #[tokio::test]
    async fn board_pending_refusal_is_not_an_error() {
        let transport = MockTransport::default();
        transport.state.lock().unwrap().snapshot_error =
            Some((400, "board is null".to_string()));
        let mut game = GameClient::new(transport);
        game.create_new_game("p1", GameMode::Pve).await.unwrap();

        game.load_game_state().await.unwrap();
        assert_eq!(game.session().phase(), Phase::Placement);
        assert!(game
            .notifications()
            .iter()
            .all(|n| n.severity != Severity::Error));
    }
}

/// COMBAT TESTS
mod combat_tests {
    use super::*;

    /// A shot converts to wire coordinates once and lands on the opponent grid
    #[tokio::test]
    async fn firing_updates_opponent_board_and_records_the_move() {
        let transport = MockTransport::in_progress("p1", "enemy");
        transport.state.lock().unwrap().fire_hit = true;
        let mut game = GameClient::new(transport.clone());
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        game.load_game_state().await.unwrap();

        let hit = game.fire(4, 5).await.unwrap();
        assert!(hit);
        assert_eq!(game.opponent_board().get(Coord::new(4, 5)), Some(Cell::Hit));
        assert_eq!(game.moves().len(), 1);

        // Local (row=4, col=5) must reach the server as (x=5, y=4).
        assert_eq!(transport.fire_calls(), vec![WireCoord { x: 5, y: 4 }]);
    }

    /// The push-stream echo of an own shot does not double-apply
    #[tokio::test]
    async fn shot_echoed_over_the_push_stream_applies_once() {
        let transport = MockTransport::in_progress("p1", "enemy");
        let mut game = GameClient::new(transport.clone());
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        game.load_game_state().await.unwrap();
        game.fire(4, 5).await.unwrap();

        transport
            .push(
                1,
                ServerEvent::ShotResult(ShotResultData {
                    player: "p1".to_string(),
                    row: 4,
                    col: 5,
                    hit: false,
                    timestamp: Some(123456),
                }),
            )
            .await;
        game.pump_events();

        assert_eq!(game.moves().len(), 1);
        assert_eq!(game.opponent_board().get(Coord::new(4, 5)), Some(Cell::Miss));
    }

    /// An opponent's pushed shot lands on the own grid
    #[tokio::test]
    async fn opponent_shot_lands_on_own_board() {
        let transport = MockTransport::in_progress("p1", "enemy");
        let mut game = GameClient::new(transport.clone());
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        game.load_game_state().await.unwrap();

        transport
            .push(
                1,
                ServerEvent::ShotResult(ShotResultData {
                    player: "enemy".to_string(),
                    row: 7,
                    col: 2,
                    hit: true,
                    timestamp: None,
                }),
            )
            .await;
        game.pump_events();

        assert_eq!(game.own_board().get(Coord::new(7, 2)), Some(Cell::Hit));
        assert_eq!(game.moves()[0].player, "enemy");
    }
}

/// EVENT STREAM TESTS
mod event_stream_tests {
    use super::*;

    /// A duplicated game-end event finishes the session exactly once
    #[tokio::test]
    async fn game_end_event_is_idempotent() {
        let transport = MockTransport::in_progress("p1", "enemy");
        let mut game = GameClient::new(transport.clone());
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        game.load_game_state().await.unwrap();

        for seq in [10u64, 11] {
            transport
                .push(
                    seq,
                    ServerEvent::GameEnd(GameEndData {
                        winner: "p1".to_string(),
                        final_board: None,
                    }),
                )
                .await;
        }
        game.pump_events();

        assert_eq!(game.session().phase(), Phase::Finished);
        assert_eq!(game.session().winner(), Some("p1"));
        let endings = game
            .notifications()
            .iter()
            .filter(|n| n.message.contains("game over"))
            .count();
        assert_eq!(endings, 1);
    }

    /// Events tagged with a different session id never touch the state
    #[tokio::test]
    async fn stale_session_events_are_discarded() {
        let transport = MockTransport::in_progress("p1", "enemy");
        let mut game = GameClient::new(transport.clone());
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        game.load_game_state().await.unwrap();

        transport
            .push_for(
                "torn-down-session",
                99,
                ServerEvent::GameEnd(GameEndData {
                    winner: "enemy".to_string(),
                    final_board: None,
                }),
            )
            .await;
        game.pump_events();

        assert_eq!(game.session().phase(), Phase::InProgress);
        assert_eq!(game.session().winner(), None);
    }

    /// Starting a new game tears down the previous subscription
    #[tokio::test]
    async fn new_game_replaces_the_event_subscription() {
        let transport = MockTransport::default();
        let mut game = GameClient::new(transport.clone());
        game.create_new_game("p1", GameMode::Pve).await.unwrap();
        let old_sender = transport.live_sender();

        game.create_new_game("p1", GameMode::Pve).await.unwrap();

        let result = old_sender
            .send(EventEnvelope {
                session_id: SESSION_ID.to_string(),
                seq: Some(1),
                event: ServerEvent::GameEnd(GameEndData {
                    winner: "enemy".to_string(),
                    final_board: None,
                }),
            })
            .await;
        assert!(result.is_err(), "old subscription should be closed");
        assert_eq!(game.session().phase(), Phase::Placement);
    }
}
