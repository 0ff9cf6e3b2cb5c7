//! The top-level game client: owns the session data, the reconciler, the
//! notification queue and the single live event subscription, and exposes
//! the player-facing operations as async methods.

use log::{debug, info, warn};
use std::time::Instant;

use shared::protocol::SessionInfo;
use shared::{Board, Coord, Ship};

use crate::commands::{ClientError, CommandDispatcher, ReadyOutcome};
use crate::notify::{Notification, NotificationQueue, Severity};
use crate::reconcile::{GameData, Reconciler, Update};
use crate::session::{GameMode, MoveRecord, Phase, SessionState};
use crate::transport::{EventEnvelope, EventSubscription, GameTransport};

pub struct GameClient<T> {
    dispatcher: CommandDispatcher<T>,
    data: GameData,
    reconciler: Reconciler,
    notifications: NotificationQueue,
    subscription: Option<EventSubscription>,
}

impl<T: GameTransport> GameClient<T> {
    pub fn new(transport: T) -> Self {
        GameClient {
            dispatcher: CommandDispatcher::new(transport),
            data: GameData::default(),
            reconciler: Reconciler::new(),
            notifications: NotificationQueue::new(),
            subscription: None,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.data.session
    }

    pub fn own_board(&self) -> &Board {
        &self.data.own_board
    }

    pub fn opponent_board(&self) -> &Board {
        &self.data.opponent_board
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.data.moves
    }

    pub fn notifications(&self) -> &[Notification] {
        self.notifications.entries()
    }

    pub fn dismiss_notification(&mut self, id: u64) {
        self.notifications.dismiss(id);
    }

    /// Starts a fresh session, discarding whatever was live before.
    pub async fn create_new_game(
        &mut self,
        player_name: &str,
        mode: GameMode,
    ) -> Result<(), ClientError> {
        self.reset_game();
        self.dispatcher
            .create(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
                player_name,
                mode,
            )
            .await?;
        self.open_subscription().await;
        Ok(())
    }

    /// Joins an existing session, places ships automatically and pulls the
    /// first snapshot so the UI has something to show right away.
    pub async fn join_game(
        &mut self,
        session_id: &str,
        player_name: &str,
    ) -> Result<(), ClientError> {
        self.reset_game();
        self.dispatcher
            .join(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
                session_id,
                player_name,
            )
            .await?;
        self.dispatcher
            .auto_place(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
            )
            .await?;
        self.dispatcher
            .game_state(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
            )
            .await?;
        self.open_subscription().await;
        Ok(())
    }

    pub async fn auto_place_ships(&mut self) -> Result<(), ClientError> {
        self.dispatcher
            .auto_place(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
            )
            .await
    }

    pub async fn place_ships_manually(&mut self, ships: &[Ship]) -> Result<(), ClientError> {
        self.dispatcher
            .place_ships(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
                ships,
            )
            .await
    }

    pub async fn mark_ready(&mut self) -> Result<ReadyOutcome, ClientError> {
        self.dispatcher
            .mark_ready(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
            )
            .await
    }

    /// Fires at a local (row, col) cell and refreshes the snapshot so turn
    /// ownership catches up even on servers that do not push events.
    pub async fn fire(&mut self, row: usize, col: usize) -> Result<bool, ClientError> {
        let resp = self
            .dispatcher
            .fire(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
                Coord::new(row, col),
            )
            .await?;
        if let Err(e) = self
            .dispatcher
            .game_state(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
            )
            .await
        {
            debug!("post-shot state refresh failed: {e}");
        }
        Ok(resp.hit)
    }

    /// Polls only the turn owner, cheaper than a full snapshot.
    pub async fn refresh_turn(&mut self) -> Result<(), ClientError> {
        self.dispatcher
            .refresh_turn(&mut self.data, &mut self.reconciler)
            .await
    }

    pub async fn load_game_state(&mut self) -> Result<(), ClientError> {
        self.dispatcher
            .game_state(
                &mut self.data,
                &mut self.reconciler,
                &mut self.notifications,
            )
            .await
    }

    /// Gives up the current game. Cancellation is best effort; the local
    /// session resets either way.
    pub async fn surrender(&mut self) {
        if let Some(session_id) = self.data.session.session_id.clone() {
            if let Err(e) = self.dispatcher.cancel(&session_id).await {
                warn!("cancel request failed: {e}");
            }
        }
        self.reset_game();
        self.notifications.push("you surrendered", Severity::Info);
    }

    pub async fn list_active_sessions(&self) -> Result<Vec<SessionInfo>, ClientError> {
        self.dispatcher.list_active().await
    }

    pub async fn list_waiting_sessions(&self) -> Result<Vec<SessionInfo>, ClientError> {
        self.dispatcher.list_waiting().await
    }

    /// Tears down the subscription and clears all per-session state.
    pub fn reset_game(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.close();
        }
        self.reconciler.reset();
        self.data.reset();
    }

    /// Drains pending push events and expires old notifications. Call this
    /// once per UI tick.
    pub fn pump_events(&mut self) {
        let mut staged = Vec::new();
        if let Some(sub) = self.subscription.as_mut() {
            while let Ok(envelope) = sub.events.try_recv() {
                staged.push(envelope);
            }
        }
        for envelope in staged {
            self.apply_envelope(envelope);
        }
        self.notifications.sweep_expired(Instant::now());
    }

    fn apply_envelope(&mut self, envelope: EventEnvelope) {
        if self.data.session.session_id.as_deref() != Some(envelope.session_id.as_str()) {
            debug!("discarding event from stale session {}", envelope.session_id);
            return;
        }

        match &envelope.event {
            shared::protocol::ServerEvent::TurnChange(turn) => {
                if self.data.session.phase() != Phase::Finished {
                    self.notifications
                        .push(format!("it is {}'s turn", turn.player), Severity::Info);
                }
            }
            shared::protocol::ServerEvent::GameEnd(end) => {
                // Only the first end event gets announced.
                if self.data.session.phase() != Phase::Finished {
                    self.notifications.push(
                        format!("game over, winner: {}", end.winner),
                        Severity::Success,
                    );
                }
            }
            _ => {}
        }

        self.reconciler.reconcile(
            &mut self.data,
            Update::Event {
                event: envelope.event,
                seq: envelope.seq,
            },
        );
    }

    /// Opens the push-event stream for the current session, replacing any
    /// previous subscription. A failure leaves the client on polling only.
    async fn open_subscription(&mut self) {
        if let Some(mut old) = self.subscription.take() {
            old.close();
        }
        let (session_id, player_name) = match (
            self.data.session.session_id.clone(),
            self.data.session.player_name.clone(),
        ) {
            (Some(s), Some(p)) => (s, p),
            _ => return,
        };

        let attempt = tokio::time::timeout(
            self.dispatcher.timeout(),
            self.dispatcher
                .transport()
                .subscribe(&session_id, &player_name),
        )
        .await;
        match attempt {
            Ok(Ok(sub)) => {
                info!("subscribed to push events for session {session_id}");
                self.subscription = Some(sub);
            }
            Ok(Err(e)) => warn!("event subscription failed, falling back to polling: {e}"),
            Err(_) => warn!("event subscription timed out, falling back to polling"),
        }
    }
}
