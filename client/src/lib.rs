//! # Sea Battle Client Library
//!
//! Client-side synchronization engine for the sea battle server. It keeps a
//! local mirror of one game session up to date from two directions at once:
//! request/response calls the player triggers, and one-way events the server
//! pushes over an SSE stream.
//!
//! ## Architecture Overview
//!
//! Everything the server tells us funnels through a single reconciler, so
//! duplicated, reordered or stale updates cannot corrupt the local state.
//! Player actions validate their preconditions locally before any network
//! call and convert coordinates to wire space at exactly one boundary.
//!
//! ## Module Organization
//!
//! - `session`: the session phase machine and per-game identity.
//! - `notify`: the auto-expiring user notification queue.
//! - `reconcile`: the single mutation path for boards, moves and phase.
//! - `commands`: player actions, precondition checks and error taxonomy.
//! - `transport`: the `GameTransport` trait, its HTTP + SSE implementation.
//! - `engine`: the `GameClient` facade that ties the pieces together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), client::commands::ClientError> {
//! use client::engine::GameClient;
//! use client::session::GameMode;
//! use client::transport::HttpTransport;
//!
//! let transport = HttpTransport::new("http://localhost:8080/api")?;
//! let mut client = GameClient::new(transport);
//! client.create_new_game("player1", GameMode::Pve).await?;
//! client.auto_place_ships().await?;
//! client.mark_ready().await?;
//! client.fire(4, 5).await?;
//! # Ok(()) }
//! ```

pub mod commands;
pub mod engine;
pub mod notify;
pub mod reconcile;
pub mod session;
pub mod transport;
