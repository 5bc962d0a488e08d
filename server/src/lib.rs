//! # Buzzer Game Server Library
//!
//! This library provides the authoritative server for a live multiplayer
//! "buzzer" quiz. It keeps the canonical roster and buzz state, arbitrates
//! who buzzed in first, applies moderator commands, and pushes fresh
//! snapshots to every connected contestant.
//!
//! ## Core Responsibilities
//!
//! ### Buzz Arbitration
//! At most one contestant holds the buzz at a time. The first accepted buzz
//! of a round wins; every later attempt is acknowledged but rejected until
//! the moderator clears the buzz or advances the round. Locked-out players
//! cannot buzz again until the next round.
//!
//! ### Moderation
//! Scoring, lockouts, round changes, resets and kicks are gated on the admin
//! token generated at startup. Commands carrying any other token are dropped
//! without touching state.
//!
//! ### Reconnects
//! A dropped connection only marks its player inactive. A client that
//! reconnects with its previous id gets the same record back, score intact.
//!
//! ## Architecture Design
//!
//! ### One Lock Per Session
//! Each game session serializes its mutations behind a single mutex, so
//! every client observes the same order of state changes. Snapshots are
//! built under the lock and published after it is released.
//!
//! ### Non-blocking Fan-out
//! Each player owns a bounded outbound queue that drops its oldest entries
//! when full. A stalled client therefore never holds up the session.
//!
//! ### Task Per Direction
//! Every connection runs a read task feeding the session and a send task
//! draining the player's queue, which also writes a keep-alive ping after
//! 30 seconds without outbound traffic.
//!
//! ## Module Organization
//!
//! - `game`: the `Game` trait every variant implements, and connection handles
//! - `buzz_game`: the buzzer session state machine
//! - `roster`: player records and id allocation
//! - `outbox`: the per-player outbound queue
//! - `registry`: maps game-type selectors to running sessions
//! - `network`: HTTP routes, WebSocket upgrade, Init handshake and connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use server::registry::SessionRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let registry = Arc::new(SessionRegistry::new("123456", "654321", config.queue_capacity));
//!
//!     let server = Server::bind("0.0.0.0:80", registry, config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod buzz_game;
pub mod game;
pub mod network;
pub mod outbox;
pub mod registry;
pub mod roster;
