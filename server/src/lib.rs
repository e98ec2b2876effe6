//! # Cooldown Chess Server Library
//!
//! This library provides the authoritative server for a real-time chess
//! variant in which there are no turns. Any piece may move at any time, but
//! the square it lands on is locked for a per-piece cooldown. Moves issued
//! while a square is cooling down can be queued and are replayed by a
//! fixed-rate scheduler once the cooldown expires.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Every room's board, cooldowns and move queues live here. Clients only
//! send requests and render whatever the server broadcasts back.
//!
//! ### Room Lifecycle
//! Rooms go through lobby setup (teams, readiness, cooldown settings),
//! matches, rematches and cancellation. Reconnecting players are matched by
//! username, so a dropped socket can resume its seat.
//!
//! ### Command Language
//! Besides direct board moves, players can type commands such as `p->e4` or
//! `n&g->2u1l` that address many pieces at once. Parsing lives in the
//! `shared` crate; execution happens against the room's game state.
//!
//! ## Architecture Design
//!
//! ### One Lock Per Room
//! The registry maps room codes to `Arc<Mutex<Room>>`. Client handlers and
//! the scheduler take the same per-room lock, so mutations of one room
//! never interleave while separate rooms proceed independently.
//!
//! ### Injected Time
//! Everything below the network layer takes the current time in epoch
//! milliseconds as an argument, which keeps cooldown behaviour
//! deterministic under test.
//!
//! ### WebSocket Transport
//! Events are JSON objects of the form `{"event": "...", "data": {...}}`
//! carried in WebSocket text frames.
//!
//! ## Module Organization
//!
//! ### Schedule Module (`schedule`)
//! Square-keyed cooldown expiries and FIFO move queues.
//!
//! ### Game Module (`game`)
//! Per-room game state: direct moves, command execution and the queue drain,
//! keeping cooldowns and queues attached to the squares their pieces occupy.
//!
//! ### Room Module (`room`)
//! Roster, phase transitions, win counters and departure handling.
//!
//! ### Registry Module (`registry`)
//! The process-wide map from room code to room.
//!
//! ### Session Module (`session`)
//! Routes each inbound event to its room and turns outcomes into outbound
//! events.
//!
//! ### Client Manager Module (`client_manager`)
//! Connected sockets, capacity limits and room subscriptions.
//!
//! ### Network Module (`network`)
//! The listener, per-connection tasks, the outbound dispatcher and the
//! scheduler tick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Drain queued moves every 100ms and accept at most 256 sockets
//!     let mut server = Server::bind(
//!         "127.0.0.1:3000",
//!         Duration::from_millis(100),
//!         256,
//!     ).await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server runs these internal tasks:
//! - **Connection tasks**: one reader and one writer per socket
//! - **Network Sender**: delivers session output in the order it was produced
//! - **Scheduler**: drains cooldown-expired queues across all rooms

pub mod client_manager;
pub mod game;
pub mod network;
pub mod registry;
pub mod room;
pub mod schedule;
pub mod session;
pub mod utils;
