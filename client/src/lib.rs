//! # Replication Client Library
//!
//! This library provides the client side of the multiplayer world: a mirror of
//! the entities the server replicates to this connection, fed only by server
//! packets and kept moving between them.
//!
//! ## Architecture Overview
//!
//! ### Mirroring, Not Simulating
//! The server is the only authority. The client never decides an outcome; it
//! overwrites its mirror with whatever arrives and fills the gaps between
//! packets by walking paths and counting down casts locally.
//!
//! ### Order-Independent Visibility
//! Packets may arrive in any order relative to the client's own tick. Which
//! entities have a mirror is recomputed every tick from mirrored positions,
//! and an entity that leaves view finishes its walk before its mirror goes.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - Per-entity mirrored data and the local player's personal data
//! - Application of every server packet category
//! - Local ticking of paths, skill executions and reuse cooldowns
//!
//! ### Visibility Module (`visibility`)
//! - Sight and mirror-sink collaborators
//! - Deferred creation and removal of mirrors
//!
//! ### Input Module (`input`)
//! - Sequence numbering and timestamps for outgoing requests
//! - A seeded bot standing in for a player
//!
//! ### Network Module (`network`)
//! - UDP socket, connect handshake and the client loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         name: "acolyte".to_string(),
//!         ..ClientConfig::default()
//!     };
//!     let mut client = Client::new(config).await?;
//!     client.run().await
//! }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod visibility;

pub use game::{ClientEntity, ClientGameState};
pub use visibility::{MirrorSink, SightQuery, VisibilityLifecycle};
