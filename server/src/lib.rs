//! # Replication Server Library
//!
//! This library provides the authoritative server for the multiplayer world.
//! It owns the canonical state of every character, monster and pickup on the
//! map, applies player requests, runs skills and monster behaviour on a fixed
//! tick, and tells every connected player exactly what changed inside its
//! replication range.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Movement, skill execution, damage, experience and regeneration are decided
//! here. Clients only mirror the result and never send state, just requests.
//!
//! ### Derived Stats
//! Every battle-capable entity carries a stat graph. Changing one attribute
//! recomputes the dependent stats in topological order, and each changed
//! value becomes one replication item.
//!
//! ### Replication
//! Each connection owns a replication queue. Mutations are enqueued as they
//! happen and the queue resolves superseded items when the tick flushes, so a
//! connection never receives a stat update that its own fresh snapshot
//! already covers.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! Network events, inputs and world updates are processed sequentially by one
//! task. The world is never shared, which keeps the per-tick mutation order
//! deterministic for a given seed and request stream.
//!
//! ### UDP-Based Communication
//! Requests arrive as single bincode datagrams. Each flush is packed into as
//! few datagrams as the size limit allows, in enqueue order, so a removal and
//! the re-appearance that follows it can never swap.
//!
//! ## Module Organization
//!
//! - `world`: entities, observers, movement and the tick
//! - `combat`: skill requests, damage, death, experience and monster AI
//! - `character`: stat graph, HP/SP pools, executions and progression of one entity
//! - `monster`: monster classes and wandering
//! - `replication`: the per-connection queue and its precedence rules
//! - `client_manager`: connection bookkeeping and request buffering
//! - `network`: the socket tasks and the main loop
//! - `persistence`: periodic character records
//! - `config`: plain settings structs
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         tick_rate: 20,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Runs until a shutdown message arrives:
//!     // - buffers requests from every connection
//!     // - applies them in timestamp order once per tick
//!     // - advances movement, casts and monsters
//!     // - flushes every replication queue to its connection
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Security Considerations
//!
//! Every request is validated against the world before it mutates anything.
//! Invalid requests are logged and dropped; the connection stays up.

pub mod character;
pub mod client_manager;
pub mod combat;
pub mod config;
pub mod monster;
pub mod network;
pub mod persistence;
pub mod replication;
pub mod world;

pub use combat::SkillOutcome;
pub use config::{ServerConfig, WorldConfig};
pub use network::Server;
pub use replication::ReplicationQueue;
pub use world::{ClientId, World};
