//! # Tower Battle Server Library
//!
//! Authoritative server for a two-player tower battle game. Players connect
//! over TCP, register or log in, wait in a matchmaking queue and are then
//! paired into matches where they spend regenerating mana to deploy troops
//! against each other's towers.
//!
//! ## Connection Lifecycle
//!
//! 1. The [`network::Server`] accepts a TCP connection and assigns it an id.
//! 2. A [`session`] task handles `register` / `login`. A successful login
//!    reserves a slot in the bounded matchmaking queue and starts a
//!    `match_pending` heartbeat.
//! 3. The [`matchmaker`] pairs queued players in arrival order, sends
//!    `game_start` to both and spawns a [`game::Match`].
//! 4. When the match ends both players receive `game_end`, their progress is
//!    written to the [`accounts`] store and the connections are closed.
//!
//! ## Match Simulation
//!
//! A match is a handful of concurrent activities sharing one locked
//! [`game::MatchState`]:
//! - **Tick**: regenerates mana, lets towers shoot the front troop of the
//!   opposing side and broadcasts a per-player `state_update`
//! - **Deploy consumer**: validates and applies `deploy` requests
//! - **Troop attacks**: one task per deployed troop, hitting the opponent's
//!   next surviving tower until the troop dies
//! - **Receive tasks**: one per connection; a read failure forfeits the match
//!
//! The first king tower to fall decides the match. Otherwise the match ends on
//! timeout and the side with more surviving towers wins.
//!
//! ## Module Organization
//!
//! - `config`: tunable game parameters, loaded from an optional JSON file
//! - `specs`: troop and tower stat tables
//! - `accounts`: persistent player accounts
//! - `connection`: framed reader plus queued writer per client
//! - `session`: authentication and the pending heartbeat
//! - `matchmaker`: FIFO pairing and the registry of running matches
//! - `game`: combat rules, leveling, match state and the async runner
//! - `network`: the TCP accept loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::accounts::{AccountDefaults, AccountStore};
//! use server::config::GameConfig;
//! use server::network::Server;
//! use server::specs::SpecCatalog;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(GameConfig::default());
//!     let catalog = Arc::new(SpecCatalog::load(
//!         "specs.json",
//!         &[config.guard_tower.as_str(), config.king_tower.as_str()],
//!     )?);
//!     let store = Arc::new(AccountStore::load("accounts.json", AccountDefaults::default())?);
//!
//!     let server = Server::bind("127.0.0.1:9000", store, catalog, config).await?;
//!     server.run().await
//! }
//! ```

pub mod accounts;
pub mod config;
pub mod connection;
pub mod game;
pub mod matchmaker;
pub mod network;
pub mod session;
pub mod specs;
