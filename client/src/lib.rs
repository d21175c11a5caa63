//! # Tower Battle Client Library
//!
//! Terminal client for the tower battle server. It reads commands from
//! standard input, sends them as framed JSON messages and prints every server
//! message as text.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Turns typed lines into commands: `register`, `login`, `deploy <troop>` (or
//! a bare troop key), `help` and `quit`.
//!
//! ### Game Module (`game`)
//! Client-side view of the session, updated from server messages: lobby,
//! waiting, in match or finished, plus the latest state snapshot, level and
//! result.
//!
//! ### Network Module (`network`)
//! Owns the TCP connection. A background task decodes incoming frames into a
//! channel so the interactive loop can race server messages against stdin.
//!
//! ### Rendering Module (`rendering`)
//! Pure formatting of server messages and the prompt.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:9000").await?;
//!     client.run().await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
