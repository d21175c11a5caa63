//! Match engine.
//!
//! [`state`] holds the synchronous rules, [`engine`] schedules them.

pub mod combat;
pub mod engine;
pub mod level;
pub mod state;

pub use engine::Match;
pub use level::Level;
pub use state::{
    build_towers, DeployRejection, Deployed, EndReason, MatchOutcome, MatchState, Outbox,
    Participant, Side, Tower, Troop, TroopId, TroopStatus,
};
