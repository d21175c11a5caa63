//! Text rendering of server messages.

use crate::game::{ClientGameState, Phase};
use shared::{GameEnd, GameResult, LevelUp, ServerMessage, StateUpdate, TowerView};

pub const HELP: &str = "\
Commands:
  register <username> <secret>
  login <username> <secret>
  deploy <troop>     (or just <troop>)
  help
  quit";

pub fn render_message(message: &ServerMessage) -> String {
    match message {
        ServerMessage::RegisterResp(status) => {
            if status.is_ok() {
                "Registered. Now log in.".to_string()
            } else {
                format!("Registration failed: {}", status.status)
            }
        }
        ServerMessage::LoginResp(status) => {
            if status.is_ok() {
                "Logged in. Waiting for an opponent...".to_string()
            } else {
                format!("Login failed: {}", status.status)
            }
        }
        ServerMessage::MatchPending => "Still waiting for an opponent...".to_string(),
        ServerMessage::GameStart(start) => format!(
            "Match started: player {} vs player {}",
            start.players[0], start.players[1]
        ),
        ServerMessage::StateUpdate(update) => render_state(update),
        ServerMessage::LevelUp(level) => render_level_up(level),
        ServerMessage::GameEnd(end) => render_result(end),
        ServerMessage::Error(error) => format!("Error: {}", error.msg),
    }
}

pub fn render_state(update: &StateUpdate) -> String {
    format!(
        "You: mana {:>2} | {}\nFoe: mana {:>2} | {}",
        update.your_mana,
        render_towers(&update.your_towers),
        update.opponent_mana,
        render_towers(&update.opponent_towers)
    )
}

fn render_towers(towers: &[TowerView]) -> String {
    if towers.is_empty() {
        return "no towers standing".to_string();
    }
    towers
        .iter()
        .map(|t| format!("{} {}", t.name, t.health))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_level_up(level: &LevelUp) -> String {
    format!(
        "Level up! Level {} ({}/{} exp, damage x{:.1})",
        level.level, level.exp, level.next_level, level.multiplier
    )
}

pub fn render_result(end: &GameEnd) -> String {
    let verdict = match end.result {
        GameResult::Win => "You win!",
        GameResult::Loss => "You lose.",
        GameResult::Draw => "Draw.",
    };
    format!("{} +{} exp", verdict, end.exp)
}

pub fn prompt(state: &ClientGameState) -> String {
    match (state.phase, state.mana()) {
        (Phase::InMatch, Some(mana)) => format!("[mana {}]> ", mana),
        (Phase::InMatch, None) => "[match]> ".to_string(),
        (Phase::Waiting, _) => "[waiting]> ".to_string(),
        (Phase::Finished, _) => "[finished]> ".to_string(),
        (Phase::Lobby, _) => "> ".to_string(),
    }
}
