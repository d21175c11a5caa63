use shared::{GameEnd, LevelUp, ServerMessage, StateUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connected, not logged in.
    Lobby,
    /// Logged in and queued for a match.
    Waiting,
    InMatch,
    Finished,
}

/// What the client knows about its session, built from server messages.
#[derive(Debug, Clone)]
pub struct ClientGameState {
    pub phase: Phase,
    pub players: Option<[u32; 2]>,
    pub last_update: Option<StateUpdate>,
    pub level: Option<LevelUp>,
    pub result: Option<GameEnd>,
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Lobby,
            players: None,
            last_update: None,
            level: None,
            result: None,
        }
    }

    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::LoginResp(status) if status.is_ok() => {
                self.phase = Phase::Waiting;
            }
            ServerMessage::GameStart(start) => {
                self.phase = Phase::InMatch;
                self.players = Some(start.players);
                self.last_update = None;
                self.result = None;
            }
            ServerMessage::StateUpdate(update) => {
                self.last_update = Some(update.clone());
            }
            ServerMessage::LevelUp(level) => {
                self.level = Some(level.clone());
            }
            ServerMessage::GameEnd(end) => {
                self.phase = Phase::Finished;
                self.result = Some(end.clone());
            }
            _ => {}
        }
    }

    pub fn mana(&self) -> Option<u32> {
        self.last_update.as_ref().map(|u| u.your_mana)
    }
}
