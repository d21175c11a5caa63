//! Envelope and typed messages.
//!
//! The envelope tag is an open string. Known tags map onto [`ClientMessage`]
//! (client to server) or [`ServerMessage`] (server to client), each variant
//! carrying its own payload struct.

use crate::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REGISTER: &str = "register";
pub const LOGIN: &str = "login";
pub const DEPLOY: &str = "deploy";
pub const REGISTER_RESP: &str = "register_resp";
pub const LOGIN_RESP: &str = "login_resp";
pub const MATCH_PENDING: &str = "match_pending";
pub const GAME_START: &str = "game_start";
pub const STATE_UPDATE: &str = "state_update";
pub const LEVEL_UP: &str = "level_up";
pub const GAME_END: &str = "game_end";
pub const ERROR: &str = "error";

/// The PDU: one per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(alias = "password")]
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub troop: String,
}

/// `register_resp` / `login_resp` body: `"OK"` or `"ERR:<Code>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub status: String,
}

impl AuthResponse {
    pub fn ok() -> Self {
        Self {
            status: crate::STATUS_OK.to_string(),
        }
    }

    pub fn err(code: &str) -> Self {
        Self {
            status: format!("ERR:{}", code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == crate::STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStart {
    pub players: [u32; 2],
}

/// Role of a tower. Decides experience on destruction and the heal ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TowerKind {
    King,
    Princess,
    Guard,
    Cannon,
}

impl TowerKind {
    pub fn is_king(self) -> bool {
        self == TowerKind::King
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerView {
    pub name: String,
    pub kind: TowerKind,
    pub health: i32,
}

/// Snapshot from the recipient's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub your_mana: u32,
    pub opponent_mana: u32,
    pub your_towers: Vec<TowerView>,
    pub opponent_towers: Vec<TowerView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub level: u32,
    pub exp: u32,
    pub next_level: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEnd {
    pub result: GameResult,
    pub exp: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub msg: String,
}

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Register(Credentials),
    Login(Credentials),
    Deploy(DeployRequest),
}

impl ClientMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            ClientMessage::Register(_) => REGISTER,
            ClientMessage::Login(_) => LOGIN,
            ClientMessage::Deploy(_) => DEPLOY,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let data = match self {
            ClientMessage::Register(creds) | ClientMessage::Login(creds) => {
                serde_json::to_value(creds)?
            }
            ClientMessage::Deploy(req) => serde_json::to_value(req)?,
        };
        Ok(Envelope::new(self.tag(), data))
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { kind, data } = envelope;
        match kind.as_str() {
            REGISTER => Ok(ClientMessage::Register(decode(&kind, data)?)),
            LOGIN => Ok(ClientMessage::Login(decode(&kind, data)?)),
            DEPLOY => Ok(ClientMessage::Deploy(decode(&kind, data)?)),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    RegisterResp(AuthResponse),
    LoginResp(AuthResponse),
    MatchPending,
    GameStart(GameStart),
    StateUpdate(StateUpdate),
    LevelUp(LevelUp),
    GameEnd(GameEnd),
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn error(msg: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage { msg: msg.into() })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ServerMessage::RegisterResp(_) => REGISTER_RESP,
            ServerMessage::LoginResp(_) => LOGIN_RESP,
            ServerMessage::MatchPending => MATCH_PENDING,
            ServerMessage::GameStart(_) => GAME_START,
            ServerMessage::StateUpdate(_) => STATE_UPDATE,
            ServerMessage::LevelUp(_) => LEVEL_UP,
            ServerMessage::GameEnd(_) => GAME_END,
            ServerMessage::Error(_) => ERROR,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let data = match self {
            ServerMessage::RegisterResp(resp) | ServerMessage::LoginResp(resp) => {
                serde_json::to_value(resp)?
            }
            ServerMessage::MatchPending => Value::Object(Default::default()),
            ServerMessage::GameStart(start) => serde_json::to_value(start)?,
            ServerMessage::StateUpdate(state) => serde_json::to_value(state)?,
            ServerMessage::LevelUp(level) => serde_json::to_value(level)?,
            ServerMessage::GameEnd(end) => serde_json::to_value(end)?,
            ServerMessage::Error(err) => serde_json::to_value(err)?,
        };
        Ok(Envelope::new(self.tag(), data))
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { kind, data } = envelope;
        match kind.as_str() {
            REGISTER_RESP => Ok(ServerMessage::RegisterResp(decode(&kind, data)?)),
            LOGIN_RESP => Ok(ServerMessage::LoginResp(decode(&kind, data)?)),
            MATCH_PENDING => Ok(ServerMessage::MatchPending),
            GAME_START => Ok(ServerMessage::GameStart(decode(&kind, data)?)),
            STATE_UPDATE => Ok(ServerMessage::StateUpdate(decode(&kind, data)?)),
            LEVEL_UP => Ok(ServerMessage::LevelUp(decode(&kind, data)?)),
            GAME_END => Ok(ServerMessage::GameEnd(decode(&kind, data)?)),
            ERROR => Ok(ServerMessage::Error(decode(&kind, data)?)),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }
}

fn decode<T: DeserializeOwned>(tag: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload {
        tag: tag.to_string(),
        source,
    })
}
