//! Wire protocol shared by the tower-battle server and its terminal client.
//!
//! Every message on a connection is one frame: a 4-byte big-endian length
//! followed by that many bytes of JSON encoding an [`Envelope`]
//! (`{"type": <tag>, "data": <payload>}`). The envelope is decoded first and
//! its payload is only interpreted once the tag is known, see
//! [`ClientMessage::from_envelope`] and [`ServerMessage::from_envelope`].

pub mod codec;
pub mod message;

pub use codec::{
    encode_envelope, read_envelope, read_frame, write_envelope, write_frame, MAX_FRAME_SIZE,
};
pub use message::{
    AuthResponse, ClientMessage, Credentials, DeployRequest, Envelope, ErrorMessage, GameEnd,
    GameResult, GameStart, LevelUp, ServerMessage, StateUpdate, TowerKind, TowerView,
};

use std::io;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 9000;
pub const STATUS_OK: &str = "OK";

/// Failures while framing, encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed `{tag}` payload: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown message type `{0}`")]
    UnknownType(String),
}

impl ProtocolError {
    /// True when the peer went away rather than sending something bad.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let eof = ProtocolError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_disconnect());

        let reset = ProtocolError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(reset.is_disconnect());

        let unknown = ProtocolError::UnknownType("ping".to_string());
        assert!(!unknown.is_disconnect());

        let too_large = ProtocolError::FrameTooLarge(MAX_FRAME_SIZE + 1);
        assert!(!too_large.is_disconnect());
    }

    #[test]
    fn test_error_messages_name_the_problem() {
        let err = ProtocolError::UnknownType("ping".to_string());
        assert_eq!(err.to_string(), "unknown message type `ping`");

        let err = ProtocolError::FrameTooLarge(20);
        assert!(err.to_string().contains("20 bytes"));
    }
}
