//! Error taxonomy for the room server.
//!
//! Only [`GameError::Io`] on the listening socket is fatal. Everything else is
//! handled locally: lost connections route through `leave`, rejected joins are
//! answered on the same connection, malformed packets are logged and dropped,
//! and out-of-turn actions are ignored.

use shared::CodecError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("connection to {addr} lost")]
    ConnectionLost { addr: SocketAddr },

    #[error("name `{name}` is already taken")]
    DuplicateName { name: String },

    #[error("name `{name}` is not allowed: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] CodecError),

    #[error("{action} from {addr} ignored: not allowed right now")]
    OutOfTurnAction {
        addr: SocketAddr,
        action: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type GameResult<T> = Result<T, GameError>;
