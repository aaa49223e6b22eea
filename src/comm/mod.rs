//! Wire-level envelopes
//!
//! A [`CommEvent`] is the only thing that crosses a LASH socket. Application
//! [`Event`]s and [`Config`]s travel nested inside it.
//!
//! Wire format (after the transport length prefix, see [`crate::transport`]):
//! ```text
//! [4 bytes: tag (u32 BE)]
//! [tag-specific payload]
//! ```

mod codec;

use std::path::PathBuf;

use uuid::Uuid;

use crate::config::Config;
use crate::event::Event;
use crate::protocol::Protocol;
use crate::types::ClientFlags;

pub use codec::{decode, encode};

/// Low-level handshake version carried by every Connect message
///
/// Bumped on incompatible changes to the framing or the Connect layout itself.
pub const COMM_PROTOCOL_VERSION: u32 = 2;

/// Stable wire tags
pub mod tag {
    pub const CONNECT: u32 = 1;
    /// Retired interface-connect handshake, never produced
    pub const IFACE_CONNECT: u32 = 2;
    pub const EVENT: u32 = 3;
    pub const CONFIG: u32 = 4;
    pub const EXEC: u32 = 5;
    pub const PING: u32 = 6;
    pub const PONG: u32 = 7;
    pub const CLOSE: u32 = 8;
    pub const PROTOCOL_MISMATCH: u32 = 9;
}

/// Parameters a client sends when it connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub protocol_version: Protocol,
    pub flags: ClientFlags,
    pub project: Option<String>,
    pub working_dir: String,
    pub class: String,
    pub id: Uuid,
    pub argv: Vec<String>,
}

/// A program launch request sent from the daemon to its loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecParams {
    pub flags: ClientFlags,
    pub id: Uuid,
    pub working_dir: PathBuf,
    pub server: String,
    pub project: String,
    pub argv: Vec<String>,
}

impl ExecParams {
    /// Program to execute (`argv[0]`)
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

/// Transport envelope
#[derive(Debug, Clone, PartialEq)]
pub enum CommEvent {
    Connect(ConnectParams),
    Event(Event),
    Config(Config),
    ProtocolMismatch(Protocol),
    Exec(ExecParams),
    Close,
    Ping,
    Pong,
}

impl CommEvent {
    pub fn tag(&self) -> u32 {
        match self {
            Self::Connect(_) => tag::CONNECT,
            Self::Event(_) => tag::EVENT,
            Self::Config(_) => tag::CONFIG,
            Self::ProtocolMismatch(_) => tag::PROTOCOL_MISMATCH,
            Self::Exec(_) => tag::EXEC,
            Self::Close => tag::CLOSE,
            Self::Ping => tag::PING,
            Self::Pong => tag::PONG,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Event(_) => "event",
            Self::Config(_) => "config",
            Self::ProtocolMismatch(_) => "protocol-mismatch",
            Self::Exec(_) => "exec",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}
