//! Decoded boundary protocol: the commands the core consumes and the events
//! it produces.
//!
//! The byte-level codec and the transport live outside the core; these types
//! are the language-neutral contract with that layer. Each outbound event is
//! addressed to one specific connection, and player ids inside events are
//! remapped so that id 0 always denotes the recipient's own player.

use serde::{Deserialize, Serialize};

use crate::game::player::PlayerId;
use crate::util::vec2::{Direction, Vec2};

/// Messages from client to server, already decoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Display name; accepted in any session state
    SetUsername { name: String },
    /// Skin selection; accepted in any session state
    SetSkin { color: u8, pattern: u8 },
    /// Client protocol version
    SetVersion { version: u16 },
    /// Join handshake step; sent twice per session
    Ready,
    /// Ask for the sender's own current trail
    RequestTrail,
    /// Turn request with the client-claimed turn position; the direction is
    /// the raw wire value, validated server-side
    UpdateDirection { direction: u8, claimed: Vec2 },
    /// Latency probe
    Ping,
    /// Connection-closed signal from the transport
    Disconnected,
}

/// Messages from server to client, to be encoded by the transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    Pong,
    /// Handshake acknowledgment
    Ready,
    /// Full owner-grid snapshot of one chunk, row-major
    ChunkSnapshot {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        cells: Vec<u8>,
    },
    /// A rectangle of cells changed owner
    FillArea {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color: u8,
        pattern: u8,
    },
    PlayerIntroduced {
        player: PlayerId,
        name: String,
    },
    PlayerSkin {
        player: PlayerId,
        color: u8,
        pattern: u8,
    },
    PlayerPosition {
        player: PlayerId,
        position: Vec2,
        direction: Direction,
    },
    PlayerTrail {
        player: PlayerId,
        waypoints: Vec<Vec2>,
    },
    PlayerRemoved {
        player: PlayerId,
    },
}

/// Map a subject id to the recipient's view: 0 for the recipient's own
/// player, the real id otherwise. This redirection is the core's job, not
/// the codec's.
#[inline]
pub fn relative_id(recipient: PlayerId, subject: PlayerId) -> PlayerId {
    if recipient == subject {
        0
    } else {
        subject
    }
}
