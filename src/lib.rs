//! Gridclaim Server Library
//!
//! The authoritative core of a real-time, grid-based territory-capture game:
//! chunked spatial partitioning, per-player interest management, trail
//! lifecycle with anti-cheat turn validation, and the capture algorithm that
//! turns a closed trail loop into owned map cells.
//!
//! The byte-level packet codec and the network transport are external
//! collaborators: this crate consumes decoded commands and produces decoded
//! events (see [`net::protocol`]) and never touches raw bytes or sockets.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod anticheat;
