//! Gameplay constants grouped by concern.
//!
//! Everything the simulation is parameterized on is mirrored in
//! [`crate::config::GameConfig`]; the values here are the defaults.

/// Map and spatial partitioning constants
pub mod map {
    /// Side length of the square map in cells
    pub const SIZE: u16 = 600;
    /// Side length of one chunk in cells
    pub const CHUNK_SIZE: u16 = 12;
    /// Chebyshev radius of the mutual-visibility neighborhood, in chunks
    pub const NEIGHBOR_DISTANCE: u16 = 2;
}

/// Movement constants
pub mod movement {
    /// Movement speed in cells per millisecond
    pub const GLOBAL_SPEED: f64 = 0.006;
    /// Simulation tick period in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 167;
}

/// Territory claiming constants
pub mod claim {
    /// Side length of the starting rectangle claimed around the spawn point
    pub const SPAWN_RECT: u16 = 5;
    /// Maximum per-axis offset of the spawn point from the map center, in cells
    pub const SPAWN_JITTER: u16 = 20;
    /// Accepted distance between a claimed turn position and the simulated
    /// position, in cells (tuned; the window has historically sat at 1-2)
    pub const TURN_TOLERANCE: f64 = 2.0;
}

/// Cell owner-value encoding
///
/// A map cell stores one byte: 0 is the out-of-bounds sentinel (never stored
/// in a chunk), 1 is unclaimed, and everything above encodes a player id.
pub mod cell {
    /// Sentinel returned for lookups outside the map
    pub const VOID: u8 = 0;
    /// Unclaimed territory
    pub const NEUTRAL: u8 = 1;
    /// First owner value; a player's cells hold `id + OWNER_BASE`
    pub const OWNER_BASE: u8 = 2;

    /// Owner value stored in cells claimed by `id`.
    #[inline]
    pub fn owner_value(id: u8) -> u8 {
        id + OWNER_BASE
    }
}

/// Player and session limits
pub mod session {
    /// Highest allocatable player id; bounded by the one-byte cell encoding
    /// (`id + 2 <= 255`) and id 0 being reserved for "self" in outbound events
    pub const MAX_PLAYERS: usize = 253;
    /// Command queue capacity shared by all connection handlers
    pub const COMMAND_BUFFER_CAPACITY: usize = 1024;
    /// Protocol version expected from clients
    pub const PROTOCOL_VERSION: u16 = 28;
}
