//! Runtime configuration, loaded from the environment with sane defaults.

use crate::game::constants::{claim, map, movement, session};

/// Simulation configuration
///
/// Every constant the core depends on is provided here at construction time;
/// nothing below is read from globals by the simulation itself.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Side length of the square map in cells
    pub map_size: u16,
    /// Side length of one chunk in cells; must divide `map_size`
    pub chunk_size: u16,
    /// Chebyshev radius of the chunk visibility neighborhood
    pub neighbor_distance: u16,
    /// Movement speed in cells per millisecond
    pub speed: f64,
    /// Simulation tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Turn-acceptance tolerance in cells
    pub turn_tolerance: f64,
    /// Side length of the rectangle claimed around a fresh spawn
    pub spawn_claim_size: u16,
    /// Maximum per-axis spawn offset from the map center, in cells
    pub spawn_jitter: u16,
    /// Inbound command queue capacity
    pub command_buffer_capacity: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map_size: map::SIZE,
            chunk_size: map::CHUNK_SIZE,
            neighbor_distance: map::NEIGHBOR_DISTANCE,
            speed: movement::GLOBAL_SPEED,
            tick_interval_ms: movement::TICK_INTERVAL_MS,
            turn_tolerance: claim::TURN_TOLERANCE,
            spawn_claim_size: claim::SPAWN_RECT,
            spawn_jitter: claim::SPAWN_JITTER,
            command_buffer_capacity: session::COMMAND_BUFFER_CAPACITY,
        }
    }
}

impl GameConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("MAP_SIZE") {
            if let Ok(parsed) = size.parse::<u16>() {
                config.map_size = parsed;
            } else {
                tracing::warn!("Invalid MAP_SIZE '{}', using default", size);
            }
        }

        if let Ok(size) = std::env::var("CHUNK_SIZE") {
            if let Ok(parsed) = size.parse::<u16>() {
                config.chunk_size = parsed;
            } else {
                tracing::warn!("Invalid CHUNK_SIZE '{}', using default", size);
            }
        }

        if let Ok(distance) = std::env::var("NEIGHBOR_DISTANCE") {
            if let Ok(parsed) = distance.parse::<u16>() {
                config.neighbor_distance = parsed;
            } else {
                tracing::warn!("Invalid NEIGHBOR_DISTANCE '{}', using default", distance);
            }
        }

        if let Ok(interval) = std::env::var("TICK_INTERVAL_MS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                if parsed > 0 {
                    config.tick_interval_ms = parsed;
                } else {
                    tracing::warn!("TICK_INTERVAL_MS must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid TICK_INTERVAL_MS '{}', using default", interval);
            }
        }

        if let Ok(tolerance) = std::env::var("TURN_TOLERANCE") {
            if let Ok(parsed) = tolerance.parse::<f64>() {
                if parsed >= 0.0 && parsed.is_finite() {
                    config.turn_tolerance = parsed;
                } else {
                    tracing::warn!("TURN_TOLERANCE must be >= 0, using default");
                }
            } else {
                tracing::warn!("Invalid TURN_TOLERANCE '{}', using default", tolerance);
            }
        }

        if let Ok(size) = std::env::var("SPAWN_CLAIM_SIZE") {
            if let Ok(parsed) = size.parse::<u16>() {
                if parsed > 0 {
                    config.spawn_claim_size = parsed;
                } else {
                    tracing::warn!("SPAWN_CLAIM_SIZE must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid SPAWN_CLAIM_SIZE '{}', using default", size);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.map_size == 0 {
            return Err("map_size cannot be 0".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size cannot be 0".to_string());
        }
        if self.map_size % self.chunk_size != 0 {
            return Err(format!(
                "map_size {} must be a multiple of chunk_size {}",
                self.map_size, self.chunk_size
            ));
        }
        let per_side = (self.map_size / self.chunk_size) as usize;
        if per_side * per_side > u16::MAX as usize {
            return Err("chunk count does not fit a 16-bit chunk id".to_string());
        }
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return Err("speed must be positive and finite".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms cannot be 0".to_string());
        }
        if self.turn_tolerance < 0.0 || !self.turn_tolerance.is_finite() {
            return Err("turn_tolerance must be non-negative and finite".to_string());
        }
        if self.spawn_claim_size == 0 || self.spawn_claim_size > self.map_size {
            return Err("spawn_claim_size must be in 1..=map_size".to_string());
        }
        if self.command_buffer_capacity == 0 {
            return Err("command_buffer_capacity cannot be 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GameConfig::default();
        assert_eq!(config.map_size, 600);
        assert_eq!(config.chunk_size, 12);
        assert_eq!(config.neighbor_distance, 2);
        assert_eq!(config.tick_interval_ms, 167);
        assert_eq!(config.spawn_claim_size, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unaligned_chunk_size() {
        let config = GameConfig {
            map_size: 600,
            chunk_size: 7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let config = GameConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_tolerance() {
        let config = GameConfig {
            turn_tolerance: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_spawn_claim() {
        let config = GameConfig {
            spawn_claim_size: 601,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
