//! Server-side validation of client turn commands.
//!
//! Clients report the position at which they claim to have turned; the server
//! accepts the claim only when it lies within a small window around its own
//! simulated position, measured along the player's current direction.

use crate::game::constants::claim;
use crate::util::vec2::{Direction, Vec2};

/// Violations detected when validating a direction update
#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnViolation {
    #[error("invalid direction value: {0}")]
    InvalidDirection(u8),
    #[error("claimed turn position is not finite")]
    NonFiniteClaim,
    #[error("claimed turn is {0:.2} cells ahead of the simulation")]
    TurnInFuture(f64),
    #[error("claimed turn is {0:.2} cells behind the simulation")]
    TurnTooOld(f64),
}

/// Configuration for turn validation
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Accepted distance, in cells, between the claimed turn position and the
    /// server's simulated position along the current direction of travel
    pub turn_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            turn_tolerance: claim::TURN_TOLERANCE,
        }
    }
}

/// Validator for client direction updates
pub struct TurnValidator {
    config: ValidationConfig,
}

impl TurnValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a direction update against the server's view of the player.
    ///
    /// `server_position` and `facing` are the authoritative position and
    /// direction of travel; `claimed` is where the client says it turned.
    /// On acceptance returns the decoded direction; the caller adopts the
    /// claimed position. On rejection nothing may be mutated.
    pub fn validate(
        &self,
        raw_direction: u8,
        server_position: Vec2,
        facing: Direction,
        claimed: Vec2,
    ) -> Result<Direction, TurnViolation> {
        let direction =
            Direction::from_raw(raw_direction).ok_or(TurnViolation::InvalidDirection(raw_direction))?;

        if !claimed.is_finite() {
            return Err(TurnViolation::NonFiniteClaim);
        }

        let distance = server_position.distance_in_direction(claimed, facing);
        if distance > self.config.turn_tolerance {
            return Err(TurnViolation::TurnInFuture(distance));
        }
        if distance < -self.config.turn_tolerance {
            return Err(TurnViolation::TurnTooOld(-distance));
        }

        Ok(direction)
    }
}

impl Default for TurnValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
