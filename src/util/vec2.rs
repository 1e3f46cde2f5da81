//! 2D grid geometry: sub-cell positions and the four cardinal directions.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A movement direction on the cell grid.
///
/// The discriminants are the wire values clients send; raw bytes are decoded
/// through [`Direction::from_raw`] rather than trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    East = 0,
    South = 1,
    West = 2,
    North = 3,
}

impl Direction {
    /// Decode a raw wire value; `None` for anything outside 0..=3.
    #[inline]
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Direction::East),
            1 => Some(Direction::South),
            2 => Some(Direction::West),
            3 => Some(Direction::North),
            _ => None,
        }
    }

    /// Unit cell offset for one step in this direction.
    #[inline]
    pub fn delta(self) -> (f64, f64) {
        match self {
            Direction::East => (1.0, 0.0),
            Direction::South => (0.0, 1.0),
            Direction::West => (-1.0, 0.0),
            Direction::North => (0.0, -1.0),
        }
    }

    #[inline]
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::East | Direction::West)
    }
}

/// 2D position with sub-cell precision
///
/// Positions are kept as reals for smooth movement integration and rounded to
/// integer cell coordinates for every grid lookup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Component-wise round to the nearest cell center.
    #[inline]
    pub fn rounded(&self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
        }
    }

    /// The integer cell containing this position.
    #[inline]
    pub fn cell(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }

    #[inline]
    pub fn manhattan_distance(&self, other: Vec2) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    #[inline]
    pub fn euclidean_distance(&self, other: Vec2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Move in place along a cardinal direction; exactly one axis changes.
    #[inline]
    pub fn advance(&mut self, direction: Direction, distance: f64) {
        let (dx, dy) = direction.delta();
        self.x += dx * distance;
        self.y += dy * distance;
    }

    /// Signed displacement from `self` to `other`, measured along `direction`.
    ///
    /// Positive means `other` lies ahead of `self` in the facing direction,
    /// negative means behind. The perpendicular axis is ignored.
    #[inline]
    pub fn distance_in_direction(&self, other: Vec2, direction: Direction) -> f64 {
        match direction {
            Direction::East => other.x - self.x,
            Direction::South => other.y - self.y,
            Direction::West => self.x - other.x,
            Direction::North => self.y - other.y,
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}
