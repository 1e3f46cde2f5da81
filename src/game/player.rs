//! Per-connection player entity: movement, trail lifecycle, and the
//! interest-management bookkeeping (which chunks and players this connection
//! has been told about).

use rustc_hash::FxHashSet;

use crate::game::chunk::{ChunkGrid, ChunkId};
use crate::game::constants::cell;
use crate::util::vec2::{Direction, Vec2};

/// Small positive integer id, unique among currently-connected players.
/// Id 0 is reserved for "self" in outbound events and is never allocated.
pub type PlayerId = u8;

/// Session handshake state
///
/// `New` precedes spawn placement, `Ready` after the initial chunk snapshot is
/// queued, `Playing` once the client has acknowledged readiness twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    New,
    Ready,
    Playing,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub state: PlayerState,

    // Scalar handshake fields, settable in any state
    pub username: String,
    pub color: u8,
    pub pattern: u8,
    pub version: u16,

    // Spatial state, meaningful from `Ready` onward
    pub position: Vec2,
    pub direction: Direction,
    pub current_chunk: ChunkId,
    pub last_position_update: u64,
    /// Last position known to lie inside owned territory, the capture
    /// bridge target
    pub last_safe_position: Vec2,

    /// Waypoints left since the player went outside its territory; empty
    /// while safe
    pub trail: Vec<Vec2>,
    /// Chunks the trail has passed through; a thin trail is visible from
    /// farther away than the body
    pub trail_chunks: FxHashSet<ChunkId>,

    // Interest reconciliation state
    pub known_chunks: FxHashSet<ChunkId>,
    pub known_players: FxHashSet<PlayerId>,

    /// Set when this player's state must be pushed to its audience on the
    /// next tick (direction change, trail transition, anti-cheat correction)
    pub needs_broadcast: bool,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            state: PlayerState::New,
            username: String::new(),
            color: 0,
            pattern: 0,
            version: 0,
            position: Vec2::ZERO,
            direction: Direction::East,
            current_chunk: 0,
            last_position_update: 0,
            last_safe_position: Vec2::ZERO,
            trail: Vec::new(),
            trail_chunks: FxHashSet::default(),
            known_chunks: FxHashSet::default(),
            known_players: FxHashSet::default(),
            needs_broadcast: false,
        }
    }

    /// Owner value this player's cells hold in the chunk grid.
    #[inline]
    pub fn owner_value(&self) -> u8 {
        cell::owner_value(self.id)
    }

    #[inline]
    pub fn has_trail(&self) -> bool {
        !self.trail.is_empty()
    }

    /// Whether the player participates in the simulation tick.
    #[inline]
    pub fn is_spawned(&self) -> bool {
        self.state != PlayerState::New
    }

    /// Integrate position along the facing direction for the time elapsed
    /// since the last update, then snap to the nearest cell to avoid drift.
    pub fn integrate_position(&mut self, now_ms: u64, speed: f64, map_size: u16) {
        let elapsed = now_ms.saturating_sub(self.last_position_update) as f64;
        self.position.advance(self.direction, elapsed * speed);

        let max = (map_size - 1) as f64;
        self.position.x = self.position.x.clamp(0.0, max);
        self.position.y = self.position.y.clamp(0.0, max);
        self.position = self.position.rounded();

        self.last_position_update = now_ms;
    }

    /// Change facing direction. While trailing, the turn point becomes a new
    /// polyline vertex first.
    pub fn set_direction(&mut self, direction: Direction) {
        if self.has_trail() {
            self.trail.push(self.position);
        }
        self.direction = direction;
    }

    /// Begin trailing: the current position is the first waypoint and the
    /// trail-chunk set restarts from the current chunk.
    pub fn start_trail(&mut self) {
        self.trail.clear();
        self.trail.push(self.position);
        self.trail_chunks.clear();
        self.trail_chunks.insert(self.current_chunk);
    }

    /// Drop the trail entirely, once the enclosed area has been committed.
    pub fn end_trail(&mut self) {
        self.trail.clear();
        self.trail_chunks.clear();
    }

    /// True when the player stands on a cell it does not own.
    pub fn is_outside(&self, grid: &ChunkGrid) -> bool {
        let (x, y) = self.position.cell();
        grid.owner_at(x, y) != self.owner_value()
    }

    /// Chunk visibility: anything within the neighbor radius of the chunk the
    /// player currently stands in.
    #[inline]
    pub fn can_see_chunk(&self, grid: &ChunkGrid, chunk: ChunkId) -> bool {
        grid.are_neighbors(self.current_chunk, chunk)
    }

    /// Player visibility. A trailing player is visible as soon as any chunk
    /// its trail touched neighbors the viewer's chunk; otherwise visibility
    /// follows the body chunk.
    pub fn can_see_player(&self, grid: &ChunkGrid, other: &Player) -> bool {
        if other.has_trail() {
            other
                .trail_chunks
                .iter()
                .any(|&chunk| self.can_see_chunk(grid, chunk))
        } else {
            self.can_see_chunk(grid, other.current_chunk)
        }
    }

    #[inline]
    pub fn knows_player(&self, other: PlayerId) -> bool {
        self.known_players.contains(&other)
    }

    #[inline]
    pub fn knows_chunk(&self, chunk: ChunkId) -> bool {
        self.known_chunks.contains(&chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::chunk::Rect;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(600, 12, 2)
    }

    fn spawned_player(id: PlayerId, x: f64, y: f64, grid: &ChunkGrid) -> Player {
        let mut player = Player::new(id);
        player.state = PlayerState::Playing;
        player.position = Vec2::new(x, y);
        player.current_chunk = grid.chunk_at(x, y);
        player
    }

    #[test]
    fn test_integrate_position_moves_and_rounds() {
        let mut player = Player::new(1);
        player.position = Vec2::new(100.0, 100.0);
        player.direction = Direction::East;
        player.last_position_update = 0;

        // 167 ms at 0.006 cells/ms is 1.002 cells, snapped to one cell
        player.integrate_position(167, 0.006, 600);
        assert_eq!(player.position, Vec2::new(101.0, 100.0));
        assert_eq!(player.last_position_update, 167);
    }

    #[test]
    fn test_integrate_position_clamps_to_map() {
        let mut player = Player::new(1);
        player.position = Vec2::new(598.0, 0.0);
        player.direction = Direction::East;
        player.last_position_update = 0;

        player.integrate_position(10_000, 0.006, 600);
        assert_eq!(player.position, Vec2::new(599.0, 0.0));

        player.direction = Direction::North;
        player.integrate_position(20_000, 0.006, 600);
        assert_eq!(player.position, Vec2::new(599.0, 0.0));
    }

    #[test]
    fn test_set_direction_appends_waypoint_only_while_trailing() {
        let grid = grid();
        let mut player = spawned_player(1, 50.0, 50.0, &grid);

        player.set_direction(Direction::South);
        assert!(player.trail.is_empty());

        player.start_trail();
        player.position = Vec2::new(50.0, 53.0);
        player.set_direction(Direction::East);
        assert_eq!(player.trail, vec![Vec2::new(50.0, 50.0), Vec2::new(50.0, 53.0)]);
    }

    #[test]
    fn test_trail_lifecycle() {
        let grid = grid();
        let mut player = spawned_player(1, 50.0, 50.0, &grid);

        player.start_trail();
        assert!(player.has_trail());
        assert_eq!(player.trail, vec![Vec2::new(50.0, 50.0)]);
        assert!(player.trail_chunks.contains(&player.current_chunk));

        player.end_trail();
        assert!(!player.has_trail());
        assert!(player.trail_chunks.is_empty());
    }

    #[test]
    fn test_is_outside_follows_ownership() {
        let mut grid = grid();
        let mut player = spawned_player(3, 100.0, 100.0, &grid);
        assert!(player.is_outside(&grid));

        grid.fill_rect(player.owner_value(), Rect::new(99, 99, 3, 3));
        assert!(!player.is_outside(&grid));

        player.position = Vec2::new(103.0, 100.0);
        assert!(player.is_outside(&grid));
    }

    #[test]
    fn test_can_see_chunk_radius() {
        let grid = grid();
        let player = spawned_player(1, 300.0, 300.0, &grid);

        assert!(player.can_see_chunk(&grid, player.current_chunk));
        // two chunks away on both axes is still visible
        assert!(player.can_see_chunk(&grid, grid.chunk_at(276.0, 276.0)));
        // three chunks away is not
        assert!(!player.can_see_chunk(&grid, grid.chunk_at(264.0, 300.0)));
    }

    #[test]
    fn test_trailing_player_visible_through_trail_chunks() {
        let grid = grid();
        let viewer = spawned_player(1, 300.0, 300.0, &grid);
        let mut other = spawned_player(2, 420.0, 300.0, &grid);

        // far away and not trailing: invisible
        assert!(!viewer.can_see_player(&grid, &other));

        // a trail chunk within the viewer's radius makes it visible
        other.start_trail();
        other.trail_chunks.insert(grid.chunk_at(324.0, 300.0));
        assert!(viewer.can_see_player(&grid, &other));

        // trail gone: invisible again
        other.end_trail();
        assert!(!viewer.can_see_player(&grid, &other));
    }
}
