//! Chunk grid: spatial partitioning of the map into fixed-size cell blocks.
//!
//! Each chunk owns a per-cell owner-id grid and a precomputed set of
//! neighboring chunks (everything within a fixed Chebyshev radius). Chunks are
//! created once at game start, mutated by fills, and never destroyed.

use smallvec::SmallVec;

use crate::game::constants::cell;
use crate::game::player::PlayerId;

/// Flattened row-major chunk index
pub type ChunkId = u16;

/// Axis-aligned cell rectangle in map space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> u16 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> u16 {
        self.y + self.height
    }
}

/// One fixed-size block of map cells and their owner values
#[derive(Debug, Clone)]
pub struct Chunk {
    size: u16,
    cells: Vec<u8>,
}

impl Chunk {
    fn new(size: u16) -> Self {
        Self {
            size,
            cells: vec![cell::NEUTRAL; size as usize * size as usize],
        }
    }

    /// Row-major owner values, the `ChunkSnapshot` payload.
    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn owner_at(&self, local_x: u16, local_y: u16) -> u8 {
        self.cells[local_x as usize + local_y as usize * self.size as usize]
    }

    /// Set every cell of a rectangle to `owner`.
    ///
    /// The rectangle is in this chunk's local coordinate space and must
    /// already be clipped to it; the caller splits map-space rectangles.
    pub fn fill_area(&mut self, owner: u8, x: u16, y: u16, width: u16, height: u16) {
        debug_assert!(x + width <= self.size && y + height <= self.size);
        for row in y..y + height {
            let start = x as usize + row as usize * self.size as usize;
            self.cells[start..start + width as usize].fill(owner);
        }
    }

    /// Reset every cell owned by `owner` back to neutral.
    ///
    /// Returns whether anything changed, so callers know whether subscribers
    /// must be re-sent this chunk.
    pub fn remove_player(&mut self, owner: u8) -> bool {
        let mut changed = false;
        for value in &mut self.cells {
            if *value == owner {
                *value = cell::NEUTRAL;
                changed = true;
            }
        }
        changed
    }
}

/// The whole map: a flat arena of chunks plus their static neighbor sets
///
/// Players and chunks refer to each other by id only; the grid never holds
/// references back into the player registry.
#[derive(Debug, Clone)]
pub struct ChunkGrid {
    map_size: u16,
    chunk_size: u16,
    per_side: u16,
    chunks: Vec<Chunk>,
    neighbors: Vec<SmallVec<[ChunkId; 25]>>,
}

impl ChunkGrid {
    pub fn new(map_size: u16, chunk_size: u16, neighbor_distance: u16) -> Self {
        assert!(chunk_size > 0 && map_size % chunk_size == 0);
        let per_side = map_size / chunk_size;
        let count = per_side as usize * per_side as usize;

        let chunks = (0..count).map(|_| Chunk::new(chunk_size)).collect();

        let mut neighbors = Vec::with_capacity(count);
        let distance = neighbor_distance as i32;
        for cy in 0..per_side as i32 {
            for cx in 0..per_side as i32 {
                let mut set: SmallVec<[ChunkId; 25]> = SmallVec::new();
                for ny in cy - distance..=cy + distance {
                    for nx in cx - distance..=cx + distance {
                        if nx >= 0 && ny >= 0 && nx < per_side as i32 && ny < per_side as i32 {
                            set.push((nx + ny * per_side as i32) as ChunkId);
                        }
                    }
                }
                neighbors.push(set);
            }
        }

        Self {
            map_size,
            chunk_size,
            per_side,
            chunks,
            neighbors,
        }
    }

    #[inline]
    pub fn map_size(&self) -> u16 {
        self.map_size
    }

    #[inline]
    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The chunk containing the cell at rounded map coordinates.
    ///
    /// Panics on out-of-map input; callers clamp positions upstream.
    pub fn chunk_at(&self, x: f64, y: f64) -> ChunkId {
        let cx = x.round() as i64;
        let cy = y.round() as i64;
        assert!(
            cx >= 0 && cy >= 0 && cx < self.map_size as i64 && cy < self.map_size as i64,
            "position ({x}, {y}) out of map bounds"
        );
        let cx = cx as u16 / self.chunk_size;
        let cy = cy as u16 / self.chunk_size;
        cx + cy * self.per_side
    }

    /// All chunks within the visibility radius of `id`, itself included.
    #[inline]
    pub fn neighbors(&self, id: ChunkId) -> &[ChunkId] {
        &self.neighbors[id as usize]
    }

    #[inline]
    pub fn are_neighbors(&self, a: ChunkId, b: ChunkId) -> bool {
        self.neighbors[a as usize].contains(&b)
    }

    #[inline]
    pub fn chunk(&self, id: ChunkId) -> &Chunk {
        &self.chunks[id as usize]
    }

    /// Map-space origin cell of a chunk.
    #[inline]
    pub fn chunk_origin(&self, id: ChunkId) -> (u16, u16) {
        let cx = id % self.per_side;
        let cy = id / self.per_side;
        (cx * self.chunk_size, cy * self.chunk_size)
    }

    /// Owner value of a single cell; `cell::VOID` outside the map.
    pub fn owner_at(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.map_size as i32 || y >= self.map_size as i32 {
            return cell::VOID;
        }
        let id = (x as u16 / self.chunk_size) + (y as u16 / self.chunk_size) * self.per_side;
        let chunk = &self.chunks[id as usize];
        chunk.owner_at(x as u16 % self.chunk_size, y as u16 % self.chunk_size)
    }

    /// Set a map-space rectangle to `owner`, splitting it across the chunks
    /// it spans. Returns the ids of every touched chunk.
    pub fn fill_rect(&mut self, owner: u8, rect: Rect) -> SmallVec<[ChunkId; 8]> {
        assert!(
            rect.width > 0
                && rect.height > 0
                && rect.right() <= self.map_size
                && rect.bottom() <= self.map_size,
            "fill rect out of map bounds"
        );

        let mut touched = SmallVec::new();
        let first_cx = rect.x / self.chunk_size;
        let last_cx = (rect.right() - 1) / self.chunk_size;
        let first_cy = rect.y / self.chunk_size;
        let last_cy = (rect.bottom() - 1) / self.chunk_size;

        for cy in first_cy..=last_cy {
            for cx in first_cx..=last_cx {
                let id = cx + cy * self.per_side;
                let (ox, oy) = (cx * self.chunk_size, cy * self.chunk_size);

                let x0 = rect.x.max(ox);
                let y0 = rect.y.max(oy);
                let x1 = rect.right().min(ox + self.chunk_size);
                let y1 = rect.bottom().min(oy + self.chunk_size);

                self.chunks[id as usize].fill_area(owner, x0 - ox, y0 - oy, x1 - x0, y1 - y0);
                touched.push(id);
            }
        }
        touched
    }

    /// Revert every cell holding `owner` to neutral across the whole map.
    /// Returns the ids of the chunks that actually changed.
    pub fn remove_player_cells(&mut self, owner: u8) -> Vec<ChunkId> {
        let mut changed = Vec::new();
        for (index, chunk) in self.chunks.iter_mut().enumerate() {
            if chunk.remove_player(owner) {
                changed.push(index as ChunkId);
            }
        }
        changed
    }

    /// Owner value helper for a player id.
    #[inline]
    pub fn owner_value(id: PlayerId) -> u8 {
        cell::owner_value(id)
    }
}
