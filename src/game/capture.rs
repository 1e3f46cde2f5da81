//! Converting a closed trail loop into owned territory.
//!
//! The live trail only covers the excursion outside owned land; the return
//! leg across territory the player already owns is bridged with a grid search
//! restricted to the territory's inner boundary ring. The closed polygon is
//! then rasterized with an even-odd scanline over its vertical edges, giving
//! back a minimal set of axis-aligned fill rectangles.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::game::chunk::{ChunkGrid, Rect};
use crate::util::vec2::Vec2;

/// Integer map cell
pub(crate) type Cell = (i32, i32);

/// 8-connected search steps, axis moves first
const STEPS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Compute the rectangles enclosed by a finished trail loop.
///
/// `trail` holds the waypoints recorded outside owned land, `current` the
/// just-returned position, `last_safe` the last position recorded inside
/// owned territory before the excursion. Returns `None` when no bridging
/// path over owned ground exists (the capture is aborted, nothing claimed);
/// a zero-area loop yields `Some` with no rectangles.
pub fn enclosed_rects(
    grid: &ChunkGrid,
    owner: u8,
    trail: &[Vec2],
    current: Vec2,
    last_safe: Vec2,
) -> Option<Vec<Rect>> {
    if trail.is_empty() {
        return Some(Vec::new());
    }

    let start = current.cell();
    let goal = last_safe.cell();
    let path = bridge_path(grid, owner, start, goal)?;
    let bridge = polyline_vertices(&path);

    let mut loop_verts: Vec<Cell> = trail.iter().map(|p| p.cell()).collect();
    loop_verts.push(start);
    loop_verts.extend(bridge);

    Some(scanline(&vertical_edges(&loop_verts)))
}

/// Whether a cell belongs to the owner's inner boundary: owned, with at
/// least one orthogonal neighbor that is not.
fn is_boundary_cell(grid: &ChunkGrid, owner: u8, (x, y): Cell) -> bool {
    if grid.owner_at(x, y) != owner {
        return false;
    }
    grid.owner_at(x + 1, y) != owner
        || grid.owner_at(x - 1, y) != owner
        || grid.owner_at(x, y + 1) != owner
        || grid.owner_at(x, y - 1) != owner
}

/// A* over the owner's inner boundary ring, unit step cost between 8-connected
/// cells, Manhattan heuristic. The goal cell is always admissible.
pub(crate) fn bridge_path(
    grid: &ChunkGrid,
    owner: u8,
    start: Cell,
    goal: Cell,
) -> Option<Vec<Cell>> {
    if start == goal {
        return Some(vec![start]);
    }

    let h = |cell: Cell| (cell.0 - goal.0).abs() + (cell.1 - goal.1).abs();

    let mut open: BinaryHeap<Reverse<(i32, Cell)>> = BinaryHeap::new();
    let mut g_score: FxHashMap<Cell, i32> = FxHashMap::default();
    let mut came_from: FxHashMap<Cell, Cell> = FxHashMap::default();

    g_score.insert(start, 0);
    open.push(Reverse((h(start), start)));

    while let Some(Reverse((f, cell))) = open.pop() {
        let base = g_score[&cell];
        if f != base + h(cell) {
            // superseded queue entry
            continue;
        }
        if cell == goal {
            let mut path = vec![cell];
            let mut cursor = cell;
            while let Some(&prev) = came_from.get(&cursor) {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }

        for (dx, dy) in STEPS {
            let next = (cell.0 + dx, cell.1 + dy);
            if next != goal && !is_boundary_cell(grid, owner, next) {
                continue;
            }
            let tentative = base + 1;
            if g_score.get(&next).map_or(true, |&old| tentative < old) {
                g_score.insert(next, tentative);
                came_from.insert(next, cell);
                open.push(Reverse((tentative + h(next), next)));
            }
        }
    }
    None
}

/// Reduce a cell path to polyline vertices: diagonal steps fold into a
/// horizontal-then-vertical elbow, collinear runs collapse to their endpoints.
pub(crate) fn polyline_vertices(path: &[Cell]) -> Vec<Cell> {
    let mut points: Vec<Cell> = Vec::with_capacity(path.len() + 4);
    for &point in path {
        if let Some(&prev) = points.last() {
            if point == prev {
                continue;
            }
            if point.0 != prev.0 && point.1 != prev.1 {
                points.push((point.0, prev.1));
            }
        }
        points.push(point);
    }

    let mut vertices: Vec<Cell> = Vec::with_capacity(points.len());
    for &point in &points {
        while vertices.len() >= 2 {
            let a = vertices[vertices.len() - 2];
            let b = vertices[vertices.len() - 1];
            let collinear =
                (a.0 == b.0 && b.0 == point.0) || (a.1 == b.1 && b.1 == point.1);
            if collinear {
                vertices.pop();
            } else {
                break;
            }
        }
        vertices.push(point);
    }
    vertices
}

/// A constant-x polygon edge with `y0 < y1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VerticalEdge {
    pub x: i32,
    pub y0: i32,
    pub y1: i32,
}

/// Extract the vertical edges of the closed polyline (the loop closes from
/// the last vertex back to the first). Diagonal joints fold into a
/// horizontal-then-vertical elbow; horizontal segments cannot cross a
/// horizontal scanline and are dropped.
pub(crate) fn vertical_edges(vertices: &[Cell]) -> Vec<VerticalEdge> {
    let mut edges = Vec::new();
    if vertices.len() < 2 {
        return edges;
    }
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        if a == b {
            continue;
        }
        let (top, bottom) = if a.0 != b.0 && a.1 != b.1 {
            ((b.0, a.1), b)
        } else {
            (a, b)
        };
        if top.0 == bottom.0 && top.1 != bottom.1 {
            edges.push(VerticalEdge {
                x: top.0,
                y0: top.1.min(bottom.1),
                y1: top.1.max(bottom.1),
            });
        }
    }
    edges
}

/// Even-odd scanline rasterization into merged rectangles.
///
/// Walks consecutive bands between distinct edge-endpoint y values, pairs the
/// edges covering each band's midpoint left to right, and extends a rectangle
/// downward while consecutive bands produce the identical x-span. Bands are
/// inclusive of both boundary rows, so the trail cells themselves are claimed
/// along with the interior. An odd leftover edge in a band (only possible for
/// a self-intersecting trail) is ignored.
pub(crate) fn scanline(edges: &[VerticalEdge]) -> Vec<Rect> {
    let mut ys: Vec<i32> = edges.iter().flat_map(|e| [e.y0, e.y1]).collect();
    ys.sort_unstable();
    ys.dedup();

    let mut rects: Vec<Rect> = Vec::new();
    let mut open: Vec<(i32, i32, Rect)> = Vec::new();

    for band in ys.windows(2) {
        let (top, bottom) = (band[0], band[1]);
        let mid = top as f64 + (bottom - top) as f64 / 2.0;

        let mut xs: Vec<i32> = edges
            .iter()
            .filter(|e| (e.y0 as f64) < mid && (e.y1 as f64) > mid)
            .map(|e| e.x)
            .collect();
        xs.sort_unstable();

        let mut next_open = Vec::new();
        for pair in xs.chunks_exact(2) {
            let (left, right) = (pair[0], pair[1]);
            if let Some(i) = open.iter().position(|&(l, r, _)| l == left && r == right) {
                let (_, _, mut rect) = open.remove(i);
                rect.height = (bottom - rect.y as i32 + 1) as u16;
                next_open.push((left, right, rect));
            } else {
                next_open.push((
                    left,
                    right,
                    Rect::new(
                        left as u16,
                        top as u16,
                        (right - left + 1) as u16,
                        (bottom - top + 1) as u16,
                    ),
                ));
            }
        }
        rects.extend(open.drain(..).map(|(_, _, rect)| rect));
        open = next_open;
    }
    rects.extend(open.into_iter().map(|(_, _, rect)| rect));
    rects
}
