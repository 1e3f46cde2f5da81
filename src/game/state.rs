//! Authoritative game world: the player registry, chunk ownership, id
//! allocation, the fixed-rate simulation tick, and the per-player interest
//! reconciliation that decides who is told about which chunk and player.
//!
//! All mutation happens on the single logical owner of this struct; inbound
//! commands are applied between ticks and outbound events accumulate in an
//! outbox the session layer drains after every step.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::anticheat::validator::{TurnValidator, ValidationConfig};
use crate::config::GameConfig;
use crate::game::capture::enclosed_rects;
use crate::game::chunk::{ChunkGrid, ChunkId, Rect};
use crate::game::constants::{cell, session};
use crate::game::player::{Player, PlayerId, PlayerState};
use crate::net::protocol::{relative_id, ClientCommand, ServerEvent};
use crate::util::vec2::Vec2;

/// Why a connection could not be admitted
#[derive(Debug, Clone, thiserror::Error)]
pub enum JoinError {
    #[error("server is full")]
    ServerFull,
}

/// Player id allocation with recycling; freed ids are reused lowest-first.
#[derive(Debug, Default)]
struct IdAllocator {
    next: PlayerId,
    free: BTreeSet<PlayerId>,
}

impl IdAllocator {
    fn new() -> Self {
        Self {
            // id 0 is the "self" alias in outbound events, never allocated
            next: 1,
            free: BTreeSet::new(),
        }
    }

    fn allocate(&mut self) -> Option<PlayerId> {
        if let Some(id) = self.free.pop_first() {
            return Some(id);
        }
        if self.next as usize > session::MAX_PLAYERS {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    fn release(&mut self, id: PlayerId) {
        self.free.insert(id);
    }
}

/// The authoritative game state
pub struct Game {
    config: GameConfig,
    grid: ChunkGrid,
    players: HashMap<PlayerId, Player>,
    ids: IdAllocator,
    validator: TurnValidator,
    outbox: Vec<(PlayerId, ServerEvent)>,
    tick_count: u64,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        let grid = ChunkGrid::new(config.map_size, config.chunk_size, config.neighbor_distance);
        let validator = TurnValidator::new(ValidationConfig {
            turn_tolerance: config.turn_tolerance,
        });
        Self {
            config,
            grid,
            players: HashMap::new(),
            ids: IdAllocator::new(),
            validator,
            outbox: Vec::new(),
            tick_count: 0,
        }
    }

    #[inline]
    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    #[inline]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Take every event queued since the last drain. Each entry is addressed
    /// to one specific connection.
    pub fn take_outbox(&mut self) -> Vec<(PlayerId, ServerEvent)> {
        std::mem::take(&mut self.outbox)
    }

    /// Admit a new connection. The player starts in `New` and joins the
    /// simulation once the ready handshake completes.
    pub fn connect(&mut self) -> Result<PlayerId, JoinError> {
        let id = self.ids.allocate().ok_or(JoinError::ServerFull)?;
        self.players.insert(id, Player::new(id));
        info!("connection admitted as player {}", id);
        Ok(id)
    }

    /// Apply one decoded command from a connection.
    pub fn apply(&mut self, id: PlayerId, command: ClientCommand, now_ms: u64) {
        if !self.players.contains_key(&id) {
            debug!("command for unknown player {} dropped", id);
            return;
        }
        match command {
            ClientCommand::SetUsername { name } => {
                let player = self.players.get_mut(&id).unwrap();
                player.username = name;
                info!("player {} is now known as {:?}", id, player.username);
            }
            ClientCommand::SetSkin { color, pattern } => {
                let player = self.players.get_mut(&id).unwrap();
                player.color = color;
                player.pattern = pattern;
            }
            ClientCommand::SetVersion { version } => {
                if version != session::PROTOCOL_VERSION {
                    warn!(
                        "player {} speaks protocol version {} (server has {})",
                        id,
                        version,
                        session::PROTOCOL_VERSION
                    );
                }
                self.players.get_mut(&id).unwrap().version = version;
            }
            ClientCommand::Ping => {
                self.outbox.push((id, ServerEvent::Pong));
            }
            ClientCommand::RequestTrail => {
                let waypoints = self.players[&id].trail.clone();
                self.outbox
                    .push((id, ServerEvent::PlayerTrail { player: 0, waypoints }));
            }
            ClientCommand::Ready => self.handle_ready(id, now_ms),
            ClientCommand::UpdateDirection { direction, claimed } => {
                self.handle_update_direction(id, direction, claimed)
            }
            ClientCommand::Disconnected => {
                info!("player {} disconnected", id);
                self.remove_from_world(id);
            }
        }
    }

    /// Run one simulation step.
    pub fn tick(&mut self, now_ms: u64) {
        self.tick_count += 1;

        // Pass 1: movement integration and trail transitions.
        for id in self.spawned_ids() {
            let mut finished_trail = false;
            {
                let Some(player) = self.players.get_mut(&id) else {
                    continue;
                };
                player.integrate_position(now_ms, self.config.speed, self.config.map_size);
                player.current_chunk = self.grid.chunk_at(player.position.x, player.position.y);
                if player.has_trail() {
                    player.trail_chunks.insert(player.current_chunk);
                }

                let outside = player.is_outside(&self.grid);
                if player.has_trail() != outside {
                    if player.has_trail() {
                        finished_trail = true;
                    } else {
                        player.start_trail();
                    }
                    player.needs_broadcast = true;
                }
                if !outside {
                    player.last_safe_position = player.position;
                }
            }
            if finished_trail {
                self.capture(id);
                if let Some(player) = self.players.get_mut(&id) {
                    player.end_trail();
                }
            }
        }

        // Tail collisions: landing on someone's trail cuts that trail's owner
        // down. A player never collides with its own trail.
        let ids = self.spawned_ids();
        let mut victims: Vec<PlayerId> = Vec::new();
        for &id in &ids {
            let cell = self.players[&id].position.cell();
            for &other_id in &ids {
                if other_id == id || victims.contains(&other_id) {
                    continue;
                }
                let other = &self.players[&other_id];
                if other.has_trail() && trail_covers_cell(&other.trail, other.position, cell) {
                    victims.push(other_id);
                }
            }
        }
        for victim in victims {
            info!("player {} was cut down on its trail", victim);
            self.remove_from_world(victim);
        }

        // Flush pending state broadcasts.
        for id in self.spawned_ids() {
            if self.players[&id].needs_broadcast {
                self.broadcast_player_state(id);
                self.players.get_mut(&id).unwrap().needs_broadcast = false;
            }
        }

        // Pass 2, after all positions are final: interest reconciliation.
        let ids = self.spawned_ids();
        for &viewer_id in &ids {
            self.send_chunk_updates(viewer_id);
            for &subject_id in &ids {
                if subject_id == viewer_id {
                    continue;
                }
                let sees = {
                    let viewer = &self.players[&viewer_id];
                    let subject = &self.players[&subject_id];
                    viewer.can_see_player(&self.grid, subject)
                };
                if sees != self.players[&viewer_id].knows_player(subject_id) {
                    self.send_player_update(viewer_id, subject_id, sees);
                }
            }
        }
    }

    //
    // command handlers
    //

    fn handle_ready(&mut self, id: PlayerId, now_ms: u64) {
        match self.players[&id].state {
            PlayerState::New => {
                let spawn = self.spawn_position();
                {
                    let chunk = self.grid.chunk_at(spawn.x, spawn.y);
                    let player = self.players.get_mut(&id).unwrap();
                    player.position = spawn;
                    player.last_safe_position = spawn;
                    player.last_position_update = now_ms;
                    player.current_chunk = chunk;
                    player.state = PlayerState::Ready;
                }

                // initial viewport, then the starting territory on top of it
                self.send_chunk_updates(id);
                let claim = self.spawn_claim_rect(spawn);
                self.commit_fill(id, claim);
                info!(
                    "player {} spawned at ({}, {}) with a {}x{} claim",
                    id, spawn.x, spawn.y, claim.width, claim.height
                );
            }
            PlayerState::Ready => {
                let player = &self.players[&id];
                let (position, direction) = (player.position, player.direction);
                let name = player.username.clone();
                let (color, pattern) = (player.color, player.pattern);

                self.outbox.push((
                    id,
                    ServerEvent::PlayerPosition {
                        player: 0,
                        position,
                        direction,
                    },
                ));
                self.outbox
                    .push((id, ServerEvent::PlayerIntroduced { player: 0, name }));
                self.outbox.push((
                    id,
                    ServerEvent::PlayerSkin {
                        player: 0,
                        color,
                        pattern,
                    },
                ));
                self.outbox.push((id, ServerEvent::Ready));

                self.players.get_mut(&id).unwrap().state = PlayerState::Playing;
                info!("player {} is playing", id);
            }
            PlayerState::Playing => debug!("redundant ready from player {}", id),
        }
    }

    fn handle_update_direction(&mut self, id: PlayerId, raw_direction: u8, claimed: Vec2) {
        if !self.players[&id].is_spawned() {
            debug!("direction update from player {} before spawn", id);
            return;
        }

        let (server_position, facing) = {
            let player = &self.players[&id];
            (player.position, player.direction)
        };

        match self
            .validator
            .validate(raw_direction, server_position, facing, claimed)
        {
            Ok(direction) => {
                let max = (self.config.map_size - 1) as f64;
                let adopted = Vec2::new(claimed.x.clamp(0.0, max), claimed.y.clamp(0.0, max));
                let chunk = self.grid.chunk_at(adopted.x, adopted.y);

                let player = self.players.get_mut(&id).unwrap();
                player.position = adopted;
                player.current_chunk = chunk;
                player.set_direction(direction);
            }
            Err(violation) => {
                // no mutation; the corrective broadcast below resynchronizes
                // the client with the authoritative state
                warn!("rejected direction update from player {}: {}", id, violation);
            }
        }

        self.players.get_mut(&id).unwrap().needs_broadcast = true;
    }

    //
    // world mutation
    //

    /// Run the capture algorithm for a player whose trail just reconnected
    /// with owned territory. Aborts silently (nothing claimed) when no return
    /// path over owned ground exists.
    fn capture(&mut self, id: PlayerId) {
        let (owner, trail, position, last_safe) = {
            let player = &self.players[&id];
            (
                player.owner_value(),
                player.trail.clone(),
                player.position,
                player.last_safe_position,
            )
        };

        match enclosed_rects(&self.grid, owner, &trail, position, last_safe) {
            None => debug!(
                "capture aborted for player {}: no return path over owned territory",
                id
            ),
            Some(rects) if rects.is_empty() => {
                debug!("zero-area trail loop for player {}", id);
            }
            Some(rects) => {
                info!("player {} captured {} rectangle(s)", id, rects.len());
                for rect in rects {
                    self.commit_fill(id, rect);
                }
            }
        }
    }

    /// Claim a rectangle for a player and announce it to every player that
    /// can currently see an affected chunk.
    fn commit_fill(&mut self, subject_id: PlayerId, rect: Rect) {
        let Some(subject) = self.players.get(&subject_id) else {
            return;
        };
        let (color, pattern) = (subject.color, subject.pattern);

        let map_size = self.grid.map_size();
        if rect.width == 0
            || rect.height == 0
            || rect.right() > map_size
            || rect.bottom() > map_size
        {
            warn!(
                "fill for player {} dropped: rectangle ({}, {}) {}x{} leaves the map",
                subject_id, rect.x, rect.y, rect.width, rect.height
            );
            return;
        }

        let touched = self.grid.fill_rect(cell::owner_value(subject_id), rect);
        for viewer_id in self.spawned_ids() {
            let viewer = &self.players[&viewer_id];
            if touched
                .iter()
                .any(|&chunk| viewer.can_see_chunk(&self.grid, chunk))
            {
                self.outbox.push((
                    viewer_id,
                    ServerEvent::FillArea {
                        x: rect.x,
                        y: rect.y,
                        width: rect.width,
                        height: rect.height,
                        color,
                        pattern,
                    },
                ));
            }
        }
    }

    /// Remove a player from the world entirely: registry, id, territory, and
    /// every other connection's view of it. Used by disconnects and deaths.
    fn remove_from_world(&mut self, id: PlayerId) {
        let Some(player) = self.players.remove(&id) else {
            return;
        };
        self.ids.release(id);

        let survivors = self.spawned_ids();
        for &other_id in &survivors {
            let other = self.players.get_mut(&other_id).unwrap();
            if other.known_players.remove(&id) {
                let rel = relative_id(other_id, id);
                self.outbox
                    .push((other_id, ServerEvent::PlayerRemoved { player: rel }));
            }
        }

        // territory reverts to neutral; changed chunks are re-sent to every
        // current subscriber
        let changed = self.grid.remove_player_cells(player.owner_value());
        for chunk_id in changed {
            let (x, y) = self.grid.chunk_origin(chunk_id);
            let cells = self.grid.chunk(chunk_id).cells().to_vec();
            for &viewer_id in &survivors {
                if self.players[&viewer_id].can_see_chunk(&self.grid, chunk_id) {
                    self.outbox.push((
                        viewer_id,
                        ServerEvent::ChunkSnapshot {
                            x,
                            y,
                            width: self.grid.chunk_size(),
                            height: self.grid.chunk_size(),
                            cells: cells.clone(),
                        },
                    ));
                }
            }
        }
    }

    //
    // interest management
    //

    /// Diff the player's chunk viewport against what it has been sent: new
    /// chunks get a full snapshot, chunks that fell out of range are simply
    /// forgotten. Calling this twice without movement sends nothing.
    fn send_chunk_updates(&mut self, id: PlayerId) {
        let Some(player) = self.players.get(&id) else {
            return;
        };
        let neighbors: Vec<ChunkId> = self.grid.neighbors(player.current_chunk).to_vec();

        let missing: Vec<ChunkId> = {
            let player = self.players.get_mut(&id).unwrap();
            player.known_chunks.retain(|c| neighbors.contains(c));
            let missing: Vec<ChunkId> = neighbors
                .iter()
                .copied()
                .filter(|c| !player.knows_chunk(*c))
                .collect();
            player.known_chunks.extend(missing.iter().copied());
            missing
        };

        for chunk_id in missing {
            let (x, y) = self.grid.chunk_origin(chunk_id);
            self.outbox.push((
                id,
                ServerEvent::ChunkSnapshot {
                    x,
                    y,
                    width: self.grid.chunk_size(),
                    height: self.grid.chunk_size(),
                    cells: self.grid.chunk(chunk_id).cells().to_vec(),
                },
            ));
        }
    }

    /// Reconcile one viewer's introduction state for one subject after a
    /// visibility change. Introductions always lead with name and skin.
    fn send_player_update(&mut self, viewer_id: PlayerId, subject_id: PlayerId, now_visible: bool) {
        let rel = relative_id(viewer_id, subject_id);
        if now_visible {
            let Some(subject) = self.players.get(&subject_id) else {
                return;
            };
            let name = subject.username.clone();
            let (color, pattern) = (subject.color, subject.pattern);
            let (position, direction) = (subject.position, subject.direction);
            let waypoints = subject.trail.clone();

            let newly_known = self
                .players
                .get_mut(&viewer_id)
                .map(|viewer| viewer.known_players.insert(subject_id))
                .unwrap_or(false);
            if newly_known {
                self.outbox
                    .push((viewer_id, ServerEvent::PlayerIntroduced { player: rel, name }));
                self.outbox.push((
                    viewer_id,
                    ServerEvent::PlayerSkin {
                        player: rel,
                        color,
                        pattern,
                    },
                ));
            }
            self.outbox.push((
                viewer_id,
                ServerEvent::PlayerPosition {
                    player: rel,
                    position,
                    direction,
                },
            ));
            self.outbox
                .push((viewer_id, ServerEvent::PlayerTrail { player: rel, waypoints }));
        } else if let Some(viewer) = self.players.get_mut(&viewer_id) {
            if viewer.known_players.remove(&subject_id) {
                self.outbox
                    .push((viewer_id, ServerEvent::PlayerRemoved { player: rel }));
            }
        }
    }

    /// Push a player's position and trail to itself and to every connection
    /// that currently knows it.
    fn broadcast_player_state(&mut self, subject_id: PlayerId) {
        let Some(subject) = self.players.get(&subject_id) else {
            return;
        };
        let (position, direction) = (subject.position, subject.direction);
        let waypoints = subject.trail.clone();

        for viewer_id in self.spawned_ids() {
            if viewer_id != subject_id && !self.players[&viewer_id].knows_player(subject_id) {
                continue;
            }
            let rel = relative_id(viewer_id, subject_id);
            self.outbox.push((
                viewer_id,
                ServerEvent::PlayerPosition {
                    player: rel,
                    position,
                    direction,
                },
            ));
            self.outbox.push((
                viewer_id,
                ServerEvent::PlayerTrail {
                    player: rel,
                    waypoints: waypoints.clone(),
                },
            ));
        }
    }

    //
    // helpers
    //

    fn spawned_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|(_, p)| p.is_spawned())
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn spawn_position(&self) -> Vec2 {
        let mut rng = rand::thread_rng();
        let center = (self.config.map_size / 2) as f64;
        let jitter = self.config.spawn_jitter as f64;
        Vec2::new(
            center + rng.gen_range(-jitter..=jitter),
            center + rng.gen_range(-jitter..=jitter),
        )
        .rounded()
    }

    fn spawn_claim_rect(&self, spawn: Vec2) -> Rect {
        let size = self.config.spawn_claim_size;
        let half = (size / 2) as i32;
        let max_origin = (self.config.map_size - size) as i32;
        let (sx, sy) = spawn.cell();
        Rect::new(
            (sx - half).clamp(0, max_origin) as u16,
            (sy - half).clamp(0, max_origin) as u16,
            size,
            size,
        )
    }
}

/// Whether a cell lies on the axis-aligned polyline formed by a trail's
/// waypoints plus its owner's current position.
fn trail_covers_cell(trail: &[Vec2], tip: Vec2, cell: (i32, i32)) -> bool {
    let mut prev: Option<(i32, i32)> = None;
    for point in trail
        .iter()
        .map(|p| p.cell())
        .chain(std::iter::once(tip.cell()))
    {
        if let Some(a) = prev {
            let b = point;
            if a.0 == b.0 && cell.0 == a.0 && in_span(cell.1, a.1, b.1) {
                return true;
            }
            if a.1 == b.1 && cell.1 == a.1 && in_span(cell.0, a.0, b.0) {
                return true;
            }
        }
        prev = Some(point);
    }
    false
}

#[inline]
fn in_span(value: i32, a: i32, b: i32) -> bool {
    value >= a.min(b) && value <= a.max(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Direction;

    fn game() -> Game {
        Game::new(GameConfig::default())
    }

    /// Connect and complete the two-step ready handshake.
    fn join(game: &mut Game, name: &str) -> PlayerId {
        let id = game.connect().unwrap();
        game.apply(
            id,
            ClientCommand::SetUsername {
                name: name.to_string(),
            },
            0,
        );
        game.apply(
            id,
            ClientCommand::SetSkin {
                color: 3,
                pattern: 1,
            },
            0,
        );
        game.apply(id, ClientCommand::Ready, 0);
        game.apply(id, ClientCommand::Ready, 0);
        id
    }

    /// Teleport a player for deterministic scenarios.
    fn place(game: &mut Game, id: PlayerId, x: f64, y: f64) {
        let chunk = game.grid.chunk_at(x, y);
        let player = game.players.get_mut(&id).unwrap();
        player.position = Vec2::new(x, y);
        player.last_safe_position = Vec2::new(x, y);
        player.current_chunk = chunk;
    }

    /// Give a player ownership of the single cell under a future placement so
    /// it never starts a trail there.
    fn own_cell(game: &mut Game, id: PlayerId, x: u16, y: u16) {
        game.grid
            .fill_rect(cell::owner_value(id), Rect::new(x, y, 1, 1));
    }

    fn events_to(outbox: &[(PlayerId, ServerEvent)], to: PlayerId) -> Vec<ServerEvent> {
        outbox
            .iter()
            .filter(|(recipient, _)| *recipient == to)
            .map(|(_, event)| event.clone())
            .collect()
    }

    #[test]
    fn test_first_ready_spawns_and_claims() {
        let mut game = game();
        let id = game.connect().unwrap();
        game.apply(
            id,
            ClientCommand::SetUsername {
                name: "tester".to_string(),
            },
            0,
        );
        game.apply(id, ClientCommand::Ready, 0);

        let player = game.player(id).unwrap();
        assert_eq!(player.state, PlayerState::Ready);

        // spawn lands near the map center
        let center = 300.0;
        assert!((player.position.x - center).abs() <= 20.0);
        assert!((player.position.y - center).abs() <= 20.0);

        // the starting rectangle is owned
        let (sx, sy) = player.position.cell();
        let owner = cell::owner_value(id);
        for x in sx - 2..=sx + 2 {
            for y in sy - 2..=sy + 2 {
                assert_eq!(game.grid.owner_at(x, y), owner);
            }
        }
        assert!(!game.player(id).unwrap().is_outside(&game.grid));

        // the initial viewport snapshot was queued, plus the claim fill
        let events = events_to(&game.take_outbox(), id);
        let snapshots = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::ChunkSnapshot { .. }))
            .count();
        let expected = game
            .grid
            .neighbors(game.player(id).unwrap().current_chunk)
            .len();
        assert_eq!(snapshots, expected);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::FillArea { width: 5, height: 5, .. })));
    }

    #[test]
    fn test_second_ready_introduces_self() {
        let mut game = game();
        let id = game.connect().unwrap();
        game.apply(
            id,
            ClientCommand::SetUsername {
                name: "tester".to_string(),
            },
            0,
        );
        game.apply(id, ClientCommand::Ready, 0);
        game.take_outbox();

        game.apply(id, ClientCommand::Ready, 0);
        assert_eq!(game.player(id).unwrap().state, PlayerState::Playing);

        let events = events_to(&game.take_outbox(), id);
        assert!(matches!(
            events[0],
            ServerEvent::PlayerPosition { player: 0, .. }
        ));
        assert!(
            matches!(events[1], ServerEvent::PlayerIntroduced { player: 0, ref name } if name == "tester")
        );
        assert!(matches!(events[2], ServerEvent::PlayerSkin { player: 0, .. }));
        assert!(matches!(events[3], ServerEvent::Ready));
    }

    #[test]
    fn test_ping_answered_immediately() {
        let mut game = game();
        let id = game.connect().unwrap();
        game.apply(id, ClientCommand::Ping, 0);
        assert_eq!(events_to(&game.take_outbox(), id), vec![ServerEvent::Pong]);
    }

    #[test]
    fn test_request_trail_addressed_to_self() {
        let mut game = game();
        let id = join(&mut game, "a");
        game.take_outbox();

        game.apply(id, ClientCommand::RequestTrail, 0);
        let events = events_to(&game.take_outbox(), id);
        assert_eq!(
            events,
            vec![ServerEvent::PlayerTrail {
                player: 0,
                waypoints: Vec::new()
            }]
        );
    }

    #[test]
    fn test_turn_within_tolerance_adopts_claim() {
        let mut game = game();
        let id = join(&mut game, "a");
        place(&mut game, id, 100.0, 100.0);
        game.players.get_mut(&id).unwrap().direction = Direction::East;
        game.take_outbox();

        game.apply(
            id,
            ClientCommand::UpdateDirection {
                direction: 1,
                claimed: Vec2::new(102.0, 100.0),
            },
            0,
        );

        let player = game.player(id).unwrap();
        assert_eq!(player.position, Vec2::new(102.0, 100.0));
        assert_eq!(player.direction, Direction::South);
        assert!(player.needs_broadcast);
    }

    #[test]
    fn test_turn_outside_tolerance_rejected_without_mutation() {
        let mut game = game();
        let id = join(&mut game, "a");
        place(&mut game, id, 100.0, 100.0);
        game.players.get_mut(&id).unwrap().direction = Direction::East;

        // one cell beyond the window, both ahead and behind
        for claimed in [Vec2::new(103.0, 100.0), Vec2::new(97.0, 100.0)] {
            game.apply(
                id,
                ClientCommand::UpdateDirection {
                    direction: 1,
                    claimed,
                },
                0,
            );
            let player = game.player(id).unwrap();
            assert_eq!(player.position, Vec2::new(100.0, 100.0));
            assert_eq!(player.direction, Direction::East);
            assert!(player.needs_broadcast, "rejection still corrects the client");
        }
    }

    #[test]
    fn test_rejected_turn_triggers_corrective_broadcast() {
        let mut game = game();
        let id = join(&mut game, "a");
        place(&mut game, id, 100.0, 100.0);
        own_cell(&mut game, id, 100, 100);
        game.take_outbox();

        game.apply(
            id,
            ClientCommand::UpdateDirection {
                direction: 9,
                claimed: Vec2::new(100.0, 100.0),
            },
            0,
        );
        game.tick(0);

        let events = events_to(&game.take_outbox(), id);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::PlayerPosition { player: 0, position, .. }
                if *position == Vec2::new(100.0, 100.0)
        )));
    }

    #[test]
    fn test_trail_outside_duality_holds_after_every_tick() {
        let mut game = game();
        let id = join(&mut game, "a");
        game.players.get_mut(&id).unwrap().direction = Direction::East;

        let mut now = 0;
        for _ in 0..10 {
            now += 167;
            game.tick(now);
            let player = game.player(id).unwrap();
            assert_eq!(player.has_trail(), player.is_outside(&game.grid));
        }
        // moving east long enough definitely left the 5x5 spawn claim
        assert!(game.player(id).unwrap().has_trail());
    }

    #[test]
    fn test_capture_commits_exactly_the_enclosed_area() {
        let mut game = game();
        let id = join(&mut game, "a");
        let owner = cell::owner_value(id);

        // replace the random spawn claim with a deterministic 5x5 block
        game.grid.remove_player_cells(owner);
        game.grid.fill_rect(owner, Rect::new(300, 300, 5, 5));
        place(&mut game, id, 304.0, 300.0);
        {
            let player = game.players.get_mut(&id).unwrap();
            player.last_safe_position = Vec2::new(304.0, 303.0);
            player.trail = vec![
                Vec2::new(305.0, 303.0),
                Vec2::new(307.0, 303.0),
                Vec2::new(307.0, 300.0),
            ];
        }
        game.take_outbox();

        game.capture(id);

        // the loop and its interior are owned now
        for x in 304..=307 {
            for y in 300..=303 {
                assert_eq!(game.grid.owner_at(x, y), owner);
            }
        }
        // nothing outside the loop changed
        assert_eq!(game.grid.owner_at(308, 300), cell::NEUTRAL);
        assert_eq!(game.grid.owner_at(307, 304), cell::NEUTRAL);
        assert_eq!(game.grid.owner_at(307, 299), cell::NEUTRAL);
        assert_eq!(game.grid.owner_at(304, 304), owner, "original block cell");

        let events = events_to(&game.take_outbox(), id);
        assert_eq!(
            events,
            vec![ServerEvent::FillArea {
                x: 304,
                y: 300,
                width: 4,
                height: 4,
                color: 3,
                pattern: 1,
            }]
        );
    }

    #[test]
    fn test_interest_introductions_and_forgetting() {
        let mut game = game();
        let a = join(&mut game, "alpha");
        let b = join(&mut game, "beta");

        place(&mut game, a, 300.0, 300.0);
        own_cell(&mut game, a, 300, 300);
        for (x, y) in [(350, 300), (324, 300), (400, 300)] {
            own_cell(&mut game, b, x, y);
        }

        // far apart: no introduction
        place(&mut game, b, 350.0, 300.0);
        game.take_outbox();
        game.tick(0);
        assert!(!game.player(a).unwrap().knows_player(b));

        // B moves into range: introduction leads with name and skin
        place(&mut game, b, 324.0, 300.0);
        game.take_outbox();
        game.tick(0);
        let events = events_to(&game.take_outbox(), a);
        let about_b: Vec<&ServerEvent> = events
            .iter()
            .filter(|e| {
                matches!(e,
                    ServerEvent::PlayerIntroduced { player, .. }
                    | ServerEvent::PlayerSkin { player, .. }
                    | ServerEvent::PlayerPosition { player, .. }
                    | ServerEvent::PlayerTrail { player, .. } if *player == b)
            })
            .collect();
        assert!(matches!(about_b[0], ServerEvent::PlayerIntroduced { .. }));
        assert!(matches!(about_b[1], ServerEvent::PlayerSkin { .. }));
        assert!(matches!(about_b[2], ServerEvent::PlayerPosition { .. }));
        assert!(matches!(about_b[3], ServerEvent::PlayerTrail { .. }));
        assert!(game.player(a).unwrap().knows_player(b));
        assert!(game.player(b).unwrap().knows_player(a));

        // B leaves range: forgotten exactly once
        place(&mut game, b, 400.0, 300.0);
        game.take_outbox();
        game.tick(0);
        let events = events_to(&game.take_outbox(), a);
        let removed = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::PlayerRemoved { player } if *player == b))
            .count();
        assert_eq!(removed, 1);
        assert!(!game.player(a).unwrap().knows_player(b));

        // back in range: re-introduction starts over with name and skin
        place(&mut game, b, 324.0, 300.0);
        game.take_outbox();
        game.tick(0);
        let events = events_to(&game.take_outbox(), a);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerIntroduced { player, .. } if *player == b)));
    }

    #[test]
    fn test_chunk_updates_idempotent_within_tick() {
        let mut game = game();
        let id = join(&mut game, "a");
        game.take_outbox();

        game.send_chunk_updates(id);
        game.send_chunk_updates(id);
        let snapshots = events_to(&game.take_outbox(), id)
            .iter()
            .filter(|e| matches!(e, ServerEvent::ChunkSnapshot { .. }))
            .count();
        assert_eq!(snapshots, 0, "viewport already satisfied at spawn");
    }

    #[test]
    fn test_disconnect_cleans_up_everything() {
        let mut game = game();
        let a = join(&mut game, "alpha");
        let b = join(&mut game, "beta");

        place(&mut game, a, 300.0, 300.0);
        own_cell(&mut game, a, 300, 300);
        place(&mut game, b, 324.0, 300.0);
        own_cell(&mut game, b, 324, 300);
        game.tick(0);
        assert!(game.player(a).unwrap().knows_player(b));
        game.take_outbox();

        game.apply(b, ClientCommand::Disconnected, 0);

        // registry and territory are gone
        assert!(game.player(b).is_none());
        let owner_b = cell::owner_value(b);
        for x in 0..600 {
            for y in 0..600 {
                assert_ne!(game.grid.owner_at(x, y), owner_b);
            }
        }

        let events = events_to(&game.take_outbox(), a);
        let removed = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::PlayerRemoved { player } if *player == b))
            .count();
        assert_eq!(removed, 1);
        // the freed territory is re-sent to whoever still sees those chunks
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::ChunkSnapshot { .. })));

        // the id is available again
        assert_eq!(game.connect().unwrap(), b);
    }

    #[test]
    fn test_tail_collision_kills_trail_owner() {
        let mut game = game();
        let a = join(&mut game, "alpha");
        let b = join(&mut game, "beta");

        place(&mut game, a, 100.0, 100.0);
        own_cell(&mut game, a, 100, 100);
        place(&mut game, b, 103.0, 100.0);
        {
            let player = game.players.get_mut(&b).unwrap();
            player.trail = vec![Vec2::new(98.0, 100.0)];
            player.trail_chunks.insert(player.current_chunk);
        }
        game.take_outbox();

        // A stands on B's trail segment (98,100)..(103,100)
        game.tick(0);
        assert!(game.player(b).is_none(), "trail owner dies");
        assert!(game.player(a).is_some());
    }

    #[test]
    fn test_id_recycling_prefers_lowest() {
        let mut game = game();
        let first = game.connect().unwrap();
        let second = game.connect().unwrap();
        let third = game.connect().unwrap();
        assert_eq!((first, second, third), (1, 2, 3));

        game.apply(second, ClientCommand::Disconnected, 0);
        assert_eq!(game.connect().unwrap(), second);
    }

    #[test]
    fn test_server_full() {
        let mut game = game();
        for _ in 0..session::MAX_PLAYERS {
            game.connect().unwrap();
        }
        assert!(matches!(game.connect(), Err(JoinError::ServerFull)));
    }

    #[test]
    fn test_trail_covers_cell() {
        let trail = vec![Vec2::new(5.0, 5.0), Vec2::new(9.0, 5.0)];
        let tip = Vec2::new(9.0, 8.0);
        assert!(trail_covers_cell(&trail, tip, (7, 5)));
        assert!(trail_covers_cell(&trail, tip, (9, 7)));
        assert!(!trail_covers_cell(&trail, tip, (7, 6)));
    }
}
