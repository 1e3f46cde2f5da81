//! Game session: owns the authoritative [`Game`], the inbound command queue,
//! and the per-connection outbound channels, and runs the fixed-rate tick.
//!
//! The transport layer (outside this crate's scope) calls [`GameSession::connect`]
//! per accepted connection, forwards decoded commands through the returned
//! sender, and encodes the events arriving on the handle's receiver. Delivery
//! never blocks the tick: outbound channels are unbounded and a failed send is
//! treated as a disconnect in progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::game::player::PlayerId;
use crate::game::state::{Game, JoinError};
use crate::net::command_buffer::{CommandBuffer, CommandSender};
use crate::net::protocol::{ClientCommand, ServerEvent};

/// Everything a connection handler needs to talk to the core
pub struct ConnectionHandle {
    pub player_id: PlayerId,
    /// Decoded inbound commands go here
    pub commands: CommandSender,
    /// Decoded outbound events come out here, already addressed to this
    /// connection with relative player ids applied
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Shared game session behind one lock; the tick task is the only writer on
/// the hot path.
pub struct GameSession {
    game: Game,
    commands: CommandBuffer,
    connections: HashMap<PlayerId, mpsc::UnboundedSender<ServerEvent>>,
    tick_interval: Duration,
    started: Instant,
}

impl GameSession {
    pub fn new(config: GameConfig) -> Self {
        let commands = CommandBuffer::new(config.command_buffer_capacity);
        let tick_interval = Duration::from_millis(config.tick_interval_ms);
        Self {
            game: Game::new(config),
            commands,
            connections: HashMap::new(),
            tick_interval,
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn game(&self) -> &Game {
        &self.game
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    #[inline]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Admit a connection: allocate a player id and wire up its channels.
    pub fn connect(&mut self) -> Result<ConnectionHandle, JoinError> {
        let player_id = self.game.connect()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.connections.insert(player_id, event_tx);
        Ok(ConnectionHandle {
            player_id,
            commands: self.commands.sender(),
            events: event_rx,
        })
    }

    /// Transport-side close notification. Cleanup is serialized with the tick
    /// by going through the command queue like any other inbound message.
    pub fn notify_closed(&mut self, player_id: PlayerId) {
        self.connections.remove(&player_id);
        if self
            .commands
            .sender()
            .try_send(player_id, ClientCommand::Disconnected)
            .is_err()
        {
            warn!("disconnect for player {} could not be queued", player_id);
        }
    }

    /// Drain pending commands, run one simulation step, dispatch the outbox.
    pub fn drain_and_tick(&mut self) {
        let now_ms = self.now_ms();
        for message in self.commands.drain() {
            self.game.apply(message.player_id, message.command, now_ms);
        }
        self.game.tick(now_ms);
        self.dispatch_outbox();
    }

    /// Hand every queued event to its connection's channel. A dead channel
    /// marks the player as disconnect-in-progress; game cleanup happens via
    /// the command queue on the next tick, never mid-dispatch.
    fn dispatch_outbox(&mut self) {
        let mut dead: Vec<PlayerId> = Vec::new();
        for (player_id, event) in self.game.take_outbox() {
            let Some(tx) = self.connections.get(&player_id) else {
                continue;
            };
            if tx.send(event).is_err() && !dead.contains(&player_id) {
                dead.push(player_id);
            }
        }
        for player_id in dead {
            debug!("delivery to player {} failed, dropping connection", player_id);
            self.notify_closed(player_id);
        }
    }
}

/// Start the fixed-rate simulation task.
pub fn start_game_loop(session: Arc<RwLock<GameSession>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let tick_interval = session.read().await.tick_interval();
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("game loop started ({} ms tick)", tick_interval.as_millis());
        loop {
            ticker.tick().await;
            let mut session = session.write().await;
            session.drain_and_tick();

            // periodic stats, roughly every 30 seconds
            let ticks_per_report = (30_000 / tick_interval.as_millis().max(1)) as u64;
            let tick_count = session.game().tick_count();
            if ticks_per_report > 0 && tick_count % ticks_per_report == 0 {
                info!(
                    "tick {}: {} connection(s), {} player(s)",
                    tick_count,
                    session.connection_count(),
                    session.game().player_count()
                );
            }
        }
    })
}
