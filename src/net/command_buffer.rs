//! Lock-free inbound command queue.
//!
//! Uses crossbeam-channel for MPSC communication from connection handlers to
//! the simulation task: handlers submit decoded commands without touching the
//! game lock, and the tick drains everything pending at its start. This keeps
//! all game-state mutation on one logical owner.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::player::PlayerId;
use crate::net::protocol::ClientCommand;

/// One decoded command from a connection
#[derive(Debug, Clone)]
pub struct CommandMessage {
    pub player_id: PlayerId,
    pub command: ClientCommand,
}

/// Bounded MPSC command queue
pub struct CommandBuffer {
    /// Sender side, cloned to each connection handler
    sender: Sender<CommandMessage>,
    /// Receiver side, drained by the simulation task
    receiver: Receiver<CommandMessage>,
    capacity: usize,
}

impl CommandBuffer {
    /// Create a buffer with the given capacity. The capacity only needs to
    /// absorb the command burst between two ticks.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a sender handle for a connection handler.
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain all pending commands, in arrival order.
    pub fn drain(&self) -> Vec<CommandMessage> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<CommandMessage>,
}

impl CommandSender {
    /// Submit a command without blocking. A full buffer is backpressure: the
    /// message is dropped and the caller decides whether to retry or log.
    #[inline]
    pub fn try_send(
        &self,
        player_id: PlayerId,
        command: ClientCommand,
    ) -> Result<(), CommandBufferError> {
        self.sender
            .try_send(CommandMessage { player_id, command })
            .map_err(|e| match e {
                TrySendError::Full(_) => CommandBufferError::Full,
                TrySendError::Disconnected(_) => CommandBufferError::Disconnected,
            })
    }
}

/// Command buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferError {
    /// Buffer is full (backpressure)
    Full,
    /// Receiver side gone (simulation stopped)
    Disconnected,
}
