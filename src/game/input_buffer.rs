//! Lock-free steering input queue
//!
//! Connection handlers push `(player, target angle)` pairs from any task;
//! the room drains them at the next tick boundary so a tick never sees
//! input arrive halfway through.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rustc_hash::FxHashMap;

use crate::game::state::EntityId;

/// Steering input from one connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputMessage {
    pub player_id: EntityId,
    /// Target heading in radians
    pub angle: f32,
}

/// Bounded MPSC queue shared by every connection of a room
pub struct InputBuffer {
    sender: Sender<InputMessage>,
    receiver: Receiver<InputMessage>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Handle for a connection task
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Everything queued since the last drain, in arrival order
    pub fn drain(&self) -> Vec<InputMessage> {
        self.receiver.try_iter().collect()
    }

    /// Latest angle per player; earlier inputs in the same tick are moot
    pub fn drain_latest(&self) -> FxHashMap<EntityId, f32> {
        let mut latest = FxHashMap::default();
        for msg in self.receiver.try_iter() {
            latest.insert(msg.player_id, msg.angle);
        }
        latest
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

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(crate::game::constants::net::INPUT_QUEUE)
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputMessage>,
}

impl InputSender {
    /// Non-blocking submit; a full queue is backpressure, not an error
    /// worth closing the connection over
    #[inline]
    pub fn try_send(&self, player_id: EntityId, angle: f32) -> Result<(), InputBufferError> {
        self.sender
            .try_send(InputMessage { player_id, angle })
            .map_err(|e| match e {
                TrySendError::Full(_) => InputBufferError::Full,
                TrySendError::Disconnected(_) => InputBufferError::Disconnected,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    #[error("input queue full")]
    Full,
    #[error("room stopped")]
    Disconnected,
}
