use std::sync::Arc;

use hashbrown::HashMap;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::tuning::TuningTables;
use crate::lobby::room::{GameRoom, RoomConfig, RoomHandle};
use crate::metrics::Metrics;

struct RoomEntry {
    handle: RoomHandle,
    task: JoinHandle<()>,
}

/// Owns every running room and hands out quick-play assignments
pub struct LobbyManager {
    rooms: HashMap<Uuid, RoomEntry>,
    max_rooms: usize,
    room_config: RoomConfig,
    tuning: Arc<TuningTables>,
    metrics: Arc<Metrics>,
}

impl LobbyManager {
    pub fn new(max_rooms: usize, room_config: RoomConfig, tuning: Arc<TuningTables>, metrics: Arc<Metrics>) -> Self {
        Self {
            rooms: HashMap::new(),
            max_rooms,
            room_config,
            tuning,
            metrics,
        }
    }

    /// Spawn a new room actor. Must run inside a tokio runtime.
    pub fn create_room(&mut self) -> Result<RoomHandle, ManagerError> {
        self.prune_stopped();
        if self.rooms.len() >= self.max_rooms {
            return Err(ManagerError::TooManyRooms);
        }

        let (handle, task) = GameRoom::spawn(self.room_config.clone(), self.tuning.clone(), self.metrics.clone());
        info!("Created room {} ({}/{})", handle.id(), self.rooms.len() + 1, self.max_rooms);
        self.rooms.insert(
            handle.id(),
            RoomEntry {
                handle: handle.clone(),
                task,
            },
        );
        Ok(handle)
    }

    /// First running room with a free slot, otherwise a new room
    pub fn find_or_create_room(&mut self) -> Result<RoomHandle, ManagerError> {
        let open = self
            .rooms
            .values()
            .map(|entry| &entry.handle)
            .filter(|handle| handle.has_capacity())
            // Busiest open room first so players are not spread thin
            .max_by_key(|handle| handle.occupancy());
        match open {
            Some(handle) => Ok(handle.clone()),
            None => self.create_room(),
        }
    }

    pub fn get_room(&self, room_id: Uuid) -> Option<&RoomHandle> {
        self.rooms.get(&room_id).map(|entry| &entry.handle)
    }

    /// Forget rooms whose actor has exited
    pub fn prune_stopped(&mut self) {
        self.rooms.retain(|id, entry| {
            let alive = entry.handle.is_running() && !entry.task.is_finished();
            if !alive {
                warn!("Room {} stopped, removing", id);
            }
            alive
        });
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connections attached across all rooms
    pub fn total_player_count(&self) -> usize {
        self.rooms.values().map(|entry| entry.handle.occupancy()).sum()
    }

    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        self.rooms
            .values()
            .map(|entry| RoomInfo {
                id: entry.handle.id(),
                player_count: entry.handle.occupancy(),
                max_players: self.room_config.game.max_players,
            })
            .collect()
    }

    /// Stop every room and wait for the actors to exit
    pub async fn shutdown_all_rooms(&mut self) {
        for entry in self.rooms.values() {
            entry.handle.shutdown().await;
        }
        for (id, entry) in self.rooms.drain() {
            if let Err(e) = entry.task.await {
                warn!("Room {} task failed: {}", id, e);
            }
        }
    }
}

/// Room information for listing
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub id: Uuid,
    pub player_count: usize,
    pub max_players: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("Too many rooms")]
    TooManyRooms,
}
