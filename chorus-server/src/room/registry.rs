use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::room::Room;

/// Process-wide mapping from room identifier to room. Rooms are created on
/// demand and live for the process lifetime; an empty room stays registered.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Return the room for `id`, creating it if absent. Concurrent callers
    /// with the same id always land in the same room.
    pub fn get_or_create(&self, id: &str) -> Arc<Room> {
        self.rooms
            .entry(id.to_owned())
            .or_insert_with(|| {
                info!(room = id, "creating room");
                Room::new(id)
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
