//! Process-wide canvas-id → room map with on-demand creation.
//!
//! The registry mutex guards only the map itself; each room carries its own
//! lock. A room is created on first reference, whether that reference comes
//! from a login or from the persistence loader.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::room::Room;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<u8, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canvas_id: u8) -> Option<Arc<Room>> {
        self.rooms
            .lock()
            .expect("room registry poisoned")
            .get(&canvas_id)
            .cloned()
    }

    pub fn get_or_create(&self, canvas_id: u8) -> Arc<Room> {
        self.rooms
            .lock()
            .expect("room registry poisoned")
            .entry(canvas_id)
            .or_insert_with(|| {
                info!(target: "room", canvas = canvas_id, "room created");
                Arc::new(Room::new(canvas_id))
            })
            .clone()
    }

    /// All rooms in canvas-id order; the persistence pass iterates this.
    pub fn snapshot(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self
            .rooms
            .lock()
            .expect("room registry poisoned")
            .values()
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.canvas_id());
        rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().expect("room registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_on_first_reference() {
        let registry = RoomRegistry::new();
        assert!(registry.get(3).is_none());
        let room = registry.get_or_create(3);
        assert_eq!(room.canvas_id(), 3);
        assert!(Arc::ptr_eq(&room, &registry.get_or_create(3)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_ordered_by_canvas_id() {
        let registry = RoomRegistry::new();
        registry.get_or_create(9);
        registry.get_or_create(1);
        registry.get_or_create(4);
        let ids: Vec<u8> = registry.snapshot().iter().map(|r| r.canvas_id()).collect();
        assert_eq!(ids, vec![1, 4, 9]);
    }
}
