//! Process-wide map from room code to room

use crate::room::Room;
use crate::utils::{generate_room_code, normalize_room_code};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub type RoomHandle = Arc<Mutex<Room>>;

/// Concurrency-safe room registry
///
/// The map lock is only ever held for lookups and insertions. Callers clone
/// a [`RoomHandle`] out and then lock the room itself, so two rooms never
/// contend with each other.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh code and stores the room produced by `build`
    pub async fn create<F>(&self, build: F) -> (String, RoomHandle)
    where
        F: FnOnce(String) -> Room,
    {
        let mut rooms = self.rooms.write().await;
        let code = loop {
            let candidate = generate_room_code();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let handle = Arc::new(Mutex::new(build(code.clone())));
        rooms.insert(code.clone(), Arc::clone(&handle));
        (code, handle)
    }

    pub async fn get(&self, code: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(&normalize_room_code(code)).cloned()
    }

    pub async fn remove(&self, code: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        rooms.remove(&normalize_room_code(code)).is_some()
    }

    /// Every live room, for the scheduler
    pub async fn handles(&self) -> Vec<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
