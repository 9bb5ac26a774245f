/// Room-scoped WebSocket connection manager
///
/// Tracks which connections sit in which room and emits encoded frames to them.
/// Two room kinds exist:
/// - `user:<id>`: every connection that announced that user identity
/// - `admin_group`: every connection that requested privileged enrolment
///
/// A connection may be in several rooms at once and a user may hold several
/// connections. Dead senders are pruned while emitting.
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::messages::ServerEvent;
use crate::error::{AppError, Result};
use crate::models::NOTIFICATION_RECEIVED;

/// Encoded frame sender owned by one connection
pub type FrameSender = mpsc::UnboundedSender<String>;

pub const ADMIN_GROUP_ROOM: &str = "admin_group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Uuid),
    AdminGroup,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(user_id) => write!(f, "user:{}", user_id),
            Room::AdminGroup => f.write_str(ADMIN_GROUP_ROOM),
        }
    }
}

impl FromStr for Room {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == ADMIN_GROUP_ROOM {
            return Ok(Room::AdminGroup);
        }
        s.strip_prefix("user:")
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(Room::User)
            .ok_or_else(|| format!("unknown room: {}", s))
    }
}

/// Identifies one WebSocket connection for precise cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: FrameSender,
}

#[derive(Clone, Default)]
pub struct ConnectionManager {
    rooms: Arc<RwLock<HashMap<Room, Vec<Subscriber>>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrol a connection into a room. Joining the same room twice is a no-op.
    pub async fn join(&self, room: Room, subscriber_id: SubscriberId, sender: FrameSender) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room).or_default();

        if members.iter().any(|s| s.id == subscriber_id) {
            return;
        }
        members.push(Subscriber {
            id: subscriber_id,
            sender,
        });

        debug!(room = %room, members = members.len(), "Connection joined room");
    }

    pub async fn leave(&self, room: Room, subscriber_id: SubscriberId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room) {
            members.retain(|s| s.id != subscriber_id);
            if members.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    /// Remove a connection from every room; called when the socket closes
    pub async fn leave_all(&self, subscriber_id: SubscriberId) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.retain(|s| s.id != subscriber_id);
            !members.is_empty()
        });
    }

    /// Send an encoded frame to every connection in a room.
    ///
    /// Returns the number of connections the frame was handed to.
    pub async fn emit(&self, room: Room, frame: String) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(&room) else {
            return 0;
        };

        let before = members.len();
        members.retain(|s| s.sender.send(frame.clone()).is_ok());
        let delivered = members.len();

        if before != delivered {
            debug!(
                room = %room,
                pruned = before - delivered,
                "Pruned closed connections"
            );
        }
        if members.is_empty() {
            rooms.remove(&room);
        }

        delivered
    }

    /// Emit `event_name` and the generic `notification_received` to one room
    pub async fn emit_event<T: Serialize>(
        &self,
        room: Room,
        event_name: &str,
        payload: &T,
    ) -> Result<usize> {
        let frame = ServerEvent::new(event_name, payload)
            .to_json()
            .map_err(|e| AppError::Internal(format!("failed to encode realtime event: {}", e)))?;
        let delivered = self.emit(room, frame).await;

        if event_name != NOTIFICATION_RECEIVED {
            let generic = ServerEvent::new(NOTIFICATION_RECEIVED, payload)
                .to_json()
                .map_err(|e| {
                    AppError::Internal(format!("failed to encode realtime event: {}", e))
                })?;
            self.emit(room, generic).await;
        }

        Ok(delivered)
    }

    pub async fn broadcast_to_user<T: Serialize>(
        &self,
        user_id: Uuid,
        event_name: &str,
        payload: &T,
    ) -> Result<usize> {
        self.emit_event(Room::User(user_id), event_name, payload)
            .await
    }

    pub async fn broadcast_to_group<T: Serialize>(
        &self,
        event_name: &str,
        payload: &T,
    ) -> Result<usize> {
        self.emit_event(Room::AdminGroup, event_name, payload).await
    }

    pub async fn room_size(&self, room: Room) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&room).map(|m| m.len()).unwrap_or(0)
    }

    /// Distinct connections across all rooms
    pub async fn total_connections(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .flat_map(|members| members.iter().map(|s| s.id))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Users with at least one joined connection
    pub async fn connected_users_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms
            .keys()
            .filter(|room| matches!(room, Room::User(_)))
            .count()
    }
}
