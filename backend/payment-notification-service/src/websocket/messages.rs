/// WebSocket frames exchanged with storefront clients
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, RelatedEntity};

/// Frames sent by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enrol this connection into `user:<user_id>`
    JoinUserRoom { user_id: Uuid },

    /// Enrol this connection into `admin_group`; the declared role is trusted
    JoinAdminRoom,

    /// Leave one room by its wire name
    LeaveRoom { room: String },

    /// Application-level keepalive
    Ping,
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Payload carried by category events and `notification_received`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Row id; absent on group broadcasts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub category: String,
    pub related_type: Option<String>,
    pub related_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        category: impl Into<String>,
        related: Option<&RelatedEntity>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            message: message.into(),
            category: category.into(),
            related_type: related.map(|r| r.entity_type.clone()),
            related_id: related.map(|r| r.entity_id),
            timestamp: Utc::now(),
        }
    }

    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            id: Some(notification.id),
            title: notification.title.clone(),
            message: notification.message.clone(),
            category: notification.category.clone(),
            related_type: notification.related_type.clone(),
            related_id: notification.related_id,
            timestamp: Utc::now(),
        }
    }
}

/// Server frame: `{"event": <name>, "data": <payload>}`
#[derive(Debug, Serialize)]
pub struct ServerEvent<'a, T: Serialize> {
    pub event: &'a str,
    pub data: &'a T,
}

impl<'a, T: Serialize> ServerEvent<'a, T> {
    pub fn new(event: &'a str, data: &'a T) -> Self {
        Self { event, data }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedData {
    pub room: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PongData {
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

/// `joined` acknowledgement frame
pub fn joined_frame(room: &str, unread_count: Option<i64>) -> Result<String, serde_json::Error> {
    let data = JoinedData {
        room: room.to_string(),
        unread_count,
    };
    ServerEvent::new("joined", &data).to_json()
}

pub fn pong_frame() -> Result<String, serde_json::Error> {
    let data = PongData {
        timestamp: Utc::now().timestamp(),
    };
    ServerEvent::new("pong", &data).to_json()
}

pub fn error_frame(code: &str, message: &str) -> Result<String, serde_json::Error> {
    let data = ErrorData {
        code: code.to_string(),
        message: message.to_string(),
    };
    ServerEvent::new("error", &data).to_json()
}
