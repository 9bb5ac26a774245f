/// Realtime broadcast gateway
///
/// 1. ConnectionManager: room membership and frame emission
/// 2. RealtimeHandle: late-bound accessor injected into producers
/// 3. WsSession: one actor per client connection, handles join/leave frames

pub mod handle;
pub mod manager;
pub mod messages;
pub mod session;

pub use handle::RealtimeHandle;
pub use manager::{ConnectionManager, Room, SubscriberId, ADMIN_GROUP_ROOM};
pub use messages::{ClientMessage, NotificationPayload};
pub use session::WsSession;
