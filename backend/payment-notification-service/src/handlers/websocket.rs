/// WebSocket upgrade and realtime gateway status
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::services::NotificationStore;
use crate::websocket::{ConnectionManager, Room, WsSession};

/// WebSocket message size limit (256 KB)
const WS_MESSAGE_SIZE_LIMIT: usize = 256_000;

/// GET /ws
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    manager: web::Data<ConnectionManager>,
    store: web::Data<Arc<dyn NotificationStore>>,
) -> ActixResult<HttpResponse> {
    debug!(peer = ?req.peer_addr(), "WebSocket upgrade requested");
    let session = WsSession::new(manager.get_ref().clone(), store.get_ref().clone());

    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(WS_MESSAGE_SIZE_LIMIT)
        .start()
}

/// GET /api/v1/ws/metrics
pub async fn ws_metrics(manager: web::Data<ConnectionManager>) -> ActixResult<HttpResponse> {
    let total_connections = manager.total_connections().await;
    let connected_users = manager.connected_users_count().await;
    let admin_connections = manager.room_size(Room::AdminGroup).await;

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "admin_connections": admin_connections,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_connect)).service(
        web::scope("/api/v1/ws").route("/metrics", web::get().to(ws_metrics)),
    );
}
