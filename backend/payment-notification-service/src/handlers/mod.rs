/// HTTP handlers for the payment notification service
pub mod notifications;
pub mod payments;
pub mod websocket;

use actix_web::{web, HttpResponse};
use serde_json::json;

pub use notifications::register_routes as register_notifications;
pub use payments::register_routes as register_payments;
pub use websocket::register_routes as register_websocket;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().body("payment-notification-service")
}

/// Health, index and Prometheus scrape routes
pub fn register_service_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));
}

/// Every route of the service; shared by the binary and the HTTP tests
pub fn configure_routes(cfg: &mut web::ServiceConfig, auth: crate::middleware::JwtAuth) {
    register_service_routes(cfg);
    register_payments(cfg);
    register_websocket(cfg);
    register_notifications(cfg, auth);
}
