/// Recipient-scoped notification endpoints
///
/// Every route runs behind [`JwtAuth`]; the token subject is the only
/// recipient a caller can read or mark.
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::middleware::{AuthenticatedUser, JwtAuth};
use crate::models::{MarkReadTarget, PageRequest};
use crate::services::NotificationStore;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    #[serde(rename = "pageSize", alias = "limit")]
    pub page_size: Option<u32>,
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    user: AuthenticatedUser,
    store: web::Data<Arc<dyn NotificationStore>>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::new(query.page, query.page_size);
    let result = store.list(user.0, page).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// PUT /api/v1/notifications/{id}/read
///
/// `id` is a notification UUID or the literal `all`.
pub async fn mark_read(
    user: AuthenticatedUser,
    store: web::Data<Arc<dyn NotificationStore>>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let target: MarkReadTarget = path.into_inner().parse().map_err(AppError::Validation)?;
    mark(user, store.get_ref().as_ref(), target).await
}

/// PUT /api/v1/notifications/read-all
pub async fn mark_all_read(
    user: AuthenticatedUser,
    store: web::Data<Arc<dyn NotificationStore>>,
) -> Result<HttpResponse> {
    mark(user, store.get_ref().as_ref(), MarkReadTarget::All).await
}

async fn mark(
    user: AuthenticatedUser,
    store: &dyn NotificationStore,
    target: MarkReadTarget,
) -> Result<HttpResponse> {
    let updated = store.mark_read(user.0, target).await?;
    debug!(user_id = %user.0, updated, "Mark read request handled");

    let message = match target {
        MarkReadTarget::All => "All notifications marked as read",
        MarkReadTarget::One(_) => "Notification marked as read",
    };
    Ok(HttpResponse::Ok().json(json!({
        "message": message,
        "updated": updated,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig, auth: JwtAuth) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .wrap(auth)
            .route("", web::get().to(list_notifications))
            .route("/read-all", web::put().to(mark_all_read))
            .route("/{id}/read", web::put().to(mark_read)),
    );
}
