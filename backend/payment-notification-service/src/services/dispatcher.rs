/// Notification dispatcher
///
/// Persists notifications and emits the matching realtime events. The durable
/// write always happens first; realtime problems are logged and counted but
/// never fail a dispatch, while storage errors are returned to the caller.
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{AudienceResolver, NotificationStore};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{Audience, DispatchReport, DispatchRequest, DEFAULT_CATEGORY};
use crate::websocket::{NotificationPayload, RealtimeHandle};

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    audience: Arc<dyn AudienceResolver>,
    realtime: RealtimeHandle,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        audience: Arc<dyn AudienceResolver>,
        realtime: RealtimeHandle,
    ) -> Self {
        Self {
            store,
            audience,
            realtime,
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchReport> {
        match request.audience() {
            Audience::User(user_id) => self.dispatch_to_user(user_id, &request).await,
            Audience::PrivilegedGroup => self.dispatch_to_group(&request).await,
        }
    }

    async fn dispatch_to_user(
        &self,
        user_id: uuid::Uuid,
        request: &DispatchRequest,
    ) -> Result<DispatchReport> {
        let notification = self.store.create(request.for_recipient(user_id)).await?;
        metrics::record_notifications_persisted("user", 1);

        let payload = NotificationPayload::from_notification(&notification);
        let broadcast = self
            .emit(Audience::User(user_id), &notification.category, &payload)
            .await;

        debug!(
            notification_id = %notification.id,
            user_id = %user_id,
            broadcast,
            "Dispatched notification to user"
        );
        Ok(DispatchReport {
            audience: Audience::User(user_id),
            persisted: 1,
            notification_id: Some(notification.id),
            broadcast,
        })
    }

    async fn dispatch_to_group(&self, request: &DispatchRequest) -> Result<DispatchReport> {
        let members = self.audience.resolve_group().await?;

        let persisted = if members.is_empty() {
            warn!(
                category = %request.category,
                "No privileged accounts found, group notification not persisted"
            );
            0
        } else {
            let rows = members
                .iter()
                .map(|member| request.for_recipient(*member))
                .collect();
            let written = self.store.bulk_create(rows).await?;
            metrics::record_notifications_persisted("group", written);
            written
        };

        let category = event_category(&request.category);
        let payload = NotificationPayload::new(
            request.title.clone(),
            request.message.clone(),
            category,
            request.related.as_ref(),
        );
        let broadcast = self
            .emit(Audience::PrivilegedGroup, category, &payload)
            .await;

        info!(
            members = members.len(),
            persisted,
            broadcast,
            "Dispatched notification to privileged group"
        );
        Ok(DispatchReport {
            audience: Audience::PrivilegedGroup,
            persisted,
            notification_id: None,
            broadcast,
        })
    }

    /// Returns whether the event reached the realtime gateway
    async fn emit(&self, audience: Audience, event: &str, payload: &NotificationPayload) -> bool {
        let manager = match self.realtime.get() {
            Ok(manager) => manager,
            Err(e) => {
                warn!(audience = audience.label(), event, "Realtime emit skipped: {}", e);
                metrics::record_realtime_emit_failure(realtime_failure_reason(&e));
                return false;
            }
        };

        let result = match audience {
            Audience::User(user_id) => manager.broadcast_to_user(user_id, event, payload).await,
            Audience::PrivilegedGroup => manager.broadcast_to_group(event, payload).await,
        };

        match result {
            Ok(delivered) => {
                debug!(audience = audience.label(), event, delivered, "Realtime event emitted");
                true
            }
            Err(e) => {
                warn!(audience = audience.label(), event, "Realtime emit failed: {}", e);
                metrics::record_realtime_emit_failure(realtime_failure_reason(&e));
                false
            }
        }
    }
}

fn event_category(category: &str) -> &str {
    if category.trim().is_empty() {
        DEFAULT_CATEGORY
    } else {
        category
    }
}

fn realtime_failure_reason(error: &AppError) -> &'static str {
    match error {
        AppError::NotInitialized => "not_initialized",
        _ => "emit_error",
    }
}
