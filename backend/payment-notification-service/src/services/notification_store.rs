/// Durable notification store
///
/// Rows are created by the dispatcher and only ever mutated to set `read_at`.
/// Every read-marking statement is scoped to the owning recipient and to
/// `read_at IS NULL`, so a row is marked read at most once.
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{MarkReadTarget, NewNotification, Notification, NotificationPage, PageRequest};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert one unread notification
    async fn create(&self, row: NewNotification) -> Result<Notification>;

    /// Insert many unread notifications in one statement; returns rows written
    async fn bulk_create(&self, rows: Vec<NewNotification>) -> Result<u64>;

    /// Newest-first page plus a fresh unread count for the recipient
    async fn list(&self, recipient_id: Uuid, page: PageRequest) -> Result<NotificationPage>;

    /// Mark one or all of the recipient's unread rows as read; returns rows affected
    async fn mark_read(&self, recipient_id: Uuid, target: MarkReadTarget) -> Result<u64>;

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64>;
}

pub struct PgNotificationStore {
    db: PgPool,
}

impl PgNotificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn map_row(row: &PgRow) -> std::result::Result<Notification, sqlx::Error> {
        Ok(Notification {
            id: row.try_get("id")?,
            recipient_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            category: row.try_get("type")?,
            related_type: row.try_get("related_entity_type")?,
            related_id: row.try_get("related_entity_id")?,
            link: row.try_get("link")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, row: NewNotification) -> Result<Notification> {
        let query = r#"
            INSERT INTO notifications (
                id, user_id, title, message, type,
                related_entity_type, related_entity_id, read_at, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, NULL, $8, $8
            )
            RETURNING id, user_id, title, message, type, related_entity_type,
                      related_entity_id, link, read_at, created_at, updated_at
        "#;

        let now = Utc::now();
        let inserted = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(row.recipient_id)
            .bind(&row.title)
            .bind(&row.message)
            .bind(&row.category)
            .bind(row.related.as_ref().map(|r| r.entity_type.as_str()))
            .bind(row.related.as_ref().map(|r| r.entity_id))
            .bind(now)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                error!(recipient_id = %row.recipient_id, "Failed to create notification: {}", e);
                AppError::from(e)
            })?;

        let notification = Self::map_row(&inserted)?;
        debug!(
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            category = %notification.category,
            "Created notification"
        );
        Ok(notification)
    }

    async fn bulk_create(&self, rows: Vec<NewNotification>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let len = rows.len();
        let mut ids = Vec::with_capacity(len);
        let mut recipients = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut messages = Vec::with_capacity(len);
        let mut categories = Vec::with_capacity(len);
        let mut related_types: Vec<Option<String>> = Vec::with_capacity(len);
        let mut related_ids: Vec<Option<i64>> = Vec::with_capacity(len);
        for row in rows {
            ids.push(Uuid::new_v4());
            recipients.push(row.recipient_id);
            titles.push(row.title);
            messages.push(row.message);
            categories.push(row.category);
            related_types.push(row.related.as_ref().map(|r| r.entity_type.clone()));
            related_ids.push(row.related.map(|r| r.entity_id));
        }

        // Column arrays keep the statement at eight binds whatever the audience size.
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                id, user_id, title, message, type,
                related_entity_type, related_entity_id, created_at, updated_at
            )
            SELECT id, user_id, title, message, type,
                   related_type, related_id, $8, $8
            FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::text[], $4::text[], $5::text[],
                $6::text[], $7::int8[]
            ) AS t(id, user_id, title, message, type, related_type, related_id)
            "#,
        )
        .bind(&ids)
        .bind(&recipients)
        .bind(&titles)
        .bind(&messages)
        .bind(&categories)
        .bind(&related_types)
        .bind(&related_ids)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(|e| {
            error!(rows = len, "Failed to bulk create notifications: {}", e);
            AppError::from(e)
        })?;

        info!(rows = result.rows_affected(), "Bulk created notifications");
        Ok(result.rows_affected())
    }

    async fn list(&self, recipient_id: Uuid, page: PageRequest) -> Result<NotificationPage> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, message, type, related_entity_type,
                   related_entity_id, link, read_at, created_at, updated_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(recipient_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let items = rows
            .iter()
            .map(Self::map_row)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                .bind(recipient_id)
                .fetch_one(&self.db)
                .await?;

        let unread_count = self.unread_count(recipient_id).await?;

        Ok(NotificationPage {
            items,
            unread_count,
            total_pages: page.total_pages(total),
        })
    }

    async fn mark_read(&self, recipient_id: Uuid, target: MarkReadTarget) -> Result<u64> {
        let result = match target {
            MarkReadTarget::One(notification_id) => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET read_at = NOW(), updated_at = NOW()
                    WHERE id = $1 AND user_id = $2 AND read_at IS NULL
                    "#,
                )
                .bind(notification_id)
                .bind(recipient_id)
                .execute(&self.db)
                .await?
            }
            MarkReadTarget::All => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET read_at = NOW(), updated_at = NOW()
                    WHERE user_id = $1 AND read_at IS NULL
                    "#,
                )
                .bind(recipient_id)
                .execute(&self.db)
                .await?
            }
        };

        debug!(
            recipient_id = %recipient_id,
            target = ?target,
            affected = result.rows_affected(),
            "Marked notifications as read"
        );
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(recipient_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
