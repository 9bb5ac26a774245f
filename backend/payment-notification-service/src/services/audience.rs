/// Privileged-group audience resolution
///
/// The group room is static but its membership in the user store is not, so the
/// recipient list is resolved on every group dispatch.
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Role;

#[async_trait]
pub trait AudienceResolver: Send + Sync {
    /// Current privileged accounts; empty when there are none
    async fn resolve_group(&self) -> Result<Vec<Uuid>>;
}

/// Resolves the group from the storefront's `users` / `user_roles` / `roles` tables
pub struct PgAudienceResolver {
    db: PgPool,
}

impl PgAudienceResolver {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Keep users holding at least one privileged role, deduplicated and ordered
pub fn privileged_members<I, S>(assignments: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = (Uuid, S)>,
    S: AsRef<str>,
{
    assignments
        .into_iter()
        .filter(|(_, role_name)| Role::from_name(role_name.as_ref()).is_privileged())
        .map(|(user_id, _)| user_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl AudienceResolver for PgAudienceResolver {
    async fn resolve_group(&self) -> Result<Vec<Uuid>> {
        let names: Vec<String> = Role::PRIVILEGED
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();

        let rows = sqlx::query(
            r#"
            SELECT ur.user_id, r.role_name
            FROM user_roles ur
            JOIN roles r ON r.role_id = ur.role_id
            WHERE LOWER(TRIM(r.role_name)) = ANY($1)
            "#,
        )
        .bind(&names)
        .fetch_all(&self.db)
        .await?;

        let assignments = rows
            .iter()
            .map(|row| -> std::result::Result<(Uuid, String), sqlx::Error> {
                Ok((row.try_get("user_id")?, row.try_get("role_name")?))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        let members = privileged_members(assignments);
        debug!(members = members.len(), "Resolved privileged group");
        Ok(members)
    }
}
