//! Throwaway Postgres schemas for the database-backed tests
//!
//! Each test gets its own schema on `search_path`, so storefront tables that
//! already exist in `DATABASE_URL` (and the foreign keys the migration attaches
//! to them) never leak into assertions.

use payment_notification_service::config::DatabaseConfig;
use payment_notification_service::db::create_pool;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

pub struct PgSchema {
    pub pool: PgPool,
    url: String,
    name: String,
}

impl PgSchema {
    /// Fresh schema with the bundled migrations applied
    pub async fn create() -> Option<Self> {
        Self::create_with(&[]).await
    }

    /// Fresh schema where `setup` runs before the migrations
    pub async fn create_with(setup: &[&str]) -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        };

        let mut conn = match PgConnection::connect(&url).await {
            Ok(conn) => conn,
            Err(e) => {
                eprintln!("Skipping test: database not available: {}", e);
                return None;
            }
        };

        let name = format!("notify_test_{}", Uuid::new_v4().simple());
        conn.execute(format!(r#"CREATE SCHEMA "{}""#, name).as_str())
            .await
            .expect("failed to create test schema");
        conn.execute(format!(r#"SET search_path TO "{}""#, name).as_str())
            .await
            .expect("failed to select test schema");
        for statement in setup {
            conn.execute(*statement)
                .await
                .expect("failed to run schema setup");
        }
        let _ = conn.close().await;

        let config = DatabaseConfig {
            url: url.clone(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 60,
            run_migrations: true,
            schema: Some(name.clone()),
        };
        let pool = create_pool(&config)
            .await
            .expect("failed to create pool for test schema");

        Some(Self { pool, url, name })
    }

    /// Run statements inside the schema
    pub async fn execute_all(&self, statements: &[&str]) {
        for statement in statements {
            self.pool
                .execute(*statement)
                .await
                .expect("failed to run statement");
        }
    }

    pub async fn teardown(self) {
        self.pool.close().await;
        if let Ok(mut conn) = PgConnection::connect(&self.url).await {
            let _ = conn
                .execute(format!(r#"DROP SCHEMA "{}" CASCADE"#, self.name).as_str())
                .await;
            let _ = conn.close().await;
        }
    }
}
