/// PostgreSQL-backed payment transitions and audience resolution
///
/// The storefront's `orders`, `payments`, `roles` and `user_roles` tables are
/// recreated in a throwaway schema; skipped when `DATABASE_URL` is unset or
/// unreachable.
mod common;

use chrono::Utc;
use common::pg::PgSchema;
use payment_notification_service::models::payment::CompletedPayment;
use payment_notification_service::models::{PaymentStatus, TxnRef};
use payment_notification_service::services::{
    AudienceResolver, PaymentCompletion, PaymentRepository, PaymentTransition,
    PgAudienceResolver, PgPaymentRepository,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const STOREFRONT_TABLES: &[&str] = &[
    r#"
    CREATE TABLE orders (
        order_id BIGINT PRIMARY KEY,
        user_id UUID,
        order_code VARCHAR(50),
        final_amount NUMERIC(15, 2),
        status VARCHAR(30) NOT NULL DEFAULT 'pending',
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE payments (
        payment_id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES orders (order_id),
        amount NUMERIC(15, 2),
        payment_status VARCHAR(20) NOT NULL DEFAULT 'pending',
        txn_ref VARCHAR(100),
        transaction_id VARCHAR(100),
        paid_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE roles (
        role_id SERIAL PRIMARY KEY,
        role_name VARCHAR(50) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE user_roles (
        user_id UUID NOT NULL,
        role_id INT NOT NULL REFERENCES roles (role_id)
    )
    "#,
];

async fn storefront() -> Option<PgSchema> {
    let schema = PgSchema::create().await?;
    schema.execute_all(STOREFRONT_TABLES).await;
    Some(schema)
}

async fn seed_order(schema: &PgSchema, order_id: i64, payment_amount: Option<i64>) {
    sqlx::query("INSERT INTO orders (order_id, order_code, final_amount) VALUES ($1, $2, $3)")
        .bind(order_id)
        .bind(format!("ORD-{}", order_id))
        .bind(Decimal::new(1_250_000, 0))
        .execute(&schema.pool)
        .await
        .unwrap();

    if let Some(amount) = payment_amount {
        sqlx::query("INSERT INTO payments (order_id, amount) VALUES ($1, $2)")
            .bind(order_id)
            .bind(Decimal::new(amount, 0))
            .execute(&schema.pool)
            .await
            .unwrap();
    }
}

async fn payment_status(schema: &PgSchema, order_id: i64) -> String {
    sqlx::query_scalar("SELECT payment_status FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&schema.pool)
        .await
        .unwrap()
}

async fn order_status(schema: &PgSchema, order_id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&schema.pool)
        .await
        .unwrap()
}

fn completion(order_id: i64, attempt: i64) -> PaymentCompletion {
    PaymentCompletion {
        order_id,
        txn_ref: TxnRef::new(order_id, 1_717_171_717_000 + attempt),
        transaction_id: Some(format!("tx-{}", attempt)),
        paid_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_concurrent_completions_commit_once() {
    let Some(schema) = storefront().await else { return };
    seed_order(&schema, 900, Some(150_000)).await;
    let repo = Arc::new(PgPaymentRepository::new(schema.pool.clone()));

    let mut tasks = Vec::new();
    for attempt in 0..8 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            repo.complete_payment(completion(900, attempt)).await.unwrap()
        }));
    }

    let mut completed = Vec::new();
    let mut already = 0;
    for task in tasks {
        match task.await.unwrap() {
            PaymentTransition::Completed(payment) => completed.push(payment),
            PaymentTransition::AlreadyCompleted => already += 1,
            PaymentTransition::Missing => panic!("payment row exists"),
        }
    }

    assert_eq!(
        completed,
        vec![CompletedPayment {
            order_id: 900,
            amount: Some(Decimal::new(150_000, 0)),
        }]
    );
    assert_eq!(already, 7);
    assert_eq!(
        payment_status(&schema, 900).await,
        PaymentStatus::Completed.as_str()
    );
    assert_eq!(order_status(&schema, 900).await, "processing");

    schema.teardown().await;
}

#[tokio::test]
async fn test_order_without_payment_row_is_missing() {
    let Some(schema) = storefront().await else { return };
    seed_order(&schema, 901, None).await;
    let repo = PgPaymentRepository::new(schema.pool.clone());

    assert_eq!(
        repo.complete_payment(completion(901, 0)).await.unwrap(),
        PaymentTransition::Missing
    );
    assert_eq!(order_status(&schema, 901).await, "pending");
    assert!(!repo.fail_payment(901).await.unwrap());

    schema.teardown().await;
}

#[tokio::test]
async fn test_failure_never_downgrades_completed_payment() {
    let Some(schema) = storefront().await else { return };
    seed_order(&schema, 902, Some(99_500)).await;
    let repo = PgPaymentRepository::new(schema.pool.clone());

    assert!(repo.fail_payment(902).await.unwrap());
    assert_eq!(
        payment_status(&schema, 902).await,
        PaymentStatus::Failed.as_str()
    );

    // A later successful attempt still completes a failed payment
    assert!(matches!(
        repo.complete_payment(completion(902, 1)).await.unwrap(),
        PaymentTransition::Completed(_)
    ));

    assert!(!repo.fail_payment(902).await.unwrap());
    assert_eq!(
        payment_status(&schema, 902).await,
        PaymentStatus::Completed.as_str()
    );

    schema.teardown().await;
}

#[tokio::test]
async fn test_find_order() {
    let Some(schema) = storefront().await else { return };
    seed_order(&schema, 903, Some(10)).await;
    let repo = PgPaymentRepository::new(schema.pool.clone());

    let order = repo.find_order(903).await.unwrap().unwrap();
    assert_eq!(order.user_id, None);
    assert_eq!(order.display_code(), "ORD-903");
    assert_eq!(order.final_amount, Some(Decimal::new(1_250_000, 0)));
    assert!(repo.find_order(904).await.unwrap().is_none());

    schema.teardown().await;
}

#[tokio::test]
async fn test_resolve_group_ignores_case_and_padding() {
    let Some(schema) = storefront().await else { return };
    let admin = Uuid::new_v4();
    let padded_staff = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let both = Uuid::new_v4();

    schema
        .execute_all(&[
            "INSERT INTO roles (role_id, role_name) VALUES \
             (1, 'Admin'), (2, 'Staff '), (3, 'customer'), (4, ' STAFF')",
        ])
        .await;
    for (user_id, role_id) in [
        (admin, 1),
        (padded_staff, 2),
        (customer, 3),
        (both, 1),
        (both, 4),
    ] {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role_id)
            .execute(&schema.pool)
            .await
            .unwrap();
    }

    let members = PgAudienceResolver::new(schema.pool.clone())
        .resolve_group()
        .await
        .unwrap();

    assert_eq!(members.len(), 3);
    assert!(members.contains(&admin));
    assert!(members.contains(&padded_staff));
    assert!(members.contains(&both));
    assert!(!members.contains(&customer));

    schema.teardown().await;
}

#[tokio::test]
async fn test_resolve_group_without_privileged_accounts_is_empty() {
    let Some(schema) = storefront().await else { return };

    let members = PgAudienceResolver::new(schema.pool.clone())
        .resolve_group()
        .await
        .unwrap();
    assert!(members.is_empty());

    schema.teardown().await;
}
