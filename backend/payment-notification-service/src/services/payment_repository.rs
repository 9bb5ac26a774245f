/// Status transitions on the storefront's Payment/Order aggregate
///
/// Both transitions are conditional single-statement updates, so concurrent
/// callbacks for one order are serialised by the database row lock: only one
/// of them can observe `payment_status <> 'completed'` and change the row.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::error::Result;
use crate::models::payment::CompletedPayment;
use crate::models::{OrderSummary, PaymentStatus, TxnRef};

/// Fields written when a payment completes
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCompletion {
    pub order_id: i64,
    pub txn_ref: TxnRef,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// What a completion attempt did to the payment row
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentTransition {
    /// This call moved the payment to `completed`
    Completed(CompletedPayment),
    /// Payment was already `completed`; nothing written
    AlreadyCompleted,
    /// No payment row exists for the order; nothing written
    Missing,
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_order(&self, order_id: i64) -> Result<Option<OrderSummary>>;

    /// `pending|failed -> completed` and order `-> processing`, atomically.
    ///
    /// Only [`PaymentTransition::Completed`] means rows were written.
    async fn complete_payment(&self, completion: PaymentCompletion) -> Result<PaymentTransition>;

    /// `pending -> failed`; never downgrades a completed payment.
    /// Returns whether a row changed.
    async fn fail_payment(&self, order_id: i64) -> Result<bool>;
}

pub struct PgPaymentRepository {
    db: PgPool,
}

impl PgPaymentRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn find_order(&self, order_id: i64) -> Result<Option<OrderSummary>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, user_id, order_code, final_amount
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(OrderSummary {
            order_id: row.try_get("order_id")?,
            user_id: row.try_get("user_id")?,
            order_code: row.try_get("order_code")?,
            final_amount: row.try_get::<Option<Decimal>, _>("final_amount")?,
        }))
    }

    async fn complete_payment(
        &self,
        completion: PaymentCompletion,
    ) -> Result<PaymentTransition> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET payment_status = $2,
                txn_ref = $3,
                transaction_id = $4,
                paid_at = $5,
                updated_at = NOW()
            WHERE order_id = $1 AND payment_status <> $2
            RETURNING amount
            "#,
        )
        .bind(completion.order_id)
        .bind(PaymentStatus::Completed.as_str())
        .bind(completion.txn_ref.as_str())
        .bind(&completion.transaction_id)
        .bind(completion.paid_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT payment_status FROM payments WHERE order_id = $1")
                    .bind(completion.order_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(match exists {
                Some(_) => PaymentTransition::AlreadyCompleted,
                None => PaymentTransition::Missing,
            });
        };
        let amount: Option<Decimal> = row.try_get("amount")?;

        let order = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'processing', updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(completion.order_id)
        .execute(&mut *tx)
        .await?;

        if order.rows_affected() == 0 {
            warn!(order_id = completion.order_id, "Payment completed but order row missing");
        }

        tx.commit().await?;

        info!(
            order_id = completion.order_id,
            txn_ref = %completion.txn_ref,
            "Payment completed"
        );
        Ok(PaymentTransition::Completed(CompletedPayment {
            order_id: completion.order_id,
            amount,
        }))
    }

    async fn fail_payment(&self, order_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET payment_status = $2, updated_at = NOW()
            WHERE order_id = $1 AND payment_status <> $3
            "#,
        )
        .bind(order_id)
        .bind(PaymentStatus::Failed.as_str())
        .bind(PaymentStatus::Completed.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
