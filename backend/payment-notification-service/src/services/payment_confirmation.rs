/// Payment confirmation state machine
///
/// Consumes gateway callbacks and drives `payments.payment_status`:
///
/// ```text
/// pending --verified success--> completed   (order -> processing, notify)
/// pending --verified failure--> failed      (no notification)
/// completed --any callback-->   completed   (no side effects)
/// ```
///
/// The transition itself is one conditional update in the repository, so a
/// retried or concurrent callback can never notify twice. Notifications run
/// after the commit, one branch per audience, and a failing branch is logged
/// and counted without touching the other branch or the committed payment.
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{NotificationDispatcher, PaymentCompletion, PaymentRepository, PaymentTransition};
use crate::error::{AppError, Result};
use crate::gateway::{CallbackVerification, GatewayOutcome, PaymentGateway, PaymentUrlRequest};
use crate::metrics;
use crate::models::payment::{format_amount_vi, CompletedPayment};
use crate::models::{
    CallbackOutcome, DispatchReport, DispatchRequest, OrderSummary, RelatedEntity, TxnRef,
};

pub const PAYMENT_SUCCESS: &str = "payment_success";
pub const PAYMENT_RECEIVED: &str = "payment_received";

/// Result of one post-payment notification branch
#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutcome {
    /// Callback did not complete a payment
    NotAttempted,
    /// Nothing to notify, e.g. a guest order has no user
    Skipped,
    Delivered(DispatchReport),
    Failed(AppError),
}

impl BranchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, BranchOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackReport {
    pub outcome: CallbackOutcome,
    pub user_branch: BranchOutcome,
    pub group_branch: BranchOutcome,
}

impl CallbackReport {
    fn without_notifications(outcome: CallbackOutcome) -> Self {
        Self {
            outcome,
            user_branch: BranchOutcome::NotAttempted,
            group_branch: BranchOutcome::NotAttempted,
        }
    }
}

pub struct PaymentConfirmationHandler {
    payments: Arc<dyn PaymentRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentConfirmationHandler {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            payments,
            dispatcher,
            gateway,
        }
    }

    /// Issue a transaction reference for the order and build the gateway redirect
    pub fn create_payment_url(
        &self,
        order_id: i64,
        amount: Decimal,
        client_ip: &str,
    ) -> Result<String> {
        if order_id <= 0 {
            return Err(AppError::Validation("orderId is required".to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount is required".to_string()));
        }

        let txn_ref = TxnRef::issue(order_id);
        let url = self.gateway.build_payment_url(&PaymentUrlRequest {
            amount,
            txn_ref: txn_ref.clone(),
            order_description: format!("Payment for order #{}", order_id),
            client_ip: client_ip.to_string(),
        })?;

        info!(order_id, txn_ref = %txn_ref, "Created payment URL");
        Ok(url)
    }

    pub async fn handle_callback(
        &self,
        raw_params: &HashMap<String, String>,
    ) -> Result<CallbackReport> {
        let report = self.process_callback(raw_params).await?;
        metrics::record_payment_callback(report.outcome.metric_label());
        Ok(report)
    }

    async fn process_callback(
        &self,
        raw_params: &HashMap<String, String>,
    ) -> Result<CallbackReport> {
        let verification = self.gateway.verify_callback(raw_params);

        let order = match self.resolve_order(&verification).await {
            Ok(order) => order,
            Err(AppError::UnresolvedOrder(reference)) => {
                warn!(txn_ref = %reference, "Callback does not reference a known order");
                return Ok(CallbackReport::without_notifications(
                    CallbackOutcome::UnknownOrder,
                ));
            }
            Err(AppError::GatewayVerification { order_id }) => {
                warn!(order_id, "Callback failed gateway verification");
                return Ok(CallbackReport::without_notifications(
                    CallbackOutcome::Unverified { order_id },
                ));
            }
            Err(e) => return Err(e),
        };
        let order_id = order.order_id;

        match verification.outcome {
            GatewayOutcome::Failed => {
                let changed = self.payments.fail_payment(order_id).await?;
                info!(order_id, changed, "Gateway reported payment failure");
                Ok(CallbackReport::without_notifications(
                    CallbackOutcome::Failed { order_id },
                ))
            }
            GatewayOutcome::Completed => {
                let completion = PaymentCompletion {
                    order_id,
                    txn_ref: verification.txn_ref,
                    transaction_id: verification.transaction_id,
                    paid_at: Utc::now(),
                };

                match self.payments.complete_payment(completion).await? {
                    PaymentTransition::Completed(payment) => {
                        let (user_branch, group_branch) =
                            self.notify_payment(&order, &payment).await;
                        Ok(CallbackReport {
                            outcome: CallbackOutcome::Completed { order_id },
                            user_branch,
                            group_branch,
                        })
                    }
                    PaymentTransition::AlreadyCompleted => {
                        info!(order_id, "Payment already completed, ignoring callback");
                        Ok(CallbackReport::without_notifications(
                            CallbackOutcome::AlreadyCompleted { order_id },
                        ))
                    }
                    PaymentTransition::Missing => {
                        warn!(order_id, "No payment row for order");
                        Ok(CallbackReport::without_notifications(
                            CallbackOutcome::MissingPayment { order_id },
                        ))
                    }
                }
            }
        }
    }

    /// Order behind a verified callback.
    ///
    /// Fails with `UnresolvedOrder` before any signature check when the
    /// reference carries no order id, so the redirect can say `unknown`.
    async fn resolve_order(&self, verification: &CallbackVerification) -> Result<OrderSummary> {
        let order_id = verified_order_id(verification)?;
        self.payments
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::UnresolvedOrder(verification.txn_ref.to_string()))
    }

    async fn notify_payment(
        &self,
        order: &OrderSummary,
        payment: &CompletedPayment,
    ) -> (BranchOutcome, BranchOutcome) {
        let code = order.display_code();
        let related = RelatedEntity::order(order.order_id);

        let user_branch = match order.user_id {
            Some(user_id) => {
                let request = DispatchRequest::to_user(
                    user_id,
                    "Payment successful!",
                    format!("Order #{} has been paid successfully.", code),
                    PAYMENT_SUCCESS,
                )
                .with_related(related.clone());
                self.run_branch("user", request).await
            }
            None => BranchOutcome::Skipped,
        };

        let amount = payment
            .amount
            .or(order.final_amount)
            .unwrap_or(Decimal::ZERO);
        let request = DispatchRequest::to_group(
            "VNPAY payment received",
            format!("Order #{} paid {}đ", code, format_amount_vi(amount)),
            PAYMENT_RECEIVED,
        )
        .with_related(related);
        let group_branch = self.run_branch("group", request).await;

        (user_branch, group_branch)
    }

    async fn run_branch(&self, branch: &'static str, request: DispatchRequest) -> BranchOutcome {
        match self.dispatcher.dispatch(request).await {
            Ok(report) => BranchOutcome::Delivered(report),
            Err(e) => {
                error!(branch, "Payment notification failed: {}", e);
                metrics::record_branch_failure(branch);
                BranchOutcome::Failed(e)
            }
        }
    }
}

fn verified_order_id(verification: &CallbackVerification) -> Result<i64> {
    let order_id = verification
        .txn_ref
        .order_id()
        .ok_or_else(|| AppError::UnresolvedOrder(verification.txn_ref.to_string()))?;
    if !verification.valid {
        return Err(AppError::GatewayVerification { order_id });
    }
    Ok(order_id)
}
