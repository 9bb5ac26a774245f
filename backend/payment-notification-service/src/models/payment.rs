//! Payment/Order aggregate as seen by the confirmation flow
//!
//! The `payments` and `orders` tables belong to the storefront; this service only
//! reads the order summary and performs the status transitions.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Separator between the order id and the issuance instant in a transaction reference
pub const TXN_REF_SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Correlates a gateway callback with an order: `<orderId>-<issuedAtMillis>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnRef(String);

impl TxnRef {
    pub fn new(order_id: i64, issued_at_millis: i64) -> Self {
        Self(format!("{}{}{}", order_id, TXN_REF_SEPARATOR, issued_at_millis))
    }

    /// Reference for a payment URL created now
    pub fn issue(order_id: i64) -> Self {
        Self::new(order_id, chrono::Utc::now().timestamp_millis())
    }

    /// Wrap a reference received from the gateway; nothing is validated until
    /// [`TxnRef::order_id`] is called.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Order id from the leading segment, `None` when it is empty or not a
    /// positive integer.
    pub fn order_id(&self) -> Option<i64> {
        let leading = self.0.split(TXN_REF_SEPARATOR).next()?.trim();
        if leading.is_empty() {
            return None;
        }
        leading.parse::<i64>().ok().filter(|id| *id > 0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order fields the confirmation flow needs
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_id: i64,
    /// Paying customer; guest orders have none
    pub user_id: Option<Uuid>,
    pub order_code: Option<String>,
    pub final_amount: Option<Decimal>,
}

impl OrderSummary {
    /// Human-facing order code, falling back to the numeric id
    pub fn display_code(&self) -> String {
        match &self.order_code {
            Some(code) if !code.trim().is_empty() => code.clone(),
            _ => self.order_id.to_string(),
        }
    }
}

/// Result of a successful `pending -> completed` transition
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPayment {
    pub order_id: i64,
    pub amount: Option<Decimal>,
}

/// Terminal classification of one gateway callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Transition committed by this callback
    Completed { order_id: i64 },
    /// Payment was already completed; no side effects
    AlreadyCompleted { order_id: i64 },
    /// Gateway reported failure
    Failed { order_id: i64 },
    /// Order exists but has no payment row; nothing touched
    MissingPayment { order_id: i64 },
    /// Signature or parameters did not verify; nothing touched
    Unverified { order_id: i64 },
    /// Reference did not resolve to an order; nothing touched
    UnknownOrder,
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CallbackOutcome::Completed { .. } | CallbackOutcome::AlreadyCompleted { .. }
        )
    }

    /// `orderId` value of the return redirect
    pub fn order_label(&self) -> String {
        match self {
            CallbackOutcome::Completed { order_id }
            | CallbackOutcome::AlreadyCompleted { order_id }
            | CallbackOutcome::Failed { order_id }
            | CallbackOutcome::MissingPayment { order_id }
            | CallbackOutcome::Unverified { order_id } => order_id.to_string(),
            CallbackOutcome::UnknownOrder => "unknown".to_string(),
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            CallbackOutcome::Completed { .. } => "completed",
            CallbackOutcome::AlreadyCompleted { .. } => "already_completed",
            CallbackOutcome::Failed { .. } => "failed",
            CallbackOutcome::MissingPayment { .. } => "missing_payment",
            CallbackOutcome::Unverified { .. } => "unverified",
            CallbackOutcome::UnknownOrder => "unknown_order",
        }
    }
}

/// Format an amount the way `vi-VN` locales do: `1.250.000`, `12,5`
pub fn format_amount_vi(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = rounded.abs().to_string();
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(&frac);
    }
    out
}
