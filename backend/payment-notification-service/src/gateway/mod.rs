//! Payment gateway adapter boundary
//!
//! The confirmation flow only needs two capabilities from a gateway: building
//! the redirect URL for a new payment and verifying the parameters the gateway
//! sends back. Signature schemes live behind [`PaymentGateway`].

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::TxnRef;

pub mod vnpay;

pub use vnpay::VnpayGateway;

/// Everything needed to build a payment redirect
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUrlRequest {
    pub amount: Decimal,
    pub txn_ref: TxnRef,
    pub order_description: String,
    pub client_ip: String,
}

/// What the gateway reported for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Completed,
    Failed,
}

/// Result of checking an inbound callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackVerification {
    /// Signature and required parameters checked out
    pub valid: bool,
    /// Empty when the gateway did not send one
    pub txn_ref: TxnRef,
    pub transaction_id: Option<String>,
    pub outcome: GatewayOutcome,
}

pub trait PaymentGateway: Send + Sync {
    fn build_payment_url(&self, request: &PaymentUrlRequest) -> Result<String>;

    fn verify_callback(&self, raw_params: &HashMap<String, String>) -> CallbackVerification;
}
