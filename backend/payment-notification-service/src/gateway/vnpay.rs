/// VNPAY 2.1.0 signed-query adapter
///
/// Parameters are sorted by key, form-encoded (spaces as `+`) and signed with
/// HMAC-SHA512 over the resulting query string; the hex digest travels as
/// `vnp_SecureHash`.
use chrono::{Duration, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::{CallbackVerification, GatewayOutcome, PaymentGateway, PaymentUrlRequest};
use crate::config::GatewayConfig;
use crate::error::{AppError, Result};
use crate::models::TxnRef;

type HmacSha512 = Hmac<Sha512>;

const VERSION: &str = "2.1.0";
const SECURE_HASH: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
const SUCCESS_CODE: &str = "00";
/// VNPAY timestamps are Vietnam local time (GMT+7)
const VN_OFFSET_SECS: i32 = 7 * 3600;
const EXPIRY_MINUTES: i64 = 15;

pub struct VnpayGateway {
    tmn_code: String,
    hash_secret: String,
    pay_url: String,
    return_url: String,
    locale: String,
}

impl VnpayGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            tmn_code: config.tmn_code.clone(),
            hash_secret: config.hash_secret.clone(),
            pay_url: config.pay_url.clone(),
            return_url: config.return_url.clone(),
            locale: config.locale.clone(),
        }
    }

    fn mac(&self) -> Result<HmacSha512> {
        HmacSha512::new_from_slice(self.hash_secret.as_bytes())
            .map_err(|e| AppError::Config(format!("invalid gateway hash secret: {}", e)))
    }

    fn sign(&self, data: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signature_matches(&self, data: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        match self.mac() {
            Ok(mut mac) => {
                mac.update(data.as_bytes());
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        }
    }
}

fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// `k=v&k=v` over sorted keys with form-encoded values
fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Gateway amounts are integers in 1/100 of the currency unit
fn gateway_amount(amount: Decimal) -> String {
    (amount * Decimal::ONE_HUNDRED).round().to_string()
}

impl PaymentGateway for VnpayGateway {
    fn build_payment_url(&self, request: &PaymentUrlRequest) -> Result<String> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }

        let offset = FixedOffset::east_opt(VN_OFFSET_SECS)
            .ok_or_else(|| AppError::Internal("invalid gateway timezone offset".to_string()))?;
        let now = Utc::now().with_timezone(&offset);
        let expires = now + Duration::minutes(EXPIRY_MINUTES);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VERSION.to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.tmn_code.clone());
        params.insert("vnp_Locale".to_string(), self.locale.clone());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), request.txn_ref.to_string());
        params.insert(
            "vnp_OrderInfo".to_string(),
            request.order_description.clone(),
        );
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Amount".to_string(), gateway_amount(request.amount));
        params.insert("vnp_ReturnUrl".to_string(), self.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), request.client_ip.clone());
        params.insert(
            "vnp_CreateDate".to_string(),
            now.format("%Y%m%d%H%M%S").to_string(),
        );
        params.insert(
            "vnp_ExpireDate".to_string(),
            expires.format("%Y%m%d%H%M%S").to_string(),
        );

        let query = canonical_query(&params);
        let signature = self.sign(&query)?;

        debug!(txn_ref = %request.txn_ref, "Built gateway payment URL");
        Ok(format!(
            "{}?{}&{}={}",
            self.pay_url, query, SECURE_HASH, signature
        ))
    }

    fn verify_callback(&self, raw_params: &HashMap<String, String>) -> CallbackVerification {
        let signed: BTreeMap<String, String> = raw_params
            .iter()
            .filter(|(k, _)| k.starts_with("vnp_") && *k != SECURE_HASH && *k != SECURE_HASH_TYPE)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let valid = match raw_params.get(SECURE_HASH) {
            Some(signature) => self.signature_matches(&canonical_query(&signed), signature),
            None => false,
        };

        let txn_ref = TxnRef::from_raw(raw_params.get("vnp_TxnRef").cloned().unwrap_or_default());
        let transaction_id = raw_params
            .get("vnp_TransactionNo")
            .filter(|v| !v.is_empty())
            .cloned();

        let response_ok = raw_params.get("vnp_ResponseCode").map(String::as_str) == Some(SUCCESS_CODE);
        let status_ok = raw_params
            .get("vnp_TransactionStatus")
            .map(|s| s == SUCCESS_CODE)
            .unwrap_or(true);
        let outcome = if response_ok && status_ok {
            GatewayOutcome::Completed
        } else {
            GatewayOutcome::Failed
        };

        if !valid {
            warn!(txn_ref = %txn_ref, "Gateway callback signature did not verify");
        }

        CallbackVerification {
            valid,
            txn_ref,
            transaction_id,
            outcome,
        }
    }
}
