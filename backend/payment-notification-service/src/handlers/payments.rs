/// Payment creation and gateway return endpoints
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::services::PaymentConfirmationHandler;

const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    pub order_id: Option<i64>,
    pub amount: Option<Decimal>,
}

/// First `X-Forwarded-For` hop, else the peer address
pub fn client_ip(req: &HttpRequest) -> String {
    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| FALLBACK_CLIENT_IP.to_string())
}

/// POST /api/v1/payments/create
pub async fn create_payment(
    req: HttpRequest,
    handler: web::Data<Arc<PaymentConfirmationHandler>>,
    body: web::Json<CreatePaymentBody>,
) -> Result<HttpResponse> {
    let order_id = body
        .order_id
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Validation("orderId and amount are required".to_string()))?;
    let amount = body
        .amount
        .filter(|a| !a.is_zero())
        .ok_or_else(|| AppError::Validation("orderId and amount are required".to_string()))?;

    let url = handler.create_payment_url(order_id, amount, &client_ip(&req))?;
    Ok(HttpResponse::Ok().json(json!({ "url": url })))
}

/// GET /api/v1/payments/return
///
/// Browser redirect target; always answers with a redirect to the storefront.
pub async fn payment_return(
    handler: web::Data<Arc<PaymentConfirmationHandler>>,
    app: web::Data<AppConfig>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    let location = match handler.handle_callback(&query).await {
        Ok(report) => {
            let status = if report.outcome.is_success() {
                "success"
            } else {
                "failed"
            };
            info!(outcome = report.outcome.metric_label(), "Payment return handled");
            format!(
                "{}/checkout/return?status={}&orderId={}",
                app.frontend_url,
                status,
                urlencoding::encode(&report.outcome.order_label())
            )
        }
        Err(e) => {
            error!("Payment return failed: {}", e);
            format!("{}/orders?error=unknown", app.frontend_url)
        }
    };

    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/payments")
            .route("/create", web::post().to(create_payment))
            .route("/return", web::get().to(payment_return)),
    );
}
