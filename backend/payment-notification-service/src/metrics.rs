use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

/// Route excluded from request metrics so scrapes do not count as traffic
const SCRAPE_PATH: &str = "/metrics";

fn register_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .unwrap_or_else(|e| panic!("failed to create {}: {}", name, e));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("failed to register {}: {}", name, e));
    counter
}

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "payment_notification_http_requests_total",
        "Storefront requests handled, by route pattern",
        &["method", "path", "status"],
    )
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let name = "payment_notification_http_request_duration_seconds";
    let histogram = HistogramVec::new(
        HistogramOpts::new(name, "Storefront request latency, by route pattern")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .unwrap_or_else(|e| panic!("failed to create {}: {}", name, e));
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .unwrap_or_else(|e| panic!("failed to register {}: {}", name, e));
    histogram
});

static NOTIFICATIONS_PERSISTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "notifications_persisted_total",
        "Notification rows written, by audience",
        &["audience"],
    )
});

static REALTIME_EMIT_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "realtime_emit_failures_total",
        "Realtime emissions that could not be handed to the gateway",
        &["reason"],
    )
});

static PAYMENT_CALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "payment_callbacks_total",
        "Gateway callbacks processed, by outcome",
        &["outcome"],
    )
});

static NOTIFICATION_BRANCH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "notification_branch_failures_total",
        "Post-payment notification branches that failed",
        &["branch"],
    )
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub fn record_notifications_persisted(audience: &str, rows: u64) {
    NOTIFICATIONS_PERSISTED_TOTAL
        .with_label_values(&[audience])
        .inc_by(rows);
}

pub fn record_realtime_emit_failure(reason: &str) {
    REALTIME_EMIT_FAILURES_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub fn record_payment_callback(outcome: &str) {
    PAYMENT_CALLBACKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_branch_failure(branch: &str) {
    NOTIFICATION_BRANCH_FAILURES_TOTAL
        .with_label_values(&[branch])
        .inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

/// Records request count and latency per matched route pattern
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // Route patterns keep notification ids out of the label set.
        let path = req
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        if path == SCRAPE_PATH {
            return Box::pin(service.call(req));
        }
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(response) => {
                    observe_http_request(&method, &path, response.status().as_u16(), elapsed);
                }
                Err(_) => {
                    observe_http_request(&method, &path, 500, elapsed);
                }
            }
            result
        })
    }
}
