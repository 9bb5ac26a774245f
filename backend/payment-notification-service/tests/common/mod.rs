//! In-memory collaborators shared by the integration tests
#![allow(dead_code)]

pub mod pg;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use payment_notification_service::config::GatewayConfig;
use payment_notification_service::error::{AppError, Result};
use payment_notification_service::gateway::{PaymentGateway, VnpayGateway};
use payment_notification_service::models::payment::CompletedPayment;
use payment_notification_service::models::{
    MarkReadTarget, NewNotification, Notification, NotificationPage, OrderSummary, PageRequest,
    PaymentStatus,
};
use payment_notification_service::services::{
    AudienceResolver, NotificationDispatcher, NotificationStore, PaymentCompletion,
    PaymentConfirmationHandler, PaymentRepository, PaymentTransition,
};
use payment_notification_service::websocket::{ConnectionManager, Room, SubscriberId};
use payment_notification_service::RealtimeHandle;
use rust_decimal::Decimal;
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const HASH_SECRET: &str = "TESTHASHSECRET";

// ---------------------------------------------------------------------------
// Notification store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryNotificationStore {
    rows: Mutex<Vec<Notification>>,
    pub create_calls: AtomicUsize,
    pub bulk_calls: AtomicUsize,
    fail_writes: bool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose inserts always fail with a storage error
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<Notification> {
        self.rows.lock().unwrap().clone()
    }

    pub fn rows_for(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.rows()
            .into_iter()
            .filter(|n| n.recipient_id == recipient_id)
            .collect()
    }

    fn materialise(row: NewNotification) -> Notification {
        let now = Utc::now();
        Notification {
            id: Uuid::new_v4(),
            recipient_id: row.recipient_id,
            title: row.title,
            message: row.message,
            category: row.category,
            related_type: row.related.as_ref().map(|r| r.entity_type.clone()),
            related_id: row.related.as_ref().map(|r| r.entity_id),
            link: None,
            read_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, row: NewNotification) -> Result<Notification> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(AppError::Storage("connection refused".to_string()));
        }
        let notification = Self::materialise(row);
        self.rows.lock().unwrap().push(notification.clone());
        Ok(notification)
    }

    async fn bulk_create(&self, rows: Vec<NewNotification>) -> Result<u64> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(AppError::Storage("connection refused".to_string()));
        }
        let count = rows.len() as u64;
        let mut stored = self.rows.lock().unwrap();
        stored.extend(rows.into_iter().map(Self::materialise));
        Ok(count)
    }

    async fn list(&self, recipient_id: Uuid, page: PageRequest) -> Result<NotificationPage> {
        let mut mine = self.rows_for(recipient_id);
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = mine.len() as i64;
        let unread_count = mine.iter().filter(|n| !n.is_read()).count() as i64;
        let items = mine
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(NotificationPage {
            items,
            unread_count,
            total_pages: page.total_pages(total),
        })
    }

    async fn mark_read(&self, recipient_id: Uuid, target: MarkReadTarget) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let mut affected = 0;
        for row in rows.iter_mut() {
            let matches = row.recipient_id == recipient_id
                && row.read_at.is_none()
                && match target {
                    MarkReadTarget::One(id) => row.id == id,
                    MarkReadTarget::All => true,
                };
            if matches {
                row.read_at = Some(now);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        Ok(self
            .rows_for(recipient_id)
            .iter()
            .filter(|n| !n.is_read())
            .count() as i64)
    }
}

// ---------------------------------------------------------------------------
// Audience
// ---------------------------------------------------------------------------

pub struct StaticAudience(pub Vec<Uuid>);

#[async_trait]
impl AudienceResolver for StaticAudience {
    async fn resolve_group(&self) -> Result<Vec<Uuid>> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    pub amount: Option<Decimal>,
    pub txn_ref: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Default)]
struct PaymentTables {
    orders: HashMap<i64, OrderSummary>,
    order_status: HashMap<i64, String>,
    payments: HashMap<i64, PaymentRecord>,
}

/// Mirrors the conditional-update semantics of the Postgres repository
#[derive(Default)]
pub struct InMemoryPaymentRepository {
    tables: Mutex<PaymentTables>,
    pub writes: AtomicUsize,
    pub order_transitions: AtomicUsize,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(self, order: OrderSummary, payment_amount: Option<Decimal>) -> Self {
        {
            let mut tables = self.tables.lock().unwrap();
            tables
                .order_status
                .insert(order.order_id, "pending".to_string());
            tables.payments.insert(
                order.order_id,
                PaymentRecord {
                    status: PaymentStatus::Pending,
                    amount: payment_amount,
                    txn_ref: None,
                    transaction_id: None,
                },
            );
            tables.orders.insert(order.order_id, order);
        }
        self
    }

    /// Order without a payment row
    pub fn with_bare_order(self, order: OrderSummary) -> Self {
        self.tables
            .lock()
            .unwrap()
            .orders
            .insert(order.order_id, order);
        self
    }

    pub fn payment(&self, order_id: i64) -> Option<PaymentRecord> {
        self.tables.lock().unwrap().payments.get(&order_id).cloned()
    }

    pub fn order_status(&self, order_id: i64) -> Option<String> {
        self.tables
            .lock()
            .unwrap()
            .order_status
            .get(&order_id)
            .cloned()
    }

    pub fn set_status(&self, order_id: i64, status: PaymentStatus) {
        if let Some(payment) = self.tables.lock().unwrap().payments.get_mut(&order_id) {
            payment.status = status;
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn find_order(&self, order_id: i64) -> Result<Option<OrderSummary>> {
        Ok(self.tables.lock().unwrap().orders.get(&order_id).cloned())
    }

    async fn complete_payment(&self, completion: PaymentCompletion) -> Result<PaymentTransition> {
        let mut tables = self.tables.lock().unwrap();
        let Some(payment) = tables.payments.get_mut(&completion.order_id) else {
            return Ok(PaymentTransition::Missing);
        };
        if payment.status == PaymentStatus::Completed {
            return Ok(PaymentTransition::AlreadyCompleted);
        }

        payment.status = PaymentStatus::Completed;
        payment.txn_ref = Some(completion.txn_ref.as_str().to_string());
        payment.transaction_id = completion.transaction_id.clone();
        let amount = payment.amount;

        tables
            .order_status
            .insert(completion.order_id, "processing".to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.order_transitions.fetch_add(1, Ordering::SeqCst);

        Ok(PaymentTransition::Completed(CompletedPayment {
            order_id: completion.order_id,
            amount,
        }))
    }

    async fn fail_payment(&self, order_id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.payments.get_mut(&order_id) {
            Some(payment) if payment.status != PaymentStatus::Completed => {
                payment.status = PaymentStatus::Failed;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        tmn_code: "TESTCODE".to_string(),
        hash_secret: HASH_SECRET.to_string(),
        pay_url: "https://sandbox.example/paymentv2/vpcpay.html".to_string(),
        return_url: "http://localhost:8000/api/v1/payments/return".to_string(),
        locale: "vn".to_string(),
    }
}

pub fn gateway() -> Arc<dyn PaymentGateway> {
    Arc::new(VnpayGateway::new(&gateway_config()))
}

/// Parameters as the gateway would send them, signed with [`HASH_SECRET`]
pub fn signed_params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    let sorted: BTreeMap<&str, &str> = pairs.iter().copied().collect();
    let query = sorted
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k).replace("%20", "+"),
                urlencoding::encode(v).replace("%20", "+")
            )
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut mac = Hmac::<Sha512>::new_from_slice(HASH_SECRET.as_bytes()).unwrap();
    mac.update(query.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let mut params: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.insert("vnp_SecureHash".to_string(), signature);
    params
}

pub fn success_callback(txn_ref: &str, transaction_no: &str) -> HashMap<String, String> {
    signed_params(&[
        ("vnp_TxnRef", txn_ref),
        ("vnp_TransactionNo", transaction_no),
        ("vnp_ResponseCode", "00"),
        ("vnp_TransactionStatus", "00"),
        ("vnp_OrderInfo", "Payment for order"),
    ])
}

pub fn failure_callback(txn_ref: &str) -> HashMap<String, String> {
    signed_params(&[
        ("vnp_TxnRef", txn_ref),
        ("vnp_ResponseCode", "24"),
        ("vnp_TransactionStatus", "02"),
    ])
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

/// A fake client connection enrolled in one room
pub struct TestClient {
    pub receiver: mpsc::UnboundedReceiver<String>,
}

impl TestClient {
    pub async fn join(manager: &ConnectionManager, room: Room) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        manager.join(room, SubscriberId::new(), sender).await;
        Self { receiver }
    }

    /// Every frame received so far, decoded
    pub fn drain(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.receiver.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }
}

pub fn event_names(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["event"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<InMemoryNotificationStore>,
    pub payments: Arc<InMemoryPaymentRepository>,
    pub manager: ConnectionManager,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub handler: Arc<PaymentConfirmationHandler>,
}

impl Harness {
    pub fn new(payments: InMemoryPaymentRepository, admins: Vec<Uuid>) -> Self {
        Self::with_store(InMemoryNotificationStore::new(), payments, admins)
    }

    pub fn with_store(
        store: InMemoryNotificationStore,
        payments: InMemoryPaymentRepository,
        admins: Vec<Uuid>,
    ) -> Self {
        let store = Arc::new(store);
        let payments = Arc::new(payments);
        let manager = ConnectionManager::new();
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            Arc::new(StaticAudience(admins)),
            RealtimeHandle::with_manager(manager.clone()),
        ));
        let handler = Arc::new(PaymentConfirmationHandler::new(
            payments.clone(),
            dispatcher.clone(),
            gateway(),
        ));
        Self {
            store,
            payments,
            manager,
            dispatcher,
            handler,
        }
    }
}

pub fn order(order_id: i64, user_id: Option<Uuid>) -> OrderSummary {
    OrderSummary {
        order_id,
        user_id,
        order_code: Some(format!("ORD-{:04}", order_id)),
        final_amount: Some(Decimal::new(1_250_000, 0)),
    }
}
