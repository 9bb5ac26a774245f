use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod payment;

pub use payment::{CallbackOutcome, OrderSummary, PaymentStatus, TxnRef};

/// Category used when a producer does not supply one
pub const DEFAULT_CATEGORY: &str = "system";

/// Catch-all realtime event emitted alongside every category event
pub const NOTIFICATION_RECEIVED: &str = "notification_received";

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Reference to the entity a notification is about (an order, a product, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_type: String,
    pub entity_id: i64,
}

impl RelatedEntity {
    pub fn new(entity_type: impl Into<String>, entity_id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
        }
    }

    pub fn order(order_id: i64) -> Self {
        Self::new("order", order_id)
    }
}

/// Durable, user-facing notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,

    /// Recipient user ID, fixed at creation
    pub recipient_id: Uuid,

    pub title: String,

    pub message: String,

    /// Free-form category tag, e.g. `payment_success`
    pub category: String,

    pub related_type: Option<String>,

    pub related_id: Option<i64>,

    pub link: Option<String>,

    /// `None` while unread
    pub read_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Recipient-scoped payload for a single insert or one row of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub category: String,
    pub related: Option<RelatedEntity>,
}

impl NewNotification {
    pub fn new(
        recipient_id: Uuid,
        title: impl Into<String>,
        message: impl Into<String>,
        category: impl Into<String>,
        related: Option<RelatedEntity>,
    ) -> Self {
        let category = category.into();
        Self {
            recipient_id,
            title: title.into(),
            message: message.into(),
            category: if category.trim().is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category
            },
            related,
        }
    }
}

/// One page of a recipient's notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub unread_count: i64,
    pub total_pages: i64,
}

/// Normalised page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Page is 1-based; zero or missing values fall back to defaults.
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        let size = i64::from(self.page_size);
        (total + size - 1) / size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Which of a recipient's rows a read-marking applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadTarget {
    One(Uuid),
    All,
}

impl std::str::FromStr for MarkReadTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(MarkReadTarget::All);
        }
        Uuid::parse_str(s)
            .map(MarkReadTarget::One)
            .map_err(|_| format!("invalid notification id: {}", s))
    }
}

/// Account role, normalised from the free-form role names of the user store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Customer,
    Other,
}

impl Role {
    pub const PRIVILEGED: [Role; 2] = [Role::Admin, Role::Staff];

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            "customer" | "user" => Role::Customer,
            _ => Role::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
            Role::Other => "other",
        }
    }

    pub fn is_privileged(&self) -> bool {
        Self::PRIVILEGED.contains(self)
    }
}

/// Who a dispatch is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    User(Uuid),
    PrivilegedGroup,
}

impl Audience {
    pub fn label(&self) -> &'static str {
        match self {
            Audience::User(_) => "user",
            Audience::PrivilegedGroup => "group",
        }
    }
}

/// Input to the notification dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    /// `None` addresses the privileged group
    pub target_user_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub category: String,
    pub related: Option<RelatedEntity>,
}

impl DispatchRequest {
    pub fn to_user(
        user_id: Uuid,
        title: impl Into<String>,
        message: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            target_user_id: Some(user_id),
            title: title.into(),
            message: message.into(),
            category: category.into(),
            related: None,
        }
    }

    pub fn to_group(
        title: impl Into<String>,
        message: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            target_user_id: None,
            title: title.into(),
            message: message.into(),
            category: category.into(),
            related: None,
        }
    }

    pub fn with_related(mut self, related: RelatedEntity) -> Self {
        self.related = Some(related);
        self
    }

    pub fn audience(&self) -> Audience {
        match self.target_user_id {
            Some(user_id) => Audience::User(user_id),
            None => Audience::PrivilegedGroup,
        }
    }

    /// Row payload for one recipient
    pub fn for_recipient(&self, recipient_id: Uuid) -> NewNotification {
        NewNotification::new(
            recipient_id,
            self.title.clone(),
            self.message.clone(),
            self.category.clone(),
            self.related.clone(),
        )
    }
}

/// What a dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub audience: Audience,
    /// Durable rows written
    pub persisted: u64,
    /// Row id, only for individual targets
    pub notification_id: Option<Uuid>,
    /// Whether the realtime emission reached the gateway
    pub broadcast: bool,
}
