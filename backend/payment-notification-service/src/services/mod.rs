pub mod audience;
pub mod dispatcher;
pub mod notification_store;
pub mod payment_confirmation;
pub mod payment_repository;

pub use audience::{AudienceResolver, PgAudienceResolver};
pub use dispatcher::NotificationDispatcher;
pub use notification_store::{NotificationStore, PgNotificationStore};
pub use payment_confirmation::{
    BranchOutcome, CallbackReport, PaymentConfirmationHandler, PAYMENT_RECEIVED, PAYMENT_SUCCESS,
};
pub use payment_repository::{
    PaymentCompletion, PaymentRepository, PaymentTransition, PgPaymentRepository,
};
