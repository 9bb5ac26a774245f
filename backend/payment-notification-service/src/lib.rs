pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{NotificationDispatcher, PaymentConfirmationHandler};
pub use websocket::{ConnectionManager, RealtimeHandle};
