pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod repository;
pub mod services;

pub use config::LedgerSettings;
pub use domain::money::{Currency, Money};
pub use error::{ErrorKind, LedgerError, Result};
pub use models::enums::{PaymentMethod, PaymentStatus, RefundStatus};
pub use models::payment::{LodgementSummary, Payment, Refund, RefundRequest};
pub use query::payment_filter::PaymentFilter;
pub use repository::memory::InMemoryLedgerStore;
pub use repository::payment_repository::{MySqlPaymentRepository, PaymentRepository};
pub use repository::refund_repository::{MySqlRefundRepository, RefundRepository, RefundTransaction};
pub use services::ledger_service::LedgerService;
