pub mod settings;

pub use settings::{DatabaseConfig, LedgerSettings, LoggingConfig};
