pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod realtime;
pub mod runtime;
pub mod store;
pub mod tracing_setup;

pub use auth::{AuthClient, AuthUser, Session};
pub use config::BackendConfig;
pub use error::{CoreError, Result};
pub use events::{ChangeEvent, RowChange};
pub use ledger::HabitLedger;
pub use runtime::{LedgerCommand, LedgerHandle, LedgerSnapshot, SyncRuntime};
