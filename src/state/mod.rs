//! Persistent sync ledger.
//!
//! SQLite-backed record of sync runs and of upload tokens whose registration
//! failed. The ledger is advisory: a sync keeps going when it is unavailable.
//! - Orphaned uploads survive the process and are reconciled on the next run
//! - `status` reports the last run and any pending registrations

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{Ledger, SqliteLedger};
pub use error::StateError;
pub use types::{LedgerSummary, PendingRegistration, SyncRunStats};
