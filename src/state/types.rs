//! Types for the ledger.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// An upload token whose registration failed.
///
/// The raw bytes sit on the provider side without a library item; the token
/// is kept so a later run can try the registration again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub upload_token: String,
    pub local_path: PathBuf,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Statistics recorded when a sync run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    /// Items reported by the remote listing.
    pub remote_items: u64,
    pub uploaded: u64,
    pub failed: u64,
    /// Registrations that failed after a successful upload.
    pub orphaned: u64,
    /// Whether the run was cut short by a shutdown signal.
    pub interrupted: bool,
}

/// Overview for the `status` command.
#[derive(Debug, Clone)]
pub struct LedgerSummary {
    pub total_runs: u64,
    pub pending_registrations: u64,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
    /// Stats of the most recent completed run.
    pub last_run: Option<SyncRunStats>,
}
