//! Upload pipeline: find local photos missing from the library and add them.
//!
//! Each missing file is one unit of work made of two sequential calls, a raw
//! upload returning an upload token and a registration consuming it. Units
//! run through a bounded `buffer_unordered` stream; token refreshes are
//! single-flight inside [`AuthClient`], so concurrency needs no extra care
//! here.

pub mod api;
pub mod error;
pub mod reconcile;
pub mod scan;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::Path;

use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::auth::endpoints::Endpoints;
use crate::auth::AuthClient;
use crate::library::RemoteInventory;
use crate::state::{Ledger, PendingRegistration};

pub use self::error::{RegistrationError, UploadError};
pub use self::reconcile::reconcile;
pub use self::scan::CandidateFile;

/// Extensions considered by default (lowercase, no dot).
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Subset of application config consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub threads: usize,
    pub dry_run: bool,
    pub extensions: Vec<String>,
    pub no_progress_bar: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            dry_run: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            no_progress_bar: false,
        }
    }
}

/// Counters reported at the end of a sync.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Local files matching the extension filter.
    pub candidates: usize,
    /// Candidates whose filename is already in the library.
    pub already_present: usize,
    /// Later local files sharing a filename with an earlier candidate.
    pub duplicates: usize,
    /// Candidates that needed uploading.
    pub missing: usize,
    pub uploaded: usize,
    /// Read or raw-upload failures.
    pub failed: usize,
    /// Uploaded but not registered.
    pub orphaned: usize,
    /// Orphans from earlier runs registered during reconciliation.
    pub recovered: usize,
    pub interrupted: bool,
}

enum Outcome {
    Uploaded,
    UploadFailed(UploadError),
    Orphaned(RegistrationError),
}

pub struct UploadPipeline<'a> {
    client: &'a AuthClient,
    endpoints: &'a Endpoints,
    ledger: Option<&'a dyn Ledger>,
    config: &'a UploadConfig,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(
        client: &'a AuthClient,
        endpoints: &'a Endpoints,
        ledger: Option<&'a dyn Ledger>,
        config: &'a UploadConfig,
    ) -> Self {
        Self {
            client,
            endpoints,
            ledger,
            config,
        }
    }

    /// Upload every candidate under `local_root` whose filename is not in
    /// `inventory`. Per-file failures are logged and counted, never returned.
    pub async fn sync(
        &self,
        local_root: &Path,
        inventory: &RemoteInventory,
        shutdown_token: CancellationToken,
    ) -> SyncSummary {
        let root = local_root.to_path_buf();
        let extensions = self.config.extensions.clone();
        let candidates = match tokio::task::spawn_blocking(move || {
            scan::collect_candidates(&root, &extensions)
        })
        .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("Directory scan failed: {}", e);
                Vec::new()
            }
        };

        let mut summary = SyncSummary {
            candidates: candidates.len(),
            ..SyncSummary::default()
        };
        let missing = select_missing(candidates, inventory, &mut summary);
        summary.missing = missing.len();
        tracing::info!(
            "{} local files, {} already in library, {} to upload",
            summary.candidates,
            summary.already_present,
            summary.missing
        );

        if self.config.dry_run {
            for candidate in &missing {
                tracing::info!("[DRY RUN] Would upload {}", candidate.path.display());
            }
            return summary;
        }
        if missing.is_empty() {
            return summary;
        }

        let pb = create_progress_bar(self.config.no_progress_bar, missing.len() as u64);
        let mut processed = 0usize;
        let outcomes = stream::iter(missing)
            .take_while(|_| std::future::ready(!shutdown_token.is_cancelled()))
            .map(|candidate| async move {
                let outcome = self.process(&candidate).await;
                (candidate, outcome)
            })
            .buffer_unordered(self.config.threads.max(1));
        tokio::pin!(outcomes);

        while let Some((candidate, outcome)) = outcomes.next().await {
            processed += 1;
            pb.set_message(candidate.filename.clone());
            match outcome {
                Outcome::Uploaded => {
                    pb.suspend(|| tracing::info!("Uploaded {}", candidate.path.display()));
                    summary.uploaded += 1;
                }
                Outcome::UploadFailed(e) => {
                    pb.suspend(|| tracing::error!("{}", e));
                    summary.failed += 1;
                }
                Outcome::Orphaned(e) => {
                    pb.suspend(|| {
                        tracing::warn!(
                            upload_token = e.upload_token(),
                            "{}; the uploaded bytes are not in the library yet",
                            e
                        )
                    });
                    summary.orphaned += 1;
                    self.record_orphan(&candidate, &e).await;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if processed < summary.missing {
            tracing::info!(
                "Shutdown requested, {} uploads not started",
                summary.missing - processed
            );
            summary.interrupted = true;
        }
        summary
    }

    async fn process(&self, candidate: &CandidateFile) -> Outcome {
        let data = match tokio::fs::read(&candidate.path).await {
            Ok(data) => Bytes::from(data),
            Err(source) => {
                return Outcome::UploadFailed(UploadError::Read {
                    path: candidate.path.clone(),
                    source,
                })
            }
        };
        tracing::debug!(
            size_bytes = data.len(),
            path = %candidate.path.display(),
            "uploading",
        );

        let upload_token = match api::upload_bytes(
            self.client,
            self.endpoints,
            &candidate.path,
            &candidate.filename,
            data,
        )
        .await
        {
            Ok(token) => token,
            Err(e) => return Outcome::UploadFailed(e),
        };

        match api::register(
            self.client,
            self.endpoints,
            &candidate.filename,
            &upload_token,
        )
        .await
        {
            Ok(()) => Outcome::Uploaded,
            Err(e) => Outcome::Orphaned(e),
        }
    }

    async fn record_orphan(&self, candidate: &CandidateFile, error: &RegistrationError) {
        let Some(ledger) = self.ledger else {
            return;
        };
        let orphan = PendingRegistration {
            upload_token: error.upload_token().to_string(),
            local_path: candidate.path.clone(),
            filename: candidate.filename.clone(),
            uploaded_at: Utc::now(),
            last_error: Some(error.to_string()),
        };
        if let Err(e) = ledger.record_orphan(&orphan).await {
            tracing::warn!("Could not record orphaned upload in ledger: {}", e);
        }
    }
}

/// Drop candidates already in the library, and later local files sharing a
/// filename with an earlier one. Input order (sorted by path) decides which
/// of several same-name files wins.
fn select_missing(
    candidates: Vec<CandidateFile>,
    inventory: &RemoteInventory,
    summary: &mut SyncSummary,
) -> Vec<CandidateFile> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut missing = Vec::new();
    for candidate in candidates {
        if inventory.contains(&candidate.filename) {
            tracing::debug!("{} already in library", candidate.path.display());
            summary.already_present += 1;
        } else if !seen.insert(candidate.filename.clone()) {
            tracing::warn!(
                "Skipping {}: another local file named {} is already queued",
                candidate.path.display(),
                candidate.filename
            );
            summary.duplicates += 1;
        } else {
            missing.push(candidate);
        }
    }
    missing
}

/// Hidden when disabled or when stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} uploads ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
