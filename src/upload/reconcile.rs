//! Retry registrations left behind by earlier runs.

use super::api;
use crate::auth::endpoints::Endpoints;
use crate::auth::AuthClient;
use crate::library::RemoteInventory;
use crate::state::Ledger;

/// Walk the ledger's pending registrations before uploading.
///
/// An orphan whose filename already shows up remotely is dropped. Otherwise
/// the stored token gets one more registration attempt; on success the
/// filename joins `inventory` so the file is not uploaded again. Upload
/// tokens are short-lived, so a rejected retry drops the entry and the file
/// goes through the normal pipeline; a network failure keeps it for later.
///
/// Returns the number of recovered items. Ledger errors end reconciliation
/// early without failing the run.
pub async fn reconcile(
    client: &AuthClient,
    endpoints: &Endpoints,
    ledger: &dyn Ledger,
    inventory: &mut RemoteInventory,
) -> usize {
    let pending = match ledger.pending_registrations().await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!("Could not read pending registrations: {}", e);
            return 0;
        }
    };
    if pending.is_empty() {
        return 0;
    }
    tracing::info!("Reconciling {} pending registrations", pending.len());

    let mut recovered = 0;
    for orphan in pending {
        if inventory.contains(&orphan.filename) {
            tracing::debug!("{} is already in the library", orphan.filename);
        } else {
            match api::register(client, endpoints, &orphan.filename, &orphan.upload_token).await {
                Ok(()) => {
                    tracing::info!("Registered previously orphaned {}", orphan.filename);
                    inventory.insert(orphan.filename.clone());
                    recovered += 1;
                }
                Err(e) if e.is_network() => {
                    tracing::warn!("Keeping pending registration of {}: {}", orphan.filename, e);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        "Dropping expired upload of {} ({}); it will be uploaded again",
                        orphan.local_path.display(),
                        e
                    );
                }
            }
        }

        if let Err(e) = ledger.resolve_orphan(&orphan.upload_token).await {
            tracing::warn!("Could not update ledger: {}", e);
            break;
        }
    }
    recovered
}
