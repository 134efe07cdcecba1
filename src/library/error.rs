use thiserror::Error;

use crate::auth::AuthError;

/// Errors raised while building the remote inventory.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to load remote inventory at page {page}: {source}")]
    InventoryLoad {
        page: usize,
        #[source]
        source: AuthError,
    },

    #[error("Unexpected listing response at page {page}: {source}")]
    MalformedPage {
        page: usize,
        #[source]
        source: serde_json::Error,
    },
}
