//! OAuth token lifecycle and authenticated request dispatch.
//!
//! Startup loads the client credentials, loads the persisted token pair (or
//! runs the interactive consent flow when there is none), and wires an
//! [`AuthClient`] that refreshes the access token once on a 401.

pub mod client;
pub mod consent;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod refresher;
pub mod token_store;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use self::client::{ApiRequest, ApiResponse, AuthClient, HttpTransport};
pub use self::consent::{ConsentFlow, InstalledAppFlow};
pub use self::credentials::ClientConfig;
pub use self::error::{AuthError, ConfigError};
pub use self::refresher::{OAuthRefresher, TokenRefresher};
pub use self::token_store::{TokenPair, TokenStore};

/// Build an authenticated client from the credentials document and token file.
///
/// 1. Loads the immutable client configuration (fatal if missing or malformed).
/// 2. Opens the token store, taking the instance lock.
/// 3. Loads the persisted pair, or obtains one through `consent`.
pub async fn authenticate(
    credentials_path: &Path,
    tokens_path: &Path,
    http: reqwest::Client,
    consent: &dyn ConsentFlow,
) -> Result<AuthClient> {
    let client_config = ClientConfig::load(credentials_path).await?;
    tracing::debug!(?client_config, "Loaded client configuration");

    let store = TokenStore::open(tokens_path).await?;
    store
        .load_or_acquire(&client_config, consent)
        .await
        .with_context(|| format!("No usable tokens in {}", store.path().display()))?;

    let refresher = OAuthRefresher::new(http.clone());
    Ok(AuthClient::new(
        Arc::new(http),
        Arc::new(refresher),
        Arc::new(store),
        Arc::new(client_config),
    ))
}
