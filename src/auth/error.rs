use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading OAuth client credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read credentials document {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed credentials document {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid credentials document: {0}")]
    Invalid(String),
}

/// Errors raised by the token lifecycle and authenticated request dispatch.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Request to {url} still unauthorized after token refresh")]
    Unauthorized { url: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("No OAuth token pair available; run `photosync auth` first")]
    MissingTokens,

    #[error("Consent flow failed: {0}")]
    Consent(String),

    #[error("Network error calling {url}: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Status { status, .. } => Some(*status),
            AuthError::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::Network { .. })
    }
}
