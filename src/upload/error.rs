use std::path::PathBuf;

use thiserror::Error;

use crate::auth::AuthError;

/// Raw upload step failed; nothing was created remotely.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Raw upload of {filename} failed: {source}")]
    Upload {
        filename: String,
        #[source]
        source: AuthError,
    },

    #[error("Raw upload of {filename} returned an empty upload token")]
    EmptyToken { filename: String },
}

/// Registration failed after a successful raw upload.
///
/// The uploaded bytes stay on the provider side without a library item.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Registering {filename} failed: {source}")]
    Request {
        filename: String,
        upload_token: String,
        #[source]
        source: AuthError,
    },

    #[error("Registering {filename} was rejected (code {code}): {message}")]
    Rejected {
        filename: String,
        upload_token: String,
        code: i32,
        message: String,
    },

    #[error("Unexpected batchCreate response for {filename}: {source}")]
    Malformed {
        filename: String,
        upload_token: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistrationError {
    /// The request never got an answer, so the token may still be valid.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Request { source, .. } if source.is_network())
    }

    /// The token of the orphaned upload.
    pub fn upload_token(&self) -> &str {
        match self {
            Self::Request { upload_token, .. }
            | Self::Rejected { upload_token, .. }
            | Self::Malformed { upload_token, .. } => upload_token,
        }
    }
}
