//! The two library calls behind one upload: raw bytes, then registration.

use std::path::Path;

use bytes::Bytes;

use super::error::{RegistrationError, UploadError};
use super::scan::mime_type;
use crate::auth::endpoints::Endpoints;
use crate::auth::{ApiRequest, AuthClient};
use crate::library::types::{BatchCreateRequest, BatchCreateResponse};

/// POST the file's bytes to the uploads endpoint and return the upload token.
pub async fn upload_bytes(
    client: &AuthClient,
    endpoints: &Endpoints,
    path: &Path,
    filename: &str,
    data: Bytes,
) -> Result<String, UploadError> {
    let request = ApiRequest::post_raw(&endpoints.uploads, data)
        .header("Content-type", "application/octet-stream")
        .header("X-Goog-Upload-Content-Type", mime_type(path))
        .header("X-Goog-Upload-Protocol", "raw");

    let response = client
        .request(&request)
        .await
        .map_err(|source| UploadError::Upload {
            filename: filename.to_string(),
            source,
        })?;

    let token = response.text().trim().to_string();
    if token.is_empty() {
        return Err(UploadError::EmptyToken {
            filename: filename.to_string(),
        });
    }
    Ok(token)
}

/// Create a library item from an upload token.
///
/// A per-item status with a non-zero code is a failure even when the HTTP
/// call itself succeeded.
pub async fn register(
    client: &AuthClient,
    endpoints: &Endpoints,
    filename: &str,
    upload_token: &str,
) -> Result<(), RegistrationError> {
    let malformed = |source| RegistrationError::Malformed {
        filename: filename.to_string(),
        upload_token: upload_token.to_string(),
        source,
    };

    let body = serde_json::to_value(BatchCreateRequest::single(filename, upload_token))
        .map_err(malformed)?;
    let response = client
        .request(&ApiRequest::post_json(&endpoints.batch_create, body))
        .await
        .map_err(|source| RegistrationError::Request {
            filename: filename.to_string(),
            upload_token: upload_token.to_string(),
            source,
        })?;

    let parsed: BatchCreateResponse = if response.body.is_empty() {
        BatchCreateResponse::default()
    } else {
        response.json().map_err(malformed)?
    };

    if let Some(status) = parsed
        .new_media_item_results
        .iter()
        .filter_map(|r| r.status.as_ref())
        .find(|s| s.code != 0)
    {
        return Err(RegistrationError::Rejected {
            filename: filename.to_string(),
            upload_token: upload_token.to_string(),
            code: status.code,
            message: status.message.clone(),
        });
    }

    Ok(())
}
