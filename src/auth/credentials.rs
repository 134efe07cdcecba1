use std::path::Path;

use serde::Deserialize;
use url::Url;

use super::endpoints::{DEFAULT_AUTH_ENDPOINT, DEFAULT_TOKEN_ENDPOINT};
use super::error::ConfigError;

/// OAuth client identity issued by the provider for an installed application.
///
/// Loaded once at startup from the credentials document and never mutated.
#[derive(Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: Url,
    pub auth_endpoint: Url,
    pub redirect_uris: Vec<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct CredentialsDocument {
    installed: InstalledSection,
}

#[derive(Deserialize)]
struct InstalledSection {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientConfig {
    /// Read and validate the credentials document at `path`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!("Loading client configuration from {}", path.display());
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let doc: CredentialsDocument =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_installed(doc.installed)
    }

    fn from_installed(installed: InstalledSection) -> Result<Self, ConfigError> {
        if installed.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("installed.client_id is empty".into()));
        }
        if installed.client_secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "installed.client_secret is empty".into(),
            ));
        }
        let token_endpoint = parse_endpoint(
            "installed.token_uri",
            installed.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_ENDPOINT),
        )?;
        let auth_endpoint = parse_endpoint(
            "installed.auth_uri",
            installed.auth_uri.as_deref().unwrap_or(DEFAULT_AUTH_ENDPOINT),
        )?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
            token_endpoint,
            auth_endpoint,
            redirect_uris: installed.redirect_uris,
        })
    }
}

fn parse_endpoint(field: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{field} '{value}': {e}")))
}

#[cfg(test)]
pub(crate) fn test_client_config() -> ClientConfig {
    ClientConfig {
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
        token_endpoint: Url::parse("http://127.0.0.1:1/token").unwrap(),
        auth_endpoint: Url::parse("http://127.0.0.1:1/auth").unwrap(),
        redirect_uris: vec!["http://localhost".into()],
    }
}
