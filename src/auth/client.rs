use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::credentials::ClientConfig;
use super::error::AuthError;
use super::refresher::TokenRefresher;
use super::token_store::TokenStore;

/// Request body variants used against the library API.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    /// Raw bytes; `Bytes` keeps the re-send after a refresh copy-free.
    Raw(Bytes),
}

/// A fully described request, replayable verbatim after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, json: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Json(json),
        }
    }

    pub fn post_raw(url: impl Into<String>, data: Bytes) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Raw(data),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }
}

/// Status and fully buffered body of a response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The single outbound path to the network for authenticated calls.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest, access_token: &str)
        -> Result<ApiResponse, AuthError>;
}

#[async_trait::async_trait]
impl HttpTransport for reqwest::Client {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, AuthError> {
        let mut builder = self
            .request(request.method.clone(), &request.url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (k, v) in &request.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(json) => builder.json(json),
            Body::Raw(data) => builder.body(data.clone()),
        };

        let network = |source| AuthError::Network {
            url: request.url.clone(),
            source,
        };
        let response = builder.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network)?;
        Ok(ApiResponse { status, body })
    }
}

/// Performs authenticated requests, refreshing the access token at most once
/// per request when the server answers 401.
///
/// Refreshes are single-flight: when several tasks see a 401 for the same
/// token generation, the first one refreshes and the rest reuse its result,
/// whether that is a new token or the refresh error.
pub struct AuthClient {
    transport: Arc<dyn HttpTransport>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<TokenStore>,
    client_config: Arc<ClientConfig>,
    refresh_gate: tokio::sync::Mutex<Option<FailedRefresh>>,
}

/// Last refresh attempt that failed, keyed by the generation it tried to replace.
struct FailedRefresh {
    generation: u64,
    message: String,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<TokenStore>,
        client_config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            transport,
            refresher,
            store,
            client_config,
            refresh_gate: tokio::sync::Mutex::new(None),
        }
    }

    /// Send `request` with the current bearer token.
    ///
    /// Returns the response for 2xx statuses. A 401 triggers one refresh and
    /// one replay; every other failure is surfaced as-is. Transport errors
    /// never trigger a refresh.
    pub async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let snapshot = self.store.snapshot().await?;
        tracing::debug!("{} {}", request.method, request.url);
        let response = self
            .transport
            .send(request, &snapshot.access_token)
            .await?;
        if response.status != 401 {
            return check_status(request, response);
        }

        tracing::debug!("Access token rejected by {}, refreshing", request.url);
        let access_token = self.refresh_after(snapshot.generation).await?;
        let retried = self.transport.send(request, &access_token).await?;
        if retried.status == 401 {
            return Err(AuthError::Unauthorized {
                url: request.url.clone(),
            });
        }
        check_status(request, retried)
    }

    /// Refresh unless another task already replaced `stale_generation`,
    /// returning the access token to use for the replay. A failed attempt is
    /// remembered so later waiters on the same generation fail without
    /// calling the token endpoint again.
    async fn refresh_after(&self, stale_generation: u64) -> Result<String, AuthError> {
        let mut last_failure = self.refresh_gate.lock().await;

        let current = self.store.snapshot().await?;
        if current.generation != stale_generation {
            tracing::debug!("Token already refreshed by a concurrent request");
            return Ok(current.access_token);
        }
        if let Some(failed) = last_failure
            .as_ref()
            .filter(|f| f.generation == stale_generation)
        {
            tracing::debug!("Reusing failed refresh outcome for generation {stale_generation}");
            return Err(AuthError::Refresh(failed.message.clone()));
        }

        let outcome = async {
            let pair = self.store.current_pair().await?;
            let refreshed = self.refresher.refresh(&self.client_config, &pair).await?;
            self.store.save(&refreshed).await?;
            Ok::<_, AuthError>(refreshed.access_token)
        }
        .await;

        match outcome {
            Ok(access_token) => {
                tracing::debug!("Access token refreshed");
                *last_failure = None;
                Ok(access_token)
            }
            Err(e) => {
                let message = match &e {
                    AuthError::Refresh(message) => message.clone(),
                    other => other.to_string(),
                };
                *last_failure = Some(FailedRefresh {
                    generation: stale_generation,
                    message,
                });
                Err(e)
            }
        }
    }
}

fn check_status(request: &ApiRequest, response: ApiResponse) -> Result<ApiResponse, AuthError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(AuthError::Status {
            status: response.status,
            url: request.url.clone(),
            body: response.text(),
        })
    }
}
