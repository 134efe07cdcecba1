//! Interactive OAuth consent for installed applications.
//!
//! The user opens the printed authorization URL, approves access, and the
//! provider redirects the browser to a loopback listener owned by this
//! process. The authorization code from that redirect is exchanged for the
//! initial token pair.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use url::Url;

use super::credentials::ClientConfig;
use super::endpoints::PHOTOS_LIBRARY_SCOPE;
use super::error::AuthError;
use super::refresher::TokenResponse;
use super::token_store::TokenPair;

/// Default loopback port for the redirect listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

/// Source of the very first token pair, used only when none is persisted.
#[async_trait::async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn obtain_initial_tokens(
        &self,
        client_config: &ClientConfig,
    ) -> Result<TokenPair, AuthError>;
}

/// Browser-based installed-app flow with a local redirect listener.
pub struct InstalledAppFlow {
    http: reqwest::Client,
    port: u16,
}

impl InstalledAppFlow {
    pub fn new(http: reqwest::Client, port: u16) -> Self {
        Self { http, port }
    }

    /// Matches the bound address exactly so a browser resolving `localhost`
    /// to `::1` cannot miss the listener.
    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    async fn exchange_code(
        &self,
        client_config: &ClientConfig,
        code: &str,
        verifier: &str,
    ) -> Result<TokenPair, AuthError> {
        let url = client_config.token_endpoint.as_str();
        let redirect_uri = self.redirect_uri();
        let response = self
            .http
            .post(url)
            .form(&[
                ("code", code),
                ("client_id", client_config.client_id.as_str()),
                ("client_secret", client_config.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(|source| AuthError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| AuthError::Network {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(AuthError::Consent(format!(
                "code exchange returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let access_token = parsed
            .access_token
            .ok_or_else(|| AuthError::Consent("no access_token in code exchange".into()))?;
        let refresh_token = parsed.refresh_token.ok_or_else(|| {
            AuthError::Consent(
                "no refresh_token in code exchange; revoke the app's access and retry".into(),
            )
        })?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

#[async_trait::async_trait]
impl ConsentFlow for InstalledAppFlow {
    async fn obtain_initial_tokens(
        &self,
        client_config: &ClientConfig,
    ) -> Result<TokenPair, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| {
                AuthError::Consent(format!("cannot listen on 127.0.0.1:{}: {}", self.port, e))
            })?;

        let redirect_uri = self.redirect_uri();
        if !has_loopback_redirect(&client_config.redirect_uris) {
            tracing::warn!(
                "Credentials list no loopback redirect URI; the provider may reject {}",
                redirect_uri
            );
        }

        let pkce = Pkce::generate();
        let state = generate_state();
        let auth_url = authorization_url(client_config, &redirect_uri, &state, &pkce);

        println!("Please visit this URL to authorize this application:");
        println!("{}", auth_url);
        tracing::debug!("Waiting for OAuth redirect on port {}", self.port);

        let code = wait_for_code(listener, &state).await?;
        tracing::debug!("Received authorization code, exchanging for tokens");
        let pair = self
            .exchange_code(client_config, &code, &pkce.verifier)
            .await?;
        tracing::info!("OAuth consent completed");
        Ok(pair)
    }
}

/// An empty list means the document did not say; assume the default.
fn has_loopback_redirect(redirect_uris: &[String]) -> bool {
    redirect_uris.is_empty()
        || redirect_uris.iter().any(|uri| {
            uri.starts_with("http://localhost")
                || uri.starts_with("http://127.0.0.1")
                || uri == "urn:ietf:wg:oauth:2.0:oob"
        })
}

/// PKCE S256 verifier/challenge pair.
struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn authorization_url(
    client_config: &ClientConfig,
    redirect_uri: &str,
    state: &str,
    pkce: &Pkce,
) -> Url {
    let mut url = client_config.auth_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &client_config.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", PHOTOS_LIBRARY_SCOPE)
        .append_pair("state", state)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("code_challenge", &pkce.challenge)
        .append_pair("code_challenge_method", "S256");
    url
}

/// Query parameters of the provider redirect.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Outcome of one request hitting the loopback listener.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    /// Not the OAuth redirect (bare visit, stray request); keep listening.
    Ignored,
}

const SUCCESS_PAGE: &str = "<html><body>The authentication flow has completed. \
You may close this window.</body></html>";
const DENIED_PAGE: &str = "<html><body>Authorization was denied.</body></html>";
const REJECTED_PAGE: &str = "<html><body>Invalid authorization response.</body></html>";

/// How long in-flight callback responses get to finish once the code is in.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type CodeSender = oneshot::Sender<Result<String, AuthError>>;

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    result_tx: Arc<Mutex<Option<CodeSender>>>,
}

/// Serve the redirect endpoint on `listener` until a code (or a denial)
/// arrives, then shut the server down gracefully.
async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String, AuthError> {
    let (result_tx, result_rx) = oneshot::channel();
    let app = Router::new()
        .route("/", get(callback_handler))
        .with_state(CallbackState {
            expected_state: Arc::from(expected_state),
            result_tx: Arc::new(Mutex::new(Some(result_tx))),
        });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let result = result_rx
        .await
        .map_err(|_| AuthError::Consent("redirect listener stopped before a code arrived".into()));
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Err(e))) => tracing::debug!("OAuth callback server error: {}", e),
        Err(_) => tracing::debug!("OAuth callback server still draining, leaving it"),
        _ => {}
    }
    result?
}

async fn callback_handler(
    State(app): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    let (status, page, outcome) = match check_callback(&params, &app.expected_state) {
        Ok(Callback::Code(code)) => (StatusCode::OK, SUCCESS_PAGE, Ok(code)),
        Ok(Callback::Denied(reason)) => (
            StatusCode::OK,
            DENIED_PAGE,
            Err(AuthError::Consent(format!("authorization denied: {reason}"))),
        ),
        Ok(Callback::Ignored) => return (StatusCode::NOT_FOUND, Html("")),
        Err(e) => (StatusCode::BAD_REQUEST, REJECTED_PAGE, Err(e)),
    };
    if let Some(tx) = app.result_tx.lock().await.take() {
        let _ = tx.send(outcome);
    }
    (status, Html(page))
}

fn check_callback(params: &CallbackParams, expected_state: &str) -> Result<Callback, AuthError> {
    if params.code.is_none() && params.error.is_none() {
        return Ok(Callback::Ignored);
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthError::Consent("state mismatch in OAuth redirect".into()));
    }
    if let Some(error) = &params.error {
        return Ok(Callback::Denied(error.clone()));
    }
    Ok(params
        .code
        .clone()
        .map(Callback::Code)
        .unwrap_or(Callback::Ignored))
}
