//! In-process fakes for the auth seams, shared by unit tests across modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use super::client::{ApiRequest, ApiResponse, AuthClient, Body, HttpTransport};
use super::credentials::{test_client_config, ClientConfig};
use super::error::AuthError;
use super::refresher::TokenRefresher;
use super::token_store::{TokenPair, TokenStore};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub access_token: String,
    pub body: Body,
}

impl RecordedCall {
    pub fn json(&self) -> serde_json::Value {
        match &self.body {
            Body::Json(v) => v.clone(),
            other => panic!("expected JSON body, got {:?}", other),
        }
    }

    pub fn raw(&self) -> Bytes {
        match &self.body {
            Body::Raw(b) => b.clone(),
            other => panic!("expected raw body, got {:?}", other),
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone)]
enum Reply {
    Respond(u16, String),
    NetworkError,
}

struct Route {
    method: String,
    url_suffix: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct Script {
    routes: Vec<Route>,
    rejected_tokens: Vec<String>,
    calls: Vec<RecordedCall>,
}

/// Transport answering from per-route reply queues. The last reply of a
/// queue is sticky, so a single `on` call scripts every matching request.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: &str, url_suffix: &str, status: u16, body: &str) {
        self.push(method, url_suffix, Reply::Respond(status, body.to_string()));
    }

    pub fn on_network_error(&self, method: &str, url_suffix: &str) {
        self.push(method, url_suffix, Reply::NetworkError);
    }

    /// Answer 401 to any request carrying `token`, regardless of route.
    pub fn reject_token(&self, token: &str) {
        self.script
            .lock()
            .unwrap()
            .rejected_tokens
            .push(token.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, url_suffix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.url.ends_with(url_suffix))
            .collect()
    }

    fn push(&self, method: &str, url_suffix: &str, reply: Reply) {
        let mut script = self.script.lock().unwrap();
        if let Some(route) = script
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.url_suffix == url_suffix)
        {
            route.replies.push_back(reply);
            return;
        }
        script.routes.push(Route {
            method: method.to_string(),
            url_suffix: url_suffix.to_string(),
            replies: VecDeque::from([reply]),
        });
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, AuthError> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(RecordedCall {
                method: request.method.to_string(),
                url: request.url.clone(),
                query: request.query.clone(),
                headers: request.headers.clone(),
                access_token: access_token.to_string(),
                body: request.body.clone(),
            });

            if script.rejected_tokens.iter().any(|t| t == access_token) {
                Reply::Respond(401, "token rejected".into())
            } else {
                let method = request.method.to_string();
                match script
                    .routes
                    .iter_mut()
                    .find(|r| r.method == method && request.url.ends_with(&r.url_suffix))
                {
                    Some(route) if route.replies.len() > 1 => {
                        route.replies.pop_front().unwrap_or(Reply::NetworkError)
                    }
                    Some(route) => route.replies[0].clone(),
                    None => Reply::Respond(404, format!("no route for {}", request.url)),
                }
            }
        };

        match reply {
            Reply::Respond(status, body) => Ok(ApiResponse {
                status,
                body: Bytes::from(body),
            }),
            Reply::NetworkError => {
                let source = reqwest::Client::new()
                    .get("http://127.0.0.1:1")
                    .send()
                    .await
                    .unwrap_err();
                Err(AuthError::Network {
                    url: request.url.clone(),
                    source,
                })
            }
        }
    }
}

/// Refresher that mints `fresh-<n>` access tokens and counts calls.
#[derive(Clone, Default)]
pub(crate) struct CountingRefresher {
    calls: Arc<AtomicUsize>,
    fail: bool,
    delay: Option<Duration>,
}

impl CountingRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(
        &self,
        _client_config: &ClientConfig,
        current: &TokenPair,
    ) -> Result<TokenPair, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AuthError::Refresh("invalid_grant".into()));
        }
        Ok(TokenPair {
            access_token: format!("fresh-{n}"),
            refresh_token: current.refresh_token.clone(),
        })
    }
}

/// AuthClient wired to the given fakes, with a token store in a temp dir
/// holding `initial-access` / `initial-refresh`.
pub(crate) async fn test_auth_client(
    transport: &ScriptedTransport,
    refresher: &CountingRefresher,
) -> (AuthClient, Arc<TokenStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TokenStore::open(&dir.path().join("tokens.json")).await.unwrap());
    store
        .save(&TokenPair {
            access_token: "initial-access".into(),
            refresh_token: "initial-refresh".into(),
        })
        .await
        .unwrap();
    let client = AuthClient::new(
        Arc::new(transport.clone()),
        Arc::new(refresher.clone()),
        Arc::clone(&store),
        Arc::new(test_client_config()),
    );
    (client, store, dir)
}
