use serde::Deserialize;

use super::credentials::ClientConfig;
use super::error::AuthError;
use super::token_store::TokenPair;

/// Body returned by the token endpoint for both the code exchange and the
/// refresh grant. Only the fields this tool consumes are modelled.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a new access token.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        client_config: &ClientConfig,
        current: &TokenPair,
    ) -> Result<TokenPair, AuthError>;
}

/// Refresh grant against the provider's token endpoint.
pub struct OAuthRefresher {
    http: reqwest::Client,
}

impl OAuthRefresher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(
        &self,
        client_config: &ClientConfig,
        current: &TokenPair,
    ) -> Result<TokenPair, AuthError> {
        let url = client_config.token_endpoint.as_str();
        tracing::debug!("Refreshing the access token");

        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", client_config.client_id.as_str()),
                ("client_secret", client_config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|source| AuthError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| AuthError::Network {
            url: url.to_string(),
            source,
        })?;
        parse_refresh_response(current, status, &body)
    }
}

/// Build the replacement pair from a token endpoint answer.
///
/// The refresh token is kept unless the provider rotated it.
fn parse_refresh_response(
    current: &TokenPair,
    status: u16,
    body: &str,
) -> Result<TokenPair, AuthError> {
    if !(200..300).contains(&status) {
        return Err(AuthError::Refresh(format!(
            "token endpoint returned HTTP {status}: {body}"
        )));
    }
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::Refresh(format!("unparseable token response: {e}")))?;
    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Refresh("no access_token in token response".into()))?;

    let refresh_token = match parsed.refresh_token {
        Some(rotated) if !rotated.is_empty() && rotated != current.refresh_token => {
            tracing::info!("Provider rotated the refresh token, storing the new one");
            rotated
        }
        _ => current.refresh_token.clone(),
    };

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::test_client_config;
    use mockito::Matcher;

    fn current() -> TokenPair {
        TokenPair {
            access_token: "expired".into(),
            refresh_token: "refresh-1".into(),
        }
    }

    #[test]
    fn test_parse_keeps_refresh_token() {
        let pair = parse_refresh_response(
            &current(),
            200,
            r#"{"access_token": "fresh", "expires_in": 3599, "token_type": "Bearer"}"#,
        )
        .unwrap();
        assert_eq!(pair.access_token, "fresh");
        assert_eq!(pair.refresh_token, "refresh-1");
    }

    #[test]
    fn test_parse_adopts_rotated_refresh_token() {
        let pair = parse_refresh_response(
            &current(),
            200,
            r#"{"access_token": "fresh", "refresh_token": "refresh-2"}"#,
        )
        .unwrap();
        assert_eq!(pair.refresh_token, "refresh-2");
    }

    #[test]
    fn test_parse_missing_access_token() {
        let err = parse_refresh_response(&current(), 200, r#"{"token_type": "Bearer"}"#)
            .unwrap_err();
        assert!(matches!(err, AuthError::Refresh(_)));
    }

    #[test]
    fn test_parse_error_status() {
        let err = parse_refresh_response(&current(), 400, r#"{"error": "invalid_grant"}"#)
            .unwrap_err();
        match err {
            AuthError::Refresh(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_posts_form_to_token_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
                Matcher::UrlEncoded("client_id".into(), "client-id".into()),
                Matcher::UrlEncoded("client_secret".into(), "client-secret".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token": "fresh"}"#)
            .create_async()
            .await;
        let mut cfg = test_client_config();
        cfg.token_endpoint = url::Url::parse(&format!("{}/token", server.url())).unwrap();

        let refresher = OAuthRefresher::new(reqwest::Client::new());
        let pair = refresher.refresh(&cfg, &current()).await.unwrap();
        assert_eq!(pair.access_token, "fresh");
        assert_eq!(pair.refresh_token, "refresh-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant_is_refresh_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;
        let mut cfg = test_client_config();
        cfg.token_endpoint = url::Url::parse(&format!("{}/token", server.url())).unwrap();

        let err = OAuthRefresher::new(reqwest::Client::new())
            .refresh(&cfg, &current())
            .await
            .unwrap_err();
        match err {
            AuthError::Refresh(msg) => assert!(msg.contains("HTTP 400")),
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_unreachable_endpoint_is_network_error() {
        let refresher = OAuthRefresher::new(reqwest::Client::new());
        let err = refresher
            .refresh(&test_client_config(), &current())
            .await
            .unwrap_err();
        assert!(err.is_network());
    }
}
