//! OAuth2 token endpoint calls: code exchange, refresh, revoke.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;

use super::credential::TokenGrant;
use super::error::AuthError;
use crate::config::GatewayConfig;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
pub const DEFAULT_REVOKE_URL: &str = "https://developer.api.intuit.com/v2/oauth2/tokens/revoke";

/// The three wire operations needed to keep a bearer credential alive.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Trade the authorization code from the interactive flow for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError>;

    /// Mint a new access token. The returned refresh token is optional.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;

    /// Ask the provider to stop honoring `token`.
    async fn revoke(&self, token: &str) -> Result<(), AuthError>;
}

/// reqwest-backed client for the provider's token and revoke endpoints.
///
/// Authenticates with HTTP Basic `client_id:client_secret` and sends grants
/// as `application/x-www-form-urlencoded`.
///
/// # Example
/// ```no_run
/// use qbo_gateway::auth::OAuthTokenClient;
///
/// let client = OAuthTokenClient::new("client-id", "client-secret", "http://localhost:5037/api/oauth/callback");
/// # let _ = client;
/// ```
pub struct OAuthTokenClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    revoke_url: String,
}

impl OAuthTokenClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
        }
    }

    /// Build a client from gateway configuration, including the request
    /// timeout that bounds every exchange.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri.clone(),
        )
        .with_http_client(client)
        .with_token_url(config.token_url.clone())
        .with_revoke_url(config.revoke_url.clone()))
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_revoke_url(mut self, url: impl Into<String>) -> Self {
        self.revoke_url = url.into();
        self
    }

    async fn request_grant(
        &self,
        operation: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenGrant, AuthError> {
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(&resp);
            let body = resp.text().await.unwrap_or_default();
            return Err(map_error_status(operation, status, retry_after_ms, &body));
        }
        let payload: TokenEndpointResponse = resp.json().await?;
        payload.into_grant()
    }
}

#[async_trait]
impl TokenExchange for OAuthTokenClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let grant = self
            .request_grant(
                "Authorization code exchange",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", self.redirect_uri.as_str()),
                ],
            )
            .await?;
        if grant.refresh_token.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::InvalidResponse(
                "token response missing refresh_token".to_string(),
            ));
        }
        tracing::debug!(expires_in = grant.expires_in, "authorization code exchanged");
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let grant = self
            .request_grant(
                "Token refresh",
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;
        tracing::debug!(
            expires_in = grant.expires_in,
            rotated = grant.refresh_token.is_some(),
            "access token refreshed"
        );
        Ok(grant)
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let resp = self
            .client
            .post(&self.revoke_url)
            .header("Accept", "application/json")
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token)])
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after_ms = retry_after_ms(&resp);
        let body = resp.text().await.unwrap_or_default();
        Err(map_error_status("Token revocation", status, retry_after_ms, &body))
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenEndpointResponse {
    fn into_grant(self) -> Result<TokenGrant, AuthError> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidResponse("token response missing access_token".to_string())
            })?;
        let expires_in = self.expires_in.ok_or_else(|| {
            AuthError::InvalidResponse("token response missing expires_in".to_string())
        })?;
        let grant = TokenGrant::new(
            access_token,
            self.refresh_token.filter(|token| !token.is_empty()),
            expires_in,
        );
        grant.expires_at(Utc::now())?;
        Ok(grant)
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

fn map_error_status(
    operation: &str,
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> AuthError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::RateLimited { retry_after_ms };
    }
    let parsed = serde_json::from_str::<TokenErrorResponse>(body).ok();
    let code = parsed.as_ref().and_then(|p| p.error.clone());
    if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED)
        && code.as_deref() == Some("invalid_grant")
    {
        return AuthError::ExpiredOrInvalidGrant;
    }
    let detail = match (code, parsed.and_then(|p| p.error_description)) {
        (Some(code), Some(description)) => format!(": {code} ({description})"),
        (Some(code), None) => format!(": {code}"),
        _ => String::new(),
    };
    AuthError::InvalidResponse(format!("{operation} failed with status {status}{detail}"))
}

fn retry_after_ms(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).as_millis() as u64)
}
