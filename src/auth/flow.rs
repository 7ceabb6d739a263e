//! Interactive authorization-code flow: authorize URL out, callback in.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::credential::Credential;
use super::error::AuthError;
use super::manager::TokenManager;
use crate::config::GatewayConfig;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://appcenter.intuit.com/connect/oauth2";
pub const DEFAULT_SCOPE: &str = "com.intuit.quickbooks.accounting";

/// How to treat a callback when the `state` issued by [`AuthorizationFlow::start`]
/// is no longer known (e.g. the session that stored it expired).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StatePolicy {
    /// Reject the callback.
    Strict,
    /// Log a warning and accept the callback.
    #[default]
    Lenient,
}

/// Where to send the user, and the `state` to remember until the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub authorize_url: String,
    pub state: String,
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    pub error: Option<String>,
}

/// Builds authorize URLs and turns validated callbacks into credentials.
pub struct AuthorizationFlow {
    manager: TokenManager,
    client_id: String,
    redirect_uri: String,
    authorize_url: String,
    scopes: Vec<String>,
    state_policy: StatePolicy,
}

impl AuthorizationFlow {
    pub fn new(
        manager: TokenManager,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            scopes: Vec::new(),
            state_policy: StatePolicy::default(),
        }
    }

    pub fn from_config(config: &GatewayConfig, manager: TokenManager) -> Self {
        Self::new(manager, config.client_id.clone(), config.redirect_uri.clone())
            .with_authorize_url(config.authorize_url.clone())
            .with_scopes(config.scopes.clone())
            .with_state_policy(config.state_policy)
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_state_policy(mut self, policy: StatePolicy) -> Self {
        self.state_policy = policy;
        self
    }

    /// Generate a fresh `state` and the authorize URL carrying it.
    pub fn start(&self) -> Result<AuthorizationRequest, AuthError> {
        let state = generate_state();
        let scope = if self.scopes.is_empty() {
            tracing::warn!(scope = DEFAULT_SCOPE, "no scopes configured; using default");
            DEFAULT_SCOPE.to_string()
        } else {
            self.scopes.join(" ")
        };
        let url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|err| {
            AuthError::Internal(format!("invalid authorize url {}: {err}", self.authorize_url))
        })?;
        tracing::debug!("authorization flow started");
        Ok(AuthorizationRequest {
            authorize_url: url.into(),
            state,
        })
    }

    /// Validate the provider callback and install the resulting credential.
    ///
    /// `expected_state` is the value returned by [`start`](Self::start), or
    /// `None` if it was lost.
    pub async fn complete(
        &self,
        params: CallbackParams,
        expected_state: Option<&str>,
    ) -> Result<Credential, AuthError> {
        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            tracing::warn!(error = %error, "provider denied authorization");
            return Err(AuthError::AccessDenied(error));
        }

        let state = params
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::InvalidState("state parameter missing".to_string()))?;
        match expected_state {
            Some(expected) if expected != state => {
                tracing::warn!("state mismatch on authorization callback; possible CSRF");
                return Err(AuthError::InvalidState(
                    "state does not match the issued value".to_string(),
                ));
            }
            Some(_) => {}
            None => match self.state_policy {
                StatePolicy::Strict => {
                    return Err(AuthError::InvalidState(
                        "no issued state to compare against".to_string(),
                    ));
                }
                StatePolicy::Lenient => {
                    tracing::warn!("issued state unavailable; accepting callback without comparison");
                }
            },
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::InvalidCallback("authorization code missing".to_string()))?;
        let realm_id = params
            .realm_id
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AuthError::InvalidCallback("realmId missing".to_string()))?;

        let credential = self.manager.complete_authorization(&code, &realm_id).await?;
        tracing::info!(realm_id = %credential.tenant_id, "authorization completed");
        Ok(credential)
    }
}

/// 32 random bytes, base64url without padding.
fn generate_state() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
