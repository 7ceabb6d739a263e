//! The bearer credential and the provider's token grant.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// The single bearer credential the gateway holds for a realm.
///
/// Serialized with the key names earlier deployments wrote to
/// `token.json`, so an existing file keeps loading.
///
/// # Example
/// ```no_run
/// use chrono::{Duration, Utc};
/// use qbo_gateway::auth::Credential;
///
/// let credential = Credential::new("access", "refresh", "9130355", Utc::now() + Duration::hours(1));
/// assert!(!credential.is_expired_at(Utc::now()));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "AccessToken")]
    pub access_token: String,
    #[serde(rename = "RefreshToken")]
    pub refresh_token: String,
    #[serde(rename = "RealmId")]
    pub tenant_id: String,
    #[serde(rename = "ExpiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        tenant_id: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            tenant_id: tenant_id.into(),
            expires_at,
        }
    }

    /// Build the credential produced by an authorization-code exchange.
    ///
    /// The expiry is derived from the provider TTL; a grant without a refresh
    /// token cannot seed a renewable credential and is rejected.
    pub fn issue(
        grant: TokenGrant,
        tenant_id: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let expires_at = grant.expires_at(issued_at)?;
        let refresh_token = grant
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidResponse("token response missing refresh_token".to_string())
            })?;
        Ok(Self {
            access_token: grant.access_token,
            refresh_token,
            tenant_id: tenant_id.into(),
            expires_at,
        })
    }

    /// Apply a refresh grant, keeping the tenant and carrying the previous
    /// refresh token forward when the provider did not rotate it.
    pub fn renewed(&self, grant: TokenGrant, issued_at: DateTime<Utc>) -> Result<Self, AuthError> {
        let expires_at = grant.expires_at(issued_at)?;
        Ok(Self {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .filter(|token| !token.is_empty())
                .unwrap_or_else(|| self.refresh_token.clone()),
            tenant_id: self.tenant_id.clone(),
            expires_at,
        })
    }

    /// `true` when the access token expires within `margin` of `now`
    /// (already-expired credentials included).
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - now <= margin
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// An empty access token is never handed out as a credential.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"..")
            .field("refresh_token", &"..")
            .field("tenant_id", &self.tenant_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response for the authorization-code and refresh grants.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in,
        }
    }

    /// `issued_at + expires_in`. A TTL that does not fit a timestamp is a
    /// malformed grant.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Result<DateTime<Utc>, AuthError> {
        Duration::try_seconds(self.expires_in.max(0))
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_in out of range: {}", self.expires_in))
            })
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"..")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| ".."))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
