use thiserror::Error;

use crate::error::GatewayError;

/// Errors raised while acquiring, storing, or renewing the provider credential.
///
/// Variants carry strings rather than source errors so the value is `Clone`;
/// a single refresh outcome is handed to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Expired or invalid grant")]
    ExpiredOrInvalidGrant,
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid state parameter: {0}")]
    InvalidState(String),
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),
    #[error("No refresh token available")]
    MissingRefreshToken,
    #[error("Credential was replaced while the refresh was in flight")]
    Superseded,
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of [`AuthError`] used by callers that only care where a
/// failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Talking to the provider's token endpoint failed.
    Exchange,
    /// Reading or writing the durable record failed.
    Storage,
    /// No usable credential; the user has to authorize again.
    NotAuthenticated,
    /// The interactive authorization callback was rejected.
    Flow,
}

impl AuthError {
    pub fn category(&self) -> AuthErrorKind {
        match self {
            Self::NotAuthenticated | Self::MissingRefreshToken | Self::Superseded => {
                AuthErrorKind::NotAuthenticated
            }
            Self::Storage(_) | Self::Serialization(_) => AuthErrorKind::Storage,
            Self::AccessDenied(_) | Self::InvalidState(_) | Self::InvalidCallback(_) => {
                AuthErrorKind::Flow
            }
            Self::ExpiredOrInvalidGrant
            | Self::RateLimited { .. }
            | Self::InvalidResponse(_)
            | Self::Network(_)
            | Self::Internal(_) => AuthErrorKind::Exchange,
        }
    }

    /// Whether the failure means the interactive authorization flow has to be
    /// run again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::ExpiredOrInvalidGrant
                | Self::MissingRefreshToken
                | Self::Superseded
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::InvalidResponse(error.to_string());
        }
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::RateLimited { retry_after_ms } => GatewayError::RateLimited { retry_after_ms },
            AuthError::Storage(msg) => GatewayError::Storage(msg),
            other => GatewayError::Authentication(other.to_string()),
        }
    }
}
