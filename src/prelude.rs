//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthorizationFlow, CallbackParams, Credential, CredentialStore,
    FileCredentialStore, OAuthTokenClient, TokenExchange, TokenManager, TokenStatus,
};
pub use crate::config::{Environment, GatewayConfig};
pub use crate::error::{GatewayError, Result};
