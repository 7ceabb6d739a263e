//! OAuth credential lifecycle: storage, token endpoint, refresh, authorization.

pub mod credential;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod manager;
pub mod store;

pub use credential::{Credential, TokenGrant};
pub use error::{AuthError, AuthErrorKind};
pub use exchange::{OAuthTokenClient, TokenExchange};
pub use flow::{AuthorizationFlow, AuthorizationRequest, CallbackParams, StatePolicy};
pub use manager::{TokenManager, TokenStatus, DEFAULT_REFRESH_MARGIN_SECS};
pub use store::{CredentialStore, CredentialStoreConfig, FileCredentialStore};
