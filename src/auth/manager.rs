//! Credential lifecycle: load, hand out, refresh, replace, revoke.
//!
//! [`TokenManager`] is the accessor every outbound API call goes through. It
//! owns the single live [`Credential`], refreshes it shortly before expiry and
//! makes sure concurrent callers share one refresh instead of racing the
//! provider's rotating refresh token.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use super::credential::Credential;
use super::error::AuthError;
use super::exchange::{OAuthTokenClient, TokenExchange};
use super::store::{CredentialStore, CredentialStoreConfig, FileCredentialStore};
use crate::config::GatewayConfig;

/// Default lead time, in seconds, before expiry at which a credential is renewed.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

enum Slot {
    /// The store has not been consulted yet.
    Uninitialized,
    Absent,
    Valid(Credential),
    Refreshing {
        previous: Credential,
        in_flight: SharedRefresh,
    },
}

impl Slot {
    fn current(&self) -> Option<&Credential> {
        match self {
            Slot::Valid(credential) | Slot::Refreshing {
                previous: credential,
                ..
            } => Some(credential),
            Slot::Uninitialized | Slot::Absent => None,
        }
    }
}

struct State {
    slot: Slot,
    /// Bumped when a refresh starts and whenever the credential is replaced
    /// or revoked; a refresh publishes only if the epoch is still its own.
    epoch: u64,
}

struct Inner {
    state: Mutex<State>,
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    refresh_margin: Duration,
}

/// Snapshot of the credential for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub is_authenticated: bool,
    pub realm_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    /// Whole minutes left; zero when expired or absent.
    pub minutes_until_expiry: i64,
}

/// Owner of the gateway's single bearer credential.
///
/// Cheap to clone; all clones share state. Build one at startup and hand it
/// to every component that calls the provider API.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use qbo_gateway::auth::{FileCredentialStore, OAuthTokenClient, TokenManager};
///
/// # async fn example() {
/// let manager = TokenManager::new(
///     Arc::new(FileCredentialStore::new_default()),
///     Arc::new(OAuthTokenClient::new("id", "secret", "http://localhost:5037/api/oauth/callback")),
/// );
/// match manager.get_current_token().await {
///     Some(credential) => println!("calling realm {}", credential.tenant_id),
///     None => println!("authorization required"),
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slot: Slot::Uninitialized,
                    epoch: 0,
                }),
                store,
                exchange,
                refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            }),
        }
    }

    /// Wire the file store and the HTTP exchange client from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, AuthError> {
        let store = FileCredentialStore::new(CredentialStoreConfig::new(config.token_path.clone()));
        let exchange = OAuthTokenClient::from_config(config)?;
        Ok(Self::new(Arc::new(store), Arc::new(exchange)).with_refresh_margin(config.refresh_margin()))
    }

    /// Only valid before the manager is shared.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.refresh_margin = margin,
            None => tracing::warn!("refresh margin ignored; manager already shared"),
        }
        self
    }

    pub fn refresh_margin(&self) -> Duration {
        self.inner.refresh_margin
    }

    /// The credential to call the API with, refreshed first when it is inside
    /// the refresh margin. `None` means the user has to authorize.
    pub async fn get_current_token(&self) -> Option<Credential> {
        match self.try_current_token().await {
            Ok(credential) => Some(credential),
            Err(err) => {
                tracing::debug!(error = %err, "no usable credential");
                None
            }
        }
    }

    /// Like [`get_current_token`](Self::get_current_token), but keeps the
    /// reason a credential is unavailable.
    pub async fn try_current_token(&self) -> Result<Credential, AuthError> {
        self.acquire(false).await
    }

    /// Install `credential` as the live credential and persist it.
    ///
    /// The in-memory credential is replaced even when persisting fails; the
    /// storage error is returned.
    pub fn save_token(&self, credential: Credential) -> Result<(), AuthError> {
        if !credential.is_usable() {
            return Err(AuthError::InvalidResponse(
                "refusing to store a credential with an empty access token".to_string(),
            ));
        }
        let mut state = self.inner.lock_state();
        state.epoch += 1;
        state.slot = Slot::Valid(credential.clone());
        match self.inner.store.save(&credential) {
            Ok(()) => {
                tracing::info!(
                    realm_id = %credential.tenant_id,
                    expires_at = %credential.expires_at,
                    "credential saved"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    realm_id = %credential.tenant_id,
                    error = %err,
                    "failed to persist credential"
                );
                Err(err)
            }
        }
    }

    /// Exchange an authorization code and install the resulting credential.
    pub async fn complete_authorization(
        &self,
        code: &str,
        realm_id: &str,
    ) -> Result<Credential, AuthError> {
        let grant = self.inner.exchange.exchange_code(code).await?;
        let credential = Credential::issue(grant, realm_id, Utc::now())?;
        self.save_token(credential.clone())?;
        Ok(credential)
    }

    /// Refresh now regardless of the margin. Returns `false` on any failure.
    pub async fn refresh_token(&self) -> bool {
        match self.try_refresh_token().await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "explicit refresh failed");
                false
            }
        }
    }

    /// Refresh now regardless of the margin, joining a refresh already in
    /// flight.
    pub async fn try_refresh_token(&self) -> Result<Credential, AuthError> {
        self.acquire(true).await
    }

    /// Whether an API call made now would get a live credential. Goes
    /// through the same path as [`get_current_token`](Self::get_current_token),
    /// so a credential inside the margin is refreshed first.
    pub async fn is_token_valid(&self) -> bool {
        self.try_current_token()
            .await
            .is_ok_and(|credential| !credential.is_expired_at(Utc::now()))
    }

    /// Forget the credential locally and on disk, then ask the provider to
    /// revoke it.
    ///
    /// Returns `false` only when the durable record could not be deleted; a
    /// failed remote revocation is logged and otherwise ignored.
    pub async fn revoke_token(&self) -> bool {
        let (refresh_token, deleted) = {
            let mut state = self.inner.lock_state();
            self.inner.ensure_loaded(&mut state);
            let refresh_token = state
                .slot
                .current()
                .map(|credential| credential.refresh_token.clone());
            state.epoch += 1;
            state.slot = Slot::Absent;
            (refresh_token, self.inner.store.delete())
        };

        if let Some(token) = refresh_token.filter(|token| !token.is_empty()) {
            match self.inner.exchange.revoke(&token).await {
                Ok(()) => tracing::info!("credential revoked with provider"),
                Err(err) => tracing::warn!(error = %err, "remote revocation failed"),
            }
        }

        match deleted {
            Ok(()) => {
                tracing::info!("local credential cleared");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to delete credential record");
                false
            }
        }
    }

    /// Status as an API caller would see it: refreshes inside the margin, and
    /// reports unauthenticated when no credential can be produced.
    pub async fn status(&self) -> TokenStatus {
        match self.try_current_token().await {
            Ok(credential) => TokenStatus::of(&credential, Utc::now()),
            Err(err) => {
                tracing::debug!(error = %err, "status without usable credential");
                TokenStatus::unauthenticated()
            }
        }
    }

    async fn acquire(&self, force: bool) -> Result<Credential, AuthError> {
        let in_flight = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;
            self.inner.ensure_loaded(state);
            match &state.slot {
                Slot::Uninitialized | Slot::Absent => return Err(AuthError::NotAuthenticated),
                Slot::Refreshing { in_flight, .. } => in_flight.clone(),
                Slot::Valid(credential)
                    if !force && !credential.expires_within(self.inner.refresh_margin, Utc::now()) =>
                {
                    return Ok(credential.clone());
                }
                Slot::Valid(credential) => {
                    let previous = credential.clone();
                    tracing::debug!(
                        realm_id = %previous.tenant_id,
                        expires_at = %previous.expires_at,
                        forced = force,
                        "starting token refresh"
                    );
                    state.epoch += 1;
                    let in_flight = spawn_refresh(&self.inner, previous.clone(), state.epoch);
                    state.slot = Slot::Refreshing {
                        previous,
                        in_flight: in_flight.clone(),
                    };
                    in_flight
                }
            }
        };
        in_flight.await
    }
}

/// Run the refresh on its own task so it completes even if every waiter
/// goes away. A refresh that panics or is cancelled leaves the slot `Absent`.
fn spawn_refresh(inner: &Arc<Inner>, previous: Credential, epoch: u64) -> SharedRefresh {
    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        let outcome = AssertUnwindSafe(task_inner.run_refresh(previous, epoch))
            .catch_unwind()
            .await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(task_inner.abandon_refresh(epoch, "refresh task panicked".to_string())),
        }
    });
    let weak: Weak<Inner> = Arc::downgrade(inner);
    async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                let reason = format!("refresh task failed: {err}");
                match weak.upgrade() {
                    Some(inner) => Err(inner.abandon_refresh(epoch, reason)),
                    None => Err(AuthError::Internal(reason)),
                }
            }
        }
    }
    .boxed()
    .shared()
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_loaded(&self, state: &mut State) {
        if !matches!(state.slot, Slot::Uninitialized) {
            return;
        }
        state.slot = match self.store.load() {
            Ok(Some(credential)) => {
                tracing::info!(
                    realm_id = %credential.tenant_id,
                    expires_at = %credential.expires_at,
                    "loaded stored credential"
                );
                Slot::Valid(credential)
            }
            Ok(None) => Slot::Absent,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load stored credential");
                Slot::Absent
            }
        };
    }

    fn abandon_refresh(&self, epoch: u64, reason: String) -> AuthError {
        let mut state = self.lock_state();
        if state.epoch == epoch && matches!(state.slot, Slot::Refreshing { .. }) {
            state.slot = Slot::Absent;
        }
        tracing::error!(reason = %reason, "token refresh aborted");
        AuthError::Internal(reason)
    }

    async fn run_refresh(&self, previous: Credential, epoch: u64) -> Result<Credential, AuthError> {
        let outcome = if previous.refresh_token.is_empty() {
            Err(AuthError::MissingRefreshToken)
        } else {
            self.exchange.refresh(&previous.refresh_token).await
        };
        let issued_at = Utc::now();

        let mut state = self.lock_state();
        if state.epoch != epoch {
            return match &state.slot {
                Slot::Valid(current) => {
                    tracing::info!(
                        realm_id = %current.tenant_id,
                        "discarding refresh result; a newer credential was saved"
                    );
                    Ok(current.clone())
                }
                _ => {
                    tracing::info!(
                        realm_id = %previous.tenant_id,
                        "discarding refresh result; credential was revoked"
                    );
                    Err(AuthError::Superseded)
                }
            };
        }

        match outcome.and_then(|grant| previous.renewed(grant, issued_at)) {
            Ok(renewed) => {
                if let Err(err) = self.store.save(&renewed) {
                    tracing::warn!(
                        realm_id = %renewed.tenant_id,
                        error = %err,
                        "refreshed credential could not be persisted"
                    );
                }
                state.slot = Slot::Valid(renewed.clone());
                tracing::info!(
                    realm_id = %renewed.tenant_id,
                    expires_at = %renewed.expires_at,
                    "access token refreshed"
                );
                Ok(renewed)
            }
            Err(err) => {
                state.slot = Slot::Absent;
                tracing::warn!(
                    realm_id = %previous.tenant_id,
                    error = %err,
                    "token refresh failed"
                );
                Err(err)
            }
        }
    }
}

impl TokenStatus {
    fn of(credential: &Credential, now: DateTime<Utc>) -> Self {
        let is_expired = credential.is_expired_at(now);
        Self {
            is_authenticated: !is_expired,
            realm_id: Some(credential.tenant_id.clone()),
            expires_at: Some(credential.expires_at),
            is_expired,
            minutes_until_expiry: if is_expired {
                0
            } else {
                (credential.expires_at - now).num_minutes()
            },
        }
    }

    fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            realm_id: None,
            expires_at: None,
            is_expired: false,
            minutes_until_expiry: 0,
        }
    }
}
