#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use qbo_gateway::auth::{AuthError, Credential, CredentialStore, TokenExchange, TokenGrant};
use tokio::sync::Notify;

#[derive(Default)]
pub struct InMemoryCredentialStore {
    record: Mutex<Option<Credential>>,
    saves: AtomicUsize,
    deletes: AtomicUsize,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    fail_delete: AtomicBool,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(credential: Credential) -> Self {
        let store = Self::default();
        store.seed(credential);
        store
    }

    pub fn seed(&self, credential: Credential) {
        *self.record.lock().expect("store lock poisoned") = Some(credential);
    }

    pub fn get(&self) -> Option<Credential> {
        self.record.lock().expect("store lock poisoned").clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("disk unavailable".to_string()));
        }
        Ok(self.get())
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("read-only file system".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().expect("store lock poisoned") = Some(credential.clone());
        Ok(())
    }

    fn delete(&self) -> Result<(), AuthError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("permission denied".to_string()));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().expect("store lock poisoned") = None;
        Ok(())
    }
}

/// Token endpoint double with queued answers and call counters.
///
/// Refresh calls can be held at a gate (released with `open_gate`) or slowed
/// by a fixed delay so concurrent callers overlap.
#[derive(Default)]
pub struct ScriptedExchange {
    refresh_results: Mutex<VecDeque<Result<TokenGrant, AuthError>>>,
    exchange_results: Mutex<VecDeque<Result<TokenGrant, AuthError>>>,
    revoke_result: Mutex<Option<AuthError>>,
    refresh_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    refresh_delay: Mutex<Option<StdDuration>>,
    panic_next_refresh: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    seen_refresh_tokens: Mutex<Vec<String>>,
    seen_codes: Mutex<Vec<String>>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_refresh(&self, result: Result<TokenGrant, AuthError>) {
        self.refresh_results
            .lock()
            .expect("script lock poisoned")
            .push_back(result);
    }

    pub fn push_exchange(&self, result: Result<TokenGrant, AuthError>) {
        self.exchange_results
            .lock()
            .expect("script lock poisoned")
            .push_back(result);
    }

    pub fn fail_revoke(&self, error: AuthError) {
        *self.revoke_result.lock().expect("script lock poisoned") = Some(error);
    }

    /// Make the next refresh call panic instead of answering.
    pub fn panic_next_refresh(&self) {
        self.panic_next_refresh.store(true, Ordering::SeqCst);
    }

    pub fn with_refresh_delay(self, delay: StdDuration) -> Self {
        *self.refresh_delay.lock().expect("script lock poisoned") = Some(delay);
        self
    }

    /// Hold every refresh until [`open_gate`](Self::open_gate) is called.
    pub fn with_gate(self) -> Self {
        *self.gate.lock().expect("script lock poisoned") = Some(Arc::new(Notify::new()));
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = self.gate.lock().expect("script lock poisoned").as_ref() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen_refresh_tokens
            .lock()
            .expect("script lock poisoned")
            .clone()
    }

    pub fn seen_codes(&self) -> Vec<String> {
        self.seen_codes.lock().expect("script lock poisoned").clone()
    }

    /// Poll until `n` refresh calls have started.
    pub async fn wait_for_refresh_calls(&self, n: usize) {
        for _ in 0..500 {
            if self.refresh_calls() >= n {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(2)).await;
        }
        panic!("refresh was never called");
    }
}

#[async_trait]
impl TokenExchange for ScriptedExchange {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_codes
            .lock()
            .expect("script lock poisoned")
            .push(code.to_string());
        self.exchange_results
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Internal("no scripted exchange result".into())))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_refresh_tokens
            .lock()
            .expect("script lock poisoned")
            .push(refresh_token.to_string());
        let gate = self.gate.lock().expect("script lock poisoned").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.refresh_delay.lock().expect("script lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_next_refresh.swap(false, Ordering::SeqCst) {
            panic!("token endpoint double blew up");
        }
        self.refresh_results
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Internal("no scripted refresh result".into())))
    }

    async fn revoke(&self, _token: &str) -> Result<(), AuthError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        match self.revoke_result.lock().expect("script lock poisoned").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn credential_expiring_in(access_token: &str, refresh_token: &str, ttl: Duration) -> Credential {
    Credential::new(access_token, refresh_token, "123", Utc::now() + ttl)
}

pub fn grant(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> TokenGrant {
    TokenGrant::new(access_token, refresh_token.map(ToString::to_string), expires_in)
}
