//! Configuration system (layered: defaults > TOML file > env).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::auth::exchange::{DEFAULT_REVOKE_URL, DEFAULT_TOKEN_URL};
use crate::auth::flow::{StatePolicy, DEFAULT_AUTHORIZE_URL};
use crate::error::{GatewayError, Result};

const DEFAULT_TOKEN_FILE: &str = "token.json";
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Which accounting API cluster the realm lives on.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    /// Base URL for accounting API calls made with the credential.
    pub fn api_base_url(self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            Environment::Production => "https://quickbooks.api.intuit.com",
        }
    }
}

/// Gateway configuration.
///
/// Resolution order:
/// 1. Built-in defaults (provider endpoints, sandbox, `token.json`)
/// 2. TOML file (`from_toml_path`)
/// 3. `QBO_*` environment variables, including a `.env` file
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub environment: Environment,
    /// Empty means the default accounting scope.
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub token_path: PathBuf,
    pub refresh_margin_secs: u64,
    pub state_policy: StatePolicy,
    pub http_timeout_secs: u64,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("redirect_uri", &self.redirect_uri)
            .field("environment", &self.environment)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .field("token_path", &self.token_path)
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .field("state_policy", &self.state_policy)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            environment: Environment::default(),
            scopes: Vec::new(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
            token_path: PathBuf::from(DEFAULT_TOKEN_FILE),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            state_policy: StatePolicy::default(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides()
    }

    /// Parse a TOML file. Keys missing from the file keep their defaults.
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            GatewayError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Full layering: defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let base = match path {
            Some(path) => Self::from_toml_path(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// Apply `QBO_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = env_value("QBO_CLIENT_ID") {
            self.client_id = value;
        }
        if let Some(value) = env_value("QBO_CLIENT_SECRET") {
            self.client_secret = value;
        }
        if let Some(value) = env_value("QBO_REDIRECT_URI") {
            self.redirect_uri = value;
        }
        if let Some(value) = env_value("QBO_ENVIRONMENT") {
            self.environment = parse_env("QBO_ENVIRONMENT", &value)?;
        }
        if let Some(value) = env_value("QBO_SCOPES") {
            self.scopes = split_scopes(&value);
        }
        if let Some(value) = env_value("QBO_AUTHORIZE_URL") {
            self.authorize_url = value;
        }
        if let Some(value) = env_value("QBO_TOKEN_URL") {
            self.token_url = value;
        }
        if let Some(value) = env_value("QBO_REVOKE_URL") {
            self.revoke_url = value;
        }
        if let Some(value) = env_value("QBO_TOKEN_PATH") {
            self.token_path = PathBuf::from(value);
        }
        if let Some(value) = env_value("QBO_REFRESH_MARGIN_SECS") {
            self.refresh_margin_secs = parse_env("QBO_REFRESH_MARGIN_SECS", &value)?;
        }
        if let Some(value) = env_value("QBO_STATE_POLICY") {
            self.state_policy = parse_env("QBO_STATE_POLICY", &value)?;
        }
        if let Some(value) = env_value("QBO_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_env("QBO_HTTP_TIMEOUT_SECS", &value)?;
        }
        Ok(self)
    }

    /// Check that the OAuth client identity is present.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("client_id", self.client_id.is_empty()),
            ("client_secret", self.client_secret.is_empty()),
            ("redirect_uri", self.redirect_uri.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(GatewayError::Configuration(format!(
                "missing required setting(s): {}",
                missing.join(", ")
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(GatewayError::Configuration(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.refresh_margin_secs).unwrap_or(i64::MAX))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn api_base_url(&self) -> &'static str {
        self.environment.api_base_url()
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|err| GatewayError::Configuration(format!("invalid {key}={value:?}: {err}")))
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}
