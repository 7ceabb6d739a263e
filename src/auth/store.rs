use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::RngCore;

use super::credential::Credential;
use super::error::AuthError;

const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Durable storage for the single credential record.
pub trait CredentialStore: Send + Sync {
    /// Returns `Ok(None)` when nothing usable is stored, including a corrupt
    /// record.
    fn load(&self) -> Result<Option<Credential>, AuthError>;
    /// Replaces the record; a concurrent `load` never observes a partial write.
    fn save(&self, credential: &Credential) -> Result<(), AuthError>;
    /// Removes the record. Deleting a missing record succeeds.
    fn delete(&self) -> Result<(), AuthError>;
}

/// Configuration for file-backed credential storage.
#[derive(Debug, Clone)]
pub struct CredentialStoreConfig {
    pub path: PathBuf,
}

impl CredentialStoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `token.json` in the current working directory.
    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .map(|dir| dir.join(DEFAULT_TOKEN_FILE))
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_FILE))
    }
}

/// File-backed credential store writing one JSON document.
///
/// # Example
/// ```no_run
/// use chrono::{Duration, Utc};
/// use qbo_gateway::auth::{Credential, CredentialStore, CredentialStoreConfig, FileCredentialStore};
///
/// let store = FileCredentialStore::new(CredentialStoreConfig::new("/tmp/token.json".into()));
/// store.save(&Credential::new("access", "refresh", "123", Utc::now() + Duration::hours(1)))?;
/// # Ok::<(), qbo_gateway::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(config: CredentialStoreConfig) -> Self {
        Self {
            path: config.path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn new_default() -> Self {
        Self::new(CredentialStoreConfig::new(
            CredentialStoreConfig::default_path(),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error("read", &self.path, err)),
        };
        let credential: Credential = match serde_json::from_str(&raw) {
            Ok(credential) => credential,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unreadable credential record"
                );
                return Ok(None);
            }
        };
        if !credential.is_usable() {
            tracing::warn!(
                path = %self.path.display(),
                "ignoring credential record with empty access token"
            );
            return Ok(None);
        }
        tracing::debug!(path = %self.path.display(), realm_id = %credential.tenant_id, "credential loaded");
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let serialized = serde_json::to_vec_pretty(credential)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        replace_file(&self.path, &serialized)?;
        tracing::debug!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn delete(&self) -> Result<(), AuthError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "credential file deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error("delete", &self.path, err)),
        }
    }
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> AuthError {
    AuthError::Storage(format!("failed to {action} {}: {err}", path.display()))
}

/// Sibling of `path` that a reader globbing for the record will not pick up.
fn staging_path(path: &Path) -> Result<PathBuf, AuthError> {
    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Storage(format!("credential path {} has no file name", path.display()))
    })?;
    let suffix = rand::rng().next_u64();
    Ok(path.with_file_name(format!(
        ".{}.{suffix:016x}.partial",
        file_name.to_string_lossy()
    )))
}

/// Write `data` to a private staging file, flush it to disk, then rename it
/// over `path`. Readers see either the old record or the new one.
fn replace_file(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|err| storage_error("create directory", dir, err))?;
    }

    let staging = staging_path(path)?;
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let staged = options
        .open(&staging)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .map_err(|err| storage_error("write", &staging, err))
        .and_then(|()| fs::rename(&staging, path).map_err(|err| storage_error("replace", path, err)));
    if let Err(err) = staged {
        if let Err(cleanup) = fs::remove_file(&staging) {
            tracing::debug!(path = %staging.display(), error = %cleanup, "staging file not removed");
        }
        return Err(err);
    }

    // A pre-existing record may have been created with looser permissions.
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|err| storage_error("restrict permissions on", path, err))?;

    Ok(())
}
