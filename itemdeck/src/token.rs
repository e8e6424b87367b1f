//! Durable token storage: a single slot holding the raw bearer token.
//!
//! The gateway reads through a [`TokenStore`] on every request instead of
//! caching the token in memory, so a token rotated or cleared by another
//! invocation is picked up without restarting.
//!
//! **Security:** the file store writes with mode 600 on Unix and warns when
//! an existing token file is world-readable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("failed to read token file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write token file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to remove token file {path}: {source}")]
    Remove {
        path: String,
        source: std::io::Error,
    },
}

/// Capability to supply, replace, and discard the current bearer token.
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    fn load(&self) -> Result<Option<String>, TokenStoreError>;
    fn save(&self, token: &str) -> Result<(), TokenStoreError>;
    fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Token persisted to a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        check_token_file_permissions(&self.path);
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TokenStoreError::Read {
                path: self.display_path(),
                source,
            }),
        }
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| TokenStoreError::Write {
                    path: self.display_path(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.path, token).map_err(|source| TokenStoreError::Write {
            path: self.display_path(),
            source,
        })?;
        restrict_token_file_permissions(&self.path);
        Ok(())
    }

    /// Removing an already-absent file counts as success.
    fn clear(&self) -> Result<(), TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TokenStoreError::Remove {
                path: self.display_path(),
                source,
            }),
        }
    }
}

/// Warn if the token file is world-readable. No-op on non-Unix.
#[cfg(unix)]
fn check_token_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                "token file is world-readable; consider chmod 600"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_token_file_permissions(_path: &Path) {}

#[cfg(unix)]
fn restrict_token_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %e, "failed to restrict token file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_token_file_permissions(_path: &Path) {}

/// In-memory slot for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        let guard = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        let mut guard = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let mut guard = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{FileTokenStore, MemoryTokenStore, TokenStore};

    #[test]
    fn file_store_round_trips_token() -> Result<()> {
        let dir = tempdir()?;
        let store = FileTokenStore::new(dir.path().join("token"));

        assert_eq!(store.load()?, None);
        store.save("tok-abc")?;
        assert_eq!(store.load()?, Some(String::from("tok-abc")));
        store.clear()?;
        assert_eq!(store.load()?, None);
        Ok(())
    }

    #[test]
    fn file_store_treats_whitespace_file_as_absent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n")?;

        let store = FileTokenStore::new(path);
        assert_eq!(store.load()?, None);
        Ok(())
    }

    #[test]
    fn file_store_trims_trailing_newline() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("token");
        std::fs::write(&path, "tok-abc\n")?;

        let store = FileTokenStore::new(path);
        assert_eq!(store.load()?, Some(String::from("tok-abc")));
        Ok(())
    }

    #[test]
    fn file_store_clear_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let store = FileTokenStore::new(dir.path().join("token"));

        store.clear()?;
        store.save("tok")?;
        store.clear()?;
        store.clear()?;
        assert_eq!(store.load()?, None);
        Ok(())
    }

    #[test]
    fn file_store_creates_parent_directories() -> Result<()> {
        let dir = tempdir()?;
        let store = FileTokenStore::new(dir.path().join("nested").join("deeper").join("token"));

        store.save("tok")?;
        assert_eq!(store.load()?, Some(String::from("tok")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn file_store_saves_with_owner_only_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("token");
        let store = FileTokenStore::new(path.clone());

        store.save("tok")?;
        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn memory_store_round_trips_token() -> Result<()> {
        let store = MemoryTokenStore::default();

        assert_eq!(store.load()?, None);
        store.save("tok")?;
        assert_eq!(store.load()?, Some(String::from("tok")));
        store.clear()?;
        assert_eq!(store.load()?, None);
        Ok(())
    }
}
