//! Access token persistence
//!
//! The token is the only state docchat keeps between runs. It is stored under
//! a single well-known key so other tooling can find it.

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Storage key of the bearer token
pub const TOKEN_KEY: &str = "accessToken";

pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file holding `{"accessToken": "..."}`
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&content)?;
        Ok(entries
            .get(TOKEN_KEY)
            .filter(|token| !token.is_empty())
            .cloned())
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut entries = BTreeMap::new();
        entries.insert(TOKEN_KEY.to_string(), token.to_string());
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!("Stored access token at {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the token for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = FileTokenStorage::new(tmp.path().join("nested").join("credentials.json"));

        assert_eq!(storage.load().unwrap(), None);

        storage.save("abc123").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("abc123"));

        let raw = std::fs::read_to_string(storage.path()).unwrap();
        assert!(raw.contains("\"accessToken\""));

        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
        // Clearing twice is fine
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_ignores_other_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let storage = FileTokenStorage::new(&path);
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryTokenStorage::with_token("t1");
        assert_eq!(storage.load().unwrap().as_deref(), Some("t1"));
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }
}
