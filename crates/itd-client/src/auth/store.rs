use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SERVICE_NAME: &str = "itd-client";
const KEYRING_USER: &str = "refresh_token";
const TOKEN_FILE: &str = "credentials.json";

/// Persisted credentials for one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub refresh_token: String,
    /// Last access token seen, reused to skip the first refresh
    #[serde(default)]
    pub access_token: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl StoredCredentials {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            access_token: None,
            saved_at: Utc::now(),
        }
    }

    /// Checks if the stored refresh token is usable
    pub fn is_usable(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

/// Token store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No credentials stored")]
    NoToken,
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Trait for refresh token storage operations
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Saves the credentials
    async fn save(&self, credentials: &StoredCredentials) -> Result<()>;

    /// Loads the stored credentials
    async fn load(&self) -> Result<StoredCredentials, StoreError>;

    /// Deletes the stored credentials
    async fn delete(&self) -> Result<()>;

    /// Checks if credentials are stored
    async fn has_token(&self) -> bool;
}

/// Credential storage in a JSON file, mirrored into the system keyring
///
/// The file is authoritative. The keyring is written as a secondary store
/// and only read when the file is missing.
pub struct FileTokenStore {
    keyring_entry: Option<keyring::Entry>,
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store in the client's config directory
    pub fn new() -> Result<Self> {
        let config_dir = crate::config::ConfigManager::config_dir()?;
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(Self {
            keyring_entry: keyring::Entry::new(SERVICE_NAME, KEYRING_USER).ok(),
            path: config_dir.join(TOKEN_FILE),
        })
    }

    /// Creates a file-only store at a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            keyring_entry: None,
            path,
        }
    }

    fn parse(data: &str) -> Result<StoredCredentials, StoreError> {
        serde_json::from_str(data).map_err(|e| StoreError::Storage(e.into()))
    }
}

#[async_trait]
impl TokenStorage for FileTokenStore {
    async fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        let data =
            serde_json::to_string_pretty(credentials).context("Failed to serialize credentials")?;

        tokio::fs::write(&self.path, &data)
            .await
            .context("Failed to write credentials file")?;

        if let Some(ref entry) = self.keyring_entry {
            if let Err(err) = entry.set_password(&data) {
                tracing::debug!("keyring unavailable: {err}");
            }
        }

        Ok(())
    }

    async fn load(&self) -> Result<StoredCredentials, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => return Self::parse(&data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::Storage(err.into())),
        }

        if let Some(ref entry) = self.keyring_entry {
            if let Ok(data) = entry.get_password() {
                return Self::parse(&data);
            }
        }

        Err(StoreError::NoToken)
    }

    async fn delete(&self) -> Result<()> {
        if self.path.exists() {
            tokio::fs::remove_file(&self.path)
                .await
                .context("Failed to delete credentials file")?;
        }

        if let Some(ref entry) = self.keyring_entry {
            let _ = entry.delete_credential();
        }

        Ok(())
    }

    async fn has_token(&self) -> bool {
        if self.path.exists() {
            return true;
        }

        self.keyring_entry
            .as_ref()
            .is_some_and(|entry| entry.get_password().is_ok())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MemoryTokenStore;
    use super::*;

    #[test]
    fn blank_refresh_token_is_not_usable() {
        assert!(StoredCredentials::new("abc").is_usable());
        assert!(!StoredCredentials::new("  ").is_usable());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(!store.has_token().await);
        assert!(matches!(store.load().await, Err(StoreError::NoToken)));

        store.save(&StoredCredentials::new("r1")).await.unwrap();
        assert_eq!(store.load().await.unwrap().refresh_token, "r1");

        store.delete().await.unwrap();
        assert!(!store.has_token().await);
    }

    #[tokio::test]
    async fn memory_store_starts_with_credentials() {
        let store = MemoryTokenStore::with_credentials(StoredCredentials::new("seed"));
        assert!(store.has_token().await);
    }

    #[tokio::test]
    async fn file_store_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().join("credentials.json"));

        let mut credentials = StoredCredentials::new("refresh_456");
        credentials.access_token = Some("access_123".into());
        store.save(&credentials).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.refresh_token, "refresh_456");
        assert_eq!(loaded.access_token.as_deref(), Some("access_123"));
    }

    #[tokio::test]
    async fn file_store_load_nonexistent_returns_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().join("missing.json"));

        assert!(matches!(store.load().await, Err(StoreError::NoToken)));
        assert!(!store.has_token().await);
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileTokenStore::with_path(path);
        assert!(matches!(store.load().await, Err(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn file_store_delete_removes_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");

        let store = FileTokenStore::with_path(path.clone());
        store.save(&StoredCredentials::new("r")).await.unwrap();
        assert!(path.exists());
        assert!(store.has_token().await);

        store.delete().await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn legacy_file_without_access_token_parses() {
        let json = r#"{"refresh_token": "r", "saved_at": "2024-06-15T12:00:00Z"}"#;
        let credentials: StoredCredentials = serde_json::from_str(json).unwrap();
        assert!(credentials.access_token.is_none());
    }
}
