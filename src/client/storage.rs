//! Device-local persistence for guest carts and wishlists.
//!
//! Values are JSON documents stored under a key. `MemoryGuestStorage` keeps
//! them for the life of the process; `FileGuestStorage` writes one
//! `{key}.json` file per key under a base directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use super::errors::ClientResult;

pub const GUEST_CART_KEY: &str = "guest_cart";
pub const GUEST_WISHLIST_KEY: &str = "guest_wishlist";

#[async_trait]
pub trait GuestStorage: Send + Sync {
    async fn load(&self, key: &str) -> ClientResult<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> ClientResult<()>;
}

/// Reads a stored list. A missing or unreadable document yields an empty list.
pub async fn load_list<T: DeserializeOwned>(
    storage: &dyn GuestStorage,
    key: &str,
) -> ClientResult<Vec<T>> {
    let Some(raw) = storage.load(key).await? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&raw) {
        Ok(list) => Ok(list),
        Err(err) => {
            warn!(key, error = %err, "Discarding unreadable guest data");
            Ok(Vec::new())
        }
    }
}

pub async fn save_list<T: Serialize>(
    storage: &dyn GuestStorage,
    key: &str,
    list: &[T],
) -> ClientResult<()> {
    let raw = serde_json::to_string(list)?;
    storage.save(key, &raw).await
}

#[derive(Debug, Default)]
pub struct MemoryGuestStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryGuestStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuestStorage for MemoryGuestStorage {
    async fn load(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileGuestStorage {
    base_path: PathBuf,
}

impl FileGuestStorage {
    /// Creates the base directory if it doesn't exist.
    pub async fn new(base_path: impl AsRef<Path>) -> ClientResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }
}

#[async_trait]
impl GuestStorage for FileGuestStorage {
    async fn load(&self, key: &str) -> ClientResult<Option<String>> {
        match fs::read_to_string(self.path_for_key(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, key: &str, value: &str) -> ClientResult<()> {
        // Write to a temp file then rename so readers never see a partial document
        let path = self.path_for_key(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        match fs::remove_file(self.path_for_key(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
