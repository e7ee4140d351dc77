use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::ClientResult;
use super::remote::RemoteWishlist;
use super::storage::{load_list, save_list, GuestStorage, GUEST_WISHLIST_KEY};
use super::{ProductSnapshot, SessionMode, WishlistItem};

pub struct WishlistStore {
    storage: Arc<dyn GuestStorage>,
    mode: SessionMode<dyn RemoteWishlist>,
    items: Vec<WishlistItem>,
}

impl WishlistStore {
    pub async fn guest(storage: Arc<dyn GuestStorage>) -> ClientResult<Self> {
        let items = load_list(storage.as_ref(), GUEST_WISHLIST_KEY).await?;
        Ok(Self {
            storage,
            mode: SessionMode::Guest,
            items,
        })
    }

    pub fn items(&self) -> &[WishlistItem] {
        &self.items
    }

    pub fn is_authenticated(&self) -> bool {
        self.mode.is_authenticated()
    }

    pub fn contains(&self, product_id: Uuid) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }

    pub async fn refresh(&mut self) -> ClientResult<()> {
        self.items = match &self.mode {
            SessionMode::Guest => load_list(self.storage.as_ref(), GUEST_WISHLIST_KEY).await?,
            SessionMode::Authenticated(remote) => remote.fetch_wishlist().await?,
        };
        Ok(())
    }

    /// Returns false when a guest already has the product listed.
    pub async fn add(&mut self, product: ProductSnapshot) -> ClientResult<bool> {
        if let SessionMode::Authenticated(remote) = &self.mode {
            remote.add(product.id).await?;
            self.refresh().await?;
            return Ok(true);
        }
        if self.contains(product.id) {
            return Ok(false);
        }
        self.items.push(product.into());
        save_list(self.storage.as_ref(), GUEST_WISHLIST_KEY, &self.items).await?;
        Ok(true)
    }

    pub async fn remove(&mut self, product_id: Uuid) -> ClientResult<()> {
        if let SessionMode::Authenticated(remote) = &self.mode {
            remote.remove(product_id).await?;
            return self.refresh().await;
        }
        self.items.retain(|i| i.product_id != product_id);
        save_list(self.storage.as_ref(), GUEST_WISHLIST_KEY, &self.items).await
    }

    /// Adds every guest item to the remote wishlist, ignoring per-item
    /// errors such as duplicates, then drops the guest copy.
    pub async fn login(&mut self, remote: Arc<dyn RemoteWishlist>) -> ClientResult<()> {
        let guest_items: Vec<WishlistItem> =
            load_list(self.storage.as_ref(), GUEST_WISHLIST_KEY).await?;
        for item in &guest_items {
            if let Err(err) = remote.add(item.product_id).await {
                debug!(product_id = %item.product_id, error = %err, "Skipping wishlist item");
            }
        }

        self.storage.remove(GUEST_WISHLIST_KEY).await?;
        self.mode = SessionMode::Authenticated(remote);
        info!(synced = guest_items.len(), "Guest wishlist synced");
        self.refresh().await
    }

    pub fn logout(&mut self) {
        self.mode = SessionMode::Guest;
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{errors::ClientError, storage::MemoryGuestStorage};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeRemote {
        ids: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl RemoteWishlist for FakeRemote {
        async fn fetch_wishlist(&self) -> ClientResult<Vec<WishlistItem>> {
            Ok(self
                .ids
                .lock()
                .await
                .iter()
                .map(|id| WishlistItem {
                    product_id: *id,
                    name: "remote".into(),
                    image: None,
                    price: dec!(1),
                })
                .collect())
        }

        async fn add(&self, product_id: Uuid) -> ClientResult<()> {
            let mut ids = self.ids.lock().await;
            if ids.contains(&product_id) {
                return Err(ClientError::Api {
                    status: 400,
                    message: "Product already in wishlist".into(),
                });
            }
            ids.push(product_id);
            Ok(())
        }

        async fn remove(&self, product_id: Uuid) -> ClientResult<()> {
            self.ids.lock().await.retain(|id| *id != product_id);
            Ok(())
        }
    }

    fn product() -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            name: "Sneakers".into(),
            image: None,
            price: dec!(80),
        }
    }

    #[tokio::test]
    async fn guest_duplicates_are_ignored() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut list = WishlistStore::guest(storage.clone()).await.unwrap();
        let p = product();

        assert!(list.add(p.clone()).await.unwrap());
        assert!(!list.add(p.clone()).await.unwrap());
        assert!(list.contains(p.id));

        let reopened = WishlistStore::guest(storage).await.unwrap();
        assert_eq!(reopened.items().len(), 1);
    }

    #[tokio::test]
    async fn login_merges_and_ignores_duplicates() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut list = WishlistStore::guest(storage.clone()).await.unwrap();
        let shared = product();
        let guest_only = product();
        list.add(shared.clone()).await.unwrap();
        list.add(guest_only.clone()).await.unwrap();

        let remote = Arc::new(FakeRemote::default());
        remote.add(shared.id).await.unwrap();

        list.login(remote).await.unwrap();
        assert_eq!(list.items().len(), 2);
        assert!(list.contains(guest_only.id));
        assert!(storage.load(GUEST_WISHLIST_KEY).await.unwrap().is_none());

        list.remove(shared.id).await.unwrap();
        assert!(!list.contains(shared.id));

        list.logout();
        assert!(list.items().is_empty());
    }
}
