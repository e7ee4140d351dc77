use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::errors::{ClientError, ClientResult};
use super::remote::RemoteCart;
use super::storage::{load_list, save_list, GuestStorage, GUEST_CART_KEY};
use super::{AppliedCoupon, CartItem, ProductSnapshot, SessionMode};
use crate::services::pricing::{price_cart, PriceLine, PricedCart};

/// Shopping cart with a single mutation interface for guests and signed-in
/// users.
pub struct CartStore {
    storage: Arc<dyn GuestStorage>,
    mode: SessionMode<dyn RemoteCart>,
    items: Vec<CartItem>,
    coupon: Option<AppliedCoupon>,
    coupon_applied: bool,
}

impl CartStore {
    /// Starts in guest mode with whatever cart the device has stored.
    pub async fn guest(storage: Arc<dyn GuestStorage>) -> ClientResult<Self> {
        let items = load_list(storage.as_ref(), GUEST_CART_KEY).await?;
        Ok(Self {
            storage,
            mode: SessionMode::Guest,
            items,
            coupon: None,
            coupon_applied: false,
        })
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    pub fn is_coupon_applied(&self) -> bool {
        self.coupon_applied
    }

    pub fn is_authenticated(&self) -> bool {
        self.mode.is_authenticated()
    }

    /// Subtotal and total, with the applied coupon's discount if any.
    pub fn totals(&self) -> PricedCart {
        let lines: Vec<PriceLine> = self
            .items
            .iter()
            .map(|item| PriceLine::new(item.price, item.quantity))
            .collect();
        let discount = self
            .coupon
            .as_ref()
            .filter(|_| self.coupon_applied)
            .map(|c| Decimal::from(c.discount_percentage));
        price_cart(&lines, discount)
    }

    async fn persist_guest(&self) -> ClientResult<()> {
        save_list(self.storage.as_ref(), GUEST_CART_KEY, &self.items).await
    }

    /// Reloads the cart from its source of truth.
    pub async fn refresh(&mut self) -> ClientResult<()> {
        self.items = match &self.mode {
            SessionMode::Guest => load_list(self.storage.as_ref(), GUEST_CART_KEY).await?,
            SessionMode::Authenticated(remote) => remote.fetch_cart().await?,
        };
        Ok(())
    }

    fn add_local(&mut self, product: ProductSnapshot) {
        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => existing.quantity += 1,
            None => self.items.push(CartItem::from_snapshot(product, 1)),
        }
    }

    /// Adds one unit of `product`.
    pub async fn add(&mut self, product: ProductSnapshot) -> ClientResult<()> {
        if let SessionMode::Authenticated(remote) = &self.mode {
            remote.add_item(product.id).await?;
            self.add_local(product);
            return Ok(());
        }
        self.add_local(product);
        self.persist_guest().await
    }

    pub async fn remove(&mut self, product_id: Uuid) -> ClientResult<()> {
        if let SessionMode::Authenticated(remote) = &self.mode {
            remote.remove_item(product_id).await?;
            self.items.retain(|i| i.product_id != product_id);
            return Ok(());
        }
        self.items.retain(|i| i.product_id != product_id);
        self.persist_guest().await
    }

    /// Sets an exact quantity; zero removes the item.
    pub async fn update_quantity(&mut self, product_id: Uuid, quantity: u32) -> ClientResult<()> {
        if quantity == 0 {
            return self.remove(product_id).await;
        }
        if let SessionMode::Authenticated(remote) = &self.mode {
            remote.set_quantity(product_id, quantity).await?;
        }
        for item in self.items.iter_mut().filter(|i| i.product_id == product_id) {
            item.quantity = quantity;
        }
        if !self.is_authenticated() {
            self.persist_guest().await?;
        }
        Ok(())
    }

    /// Empties the in-memory cart and forgets the coupon. Used after a
    /// completed purchase; the server-side cart is left to the API.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon = None;
        self.coupon_applied = false;
    }

    /// Loads the coupon the signed-in user holds, without applying it.
    pub async fn load_coupon(&mut self) -> ClientResult<Option<&AppliedCoupon>> {
        let SessionMode::Authenticated(remote) = &self.mode else {
            return Ok(None);
        };
        self.coupon = remote.current_coupon().await?;
        Ok(self.coupon.as_ref())
    }

    pub async fn apply_coupon(&mut self, code: &str) -> ClientResult<&AppliedCoupon> {
        let SessionMode::Authenticated(remote) = &self.mode else {
            return Err(ClientError::NotAuthenticated);
        };
        let coupon = remote.validate_coupon(code.trim()).await?;
        self.coupon_applied = true;
        Ok(self.coupon.insert(coupon))
    }

    pub fn remove_coupon(&mut self) {
        self.coupon = None;
        self.coupon_applied = false;
    }

    /// Switches to authenticated mode and replays the guest cart. Each item
    /// is added and then set to its exact guest quantity so that a line
    /// already on the server ends up with the guest quantity rather than
    /// the sum. Failures for single items are logged and skipped.
    pub async fn login(&mut self, remote: Arc<dyn RemoteCart>) -> ClientResult<()> {
        let guest_items: Vec<CartItem> = load_list(self.storage.as_ref(), GUEST_CART_KEY).await?;

        let syncs = guest_items.iter().map(|item| {
            let remote = remote.clone();
            async move {
                let result = async {
                    remote.add_item(item.product_id).await?;
                    remote.set_quantity(item.product_id, item.quantity).await
                }
                .await;
                if let Err(err) = result {
                    warn!(product_id = %item.product_id, error = %err, "Failed to sync cart item");
                }
            }
        });
        join_all(syncs).await;

        self.storage.remove(GUEST_CART_KEY).await?;
        self.mode = SessionMode::Authenticated(remote);
        info!(synced = guest_items.len(), "Guest cart synced");
        self.refresh().await
    }

    /// Back to an empty guest cart. Nothing is copied from the server.
    pub fn logout(&mut self) {
        self.mode = SessionMode::Guest;
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryGuestStorage;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Server cart with the API's increment-on-add semantics
    #[derive(Default)]
    struct FakeRemote {
        lines: Mutex<HashMap<Uuid, u32>>,
        coupon: Option<AppliedCoupon>,
    }

    #[async_trait]
    impl RemoteCart for FakeRemote {
        async fn fetch_cart(&self) -> ClientResult<Vec<CartItem>> {
            Ok(self
                .lines
                .lock()
                .await
                .iter()
                .map(|(id, qty)| CartItem {
                    product_id: *id,
                    name: "remote".into(),
                    image: None,
                    price: dec!(10),
                    quantity: *qty,
                })
                .collect())
        }

        async fn add_item(&self, product_id: Uuid) -> ClientResult<()> {
            *self.lines.lock().await.entry(product_id).or_insert(0) += 1;
            Ok(())
        }

        async fn set_quantity(&self, product_id: Uuid, quantity: u32) -> ClientResult<()> {
            self.lines.lock().await.insert(product_id, quantity);
            Ok(())
        }

        async fn remove_item(&self, product_id: Uuid) -> ClientResult<()> {
            self.lines.lock().await.remove(&product_id);
            Ok(())
        }

        async fn current_coupon(&self) -> ClientResult<Option<AppliedCoupon>> {
            Ok(self.coupon.clone())
        }

        async fn validate_coupon(&self, code: &str) -> ClientResult<AppliedCoupon> {
            self.coupon
                .clone()
                .filter(|c| c.code == code)
                .ok_or(ClientError::Api {
                    status: 404,
                    message: "Coupon not found".into(),
                })
        }
    }

    fn product(price: Decimal) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            name: "Tee".into(),
            image: None,
            price,
        }
    }

    #[tokio::test]
    async fn guest_changes_are_persisted() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut cart = CartStore::guest(storage.clone()).await.unwrap();
        let tee = product(dec!(20));

        cart.add(tee.clone()).await.unwrap();
        cart.add(tee.clone()).await.unwrap();
        assert_eq!(cart.items()[0].quantity, 2);

        let reopened = CartStore::guest(storage).await.unwrap();
        assert_eq!(reopened.items(), cart.items());
        assert_eq!(reopened.totals().subtotal, dec!(40));
    }

    #[tokio::test]
    async fn zero_quantity_removes() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut cart = CartStore::guest(storage).await.unwrap();
        let tee = product(dec!(20));
        cart.add(tee.clone()).await.unwrap();

        cart.update_quantity(tee.id, 0).await.unwrap();
        assert!(cart.items().is_empty());
    }

    #[tokio::test]
    async fn login_sync_sets_exact_quantity() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut cart = CartStore::guest(storage.clone()).await.unwrap();
        let tee = product(dec!(20));
        cart.add(tee.clone()).await.unwrap();
        cart.add(tee.clone()).await.unwrap();

        let remote = Arc::new(FakeRemote::default());
        // Already on the server from another device
        remote.add_item(tee.id).await.unwrap();

        cart.login(remote.clone()).await.unwrap();

        assert!(cart.is_authenticated());
        assert_eq!(remote.lines.lock().await.get(&tee.id), Some(&2));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
        assert!(storage.load(GUEST_CART_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_leaves_an_empty_guest_cart() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut cart = CartStore::guest(storage).await.unwrap();
        cart.login(Arc::new(FakeRemote::default())).await.unwrap();
        cart.add(product(dec!(5))).await.unwrap();

        cart.logout();
        assert!(!cart.is_authenticated());
        assert!(cart.items().is_empty());
    }

    #[tokio::test]
    async fn applied_coupon_discounts_the_total() {
        let storage: Arc<dyn GuestStorage> = Arc::new(MemoryGuestStorage::new());
        let mut cart = CartStore::guest(storage).await.unwrap();
        assert!(matches!(
            cart.apply_coupon("GIFT1").await,
            Err(ClientError::NotAuthenticated)
        ));

        let remote = Arc::new(FakeRemote {
            coupon: Some(AppliedCoupon {
                code: "GIFT1".into(),
                discount_percentage: 10,
            }),
            ..Default::default()
        });
        cart.login(remote).await.unwrap();
        cart.add(product(dec!(50))).await.unwrap();

        cart.load_coupon().await.unwrap();
        assert_eq!(cart.totals().total, dec!(50));

        cart.apply_coupon("GIFT1").await.unwrap();
        let totals = cart.totals();
        assert_eq!(totals.subtotal, dec!(50));
        assert_eq!(totals.total, dec!(45));

        cart.remove_coupon();
        assert_eq!(cart.totals().total, dec!(50));
    }
}
