/*!
 * # Storefront client
 *
 * Cart and wishlist state for a storefront front end. Each store is either in
 * guest mode, where every change is written to device-local
 * [`GuestStorage`], or authenticated, where changes go to the API and the
 * local list is only a cache. Logging in replays the guest list against the
 * API and then discards it. Logging out does not sync anything back.
 */

pub mod cart_store;
pub mod errors;
pub mod remote;
pub mod storage;
pub mod wishlist_store;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{cart::CartLine, wishlist::WishlistEntry};

pub use cart_store::CartStore;
pub use errors::{ClientError, ClientResult};
pub use remote::{HttpStorefrontClient, RemoteCart, RemoteWishlist};
pub use storage::{FileGuestStorage, GuestStorage, MemoryGuestStorage};
pub use wishlist_store::WishlistStore;

/// Who the store is acting for
pub enum SessionMode<R: ?Sized> {
    Guest,
    Authenticated(Arc<R>),
}

impl<R: ?Sized> SessionMode<R> {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionMode::Authenticated(_))
    }
}

/// Product details the front end already holds when adding to a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Price when the item was added
    pub price: Decimal,
    pub quantity: u32,
}

impl CartItem {
    fn from_snapshot(product: ProductSnapshot, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name,
            image: product.image,
            price: product.price,
            quantity,
        }
    }
}

impl From<CartLine> for CartItem {
    fn from(line: CartLine) -> Self {
        Self {
            product_id: line.product_id,
            name: line.name,
            image: line.image,
            price: line.unit_price,
            quantity: line.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub product_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Decimal,
}

impl From<ProductSnapshot> for WishlistItem {
    fn from(product: ProductSnapshot) -> Self {
        Self {
            product_id: product.id,
            name: product.name,
            image: product.image,
            price: product.price,
        }
    }
}

impl From<WishlistEntry> for WishlistItem {
    fn from(entry: WishlistEntry) -> Self {
        Self {
            product_id: entry.product.id,
            name: entry.product.name,
            image: entry.product.image,
            price: entry.product.price,
        }
    }
}

/// Coupon the shopper holds or has applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_percentage: i32,
}
