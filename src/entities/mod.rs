// Catalog
pub mod product;
pub mod review;

// Checkout
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod pending_checkout;

// Per-user state
pub mod address;
pub mod cart_item;
pub mod wishlist;
pub mod wishlist_item;
