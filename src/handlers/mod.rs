pub mod addresses;
pub mod cart;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod search;
pub mod wishlist;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    services::{
        addresses::AddressService,
        cart::CartService,
        checkout::CheckoutService,
        coupons::CouponService,
        orders::OrderService,
        payments::{PaypalClient, PaypalGateway, StripeClient, StripeGateway},
        products::ProductService,
        reviews::ReviewService,
        search::SearchService,
        wishlist::WishlistService,
    },
};
use std::sync::Arc;
use std::time::Duration;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub orders: Arc<OrderService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
    pub reviews: Arc<ReviewService>,
    pub wishlist: Arc<WishlistService>,
    pub addresses: Arc<AddressService>,
    pub search: Arc<SearchService>,
    pub cart: Arc<CartService>,
}

impl AppServices {
    /// Wires every service over the shared pool with the given provider gateways.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        stripe: Arc<dyn StripeGateway>,
        paypal: Arc<dyn PaypalGateway>,
    ) -> Self {
        let products = ProductService::new(db_pool.clone(), event_sender.clone());
        let orders = OrderService::new(db_pool.clone(), event_sender.clone());
        let coupons = CouponService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.coupon.clone(),
        );
        let checkout = CheckoutService::new(
            db_pool.clone(),
            config,
            products.clone(),
            coupons.clone(),
            orders.clone(),
            stripe,
            paypal,
        );

        Self {
            products: Arc::new(products),
            orders: Arc::new(orders),
            coupons: Arc::new(coupons),
            checkout: Arc::new(checkout),
            reviews: Arc::new(ReviewService::new(db_pool.clone(), event_sender.clone())),
            wishlist: Arc::new(WishlistService::new(db_pool.clone(), event_sender.clone())),
            addresses: Arc::new(AddressService::new(db_pool.clone())),
            search: Arc::new(SearchService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool, event_sender)),
        }
    }

    /// Same as [`AppServices::new`] with the reqwest-backed provider clients
    /// built from configuration.
    pub fn from_config(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Result<Self, ServiceError> {
        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let stripe: Arc<dyn StripeGateway> = Arc::new(StripeClient::new(&config.stripe, timeout)?);
        let paypal: Arc<dyn PaypalGateway> = Arc::new(PaypalClient::new(&config.paypal, timeout)?);
        Ok(Self::new(db_pool, event_sender, config, stripe, paypal))
    }
}
