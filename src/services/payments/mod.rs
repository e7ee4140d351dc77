//! Payment provider seams.
//!
//! `StripeGateway` and `PaypalGateway` are the only way the checkout service
//! reaches a provider; the reqwest clients in [`stripe`] and [`paypal`] are the
//! production implementations and tests point them at a mock server.

pub mod paypal;
pub mod pending;
pub mod session;
pub mod stripe;
pub mod webhook;

use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

pub use paypal::PaypalClient;
pub use session::{
    build_paypal_order, build_stripe_session, CheckoutLine, OrderedProduct, PaypalOrderDraft,
    PaypalOrderRequest, StripeDiscount, StripeSessionMetadata, StripeSessionRequest,
};
pub use stripe::StripeClient;

/// Session returned by `POST /v1/checkout/sessions`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Checkout session as retrieved from Stripe
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StripeSession {
    pub id: String,
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl StripeSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// Outcome of capturing a PayPal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaypalCapture {
    pub id: String,
    pub status: String,
    /// Captured amount as reported by PayPal
    pub amount: Option<Decimal>,
}

impl PaypalCapture {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &StripeSessionRequest,
    ) -> Result<CreatedSession, ServiceError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<StripeSession, ServiceError>;

    /// Creates a one-off percentage coupon and returns its id
    async fn create_coupon(&self, percent_off: Decimal) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait PaypalGateway: Send + Sync {
    /// Creates an order and returns its id
    async fn create_order(&self, request: &PaypalOrderRequest) -> Result<String, ServiceError>;

    async fn capture_order(&self, order_id: &str) -> Result<PaypalCapture, ServiceError>;
}

pub(crate) fn provider_error(provider: &'static str, err: impl std::fmt::Display) -> ServiceError {
    metrics::counter!("storefront_provider_failures_total", 1, "provider" => provider);
    tracing::error!(provider, error = %err, "payment provider call failed");
    ServiceError::ExternalServiceError(format!("{}: {}", provider, err))
}
