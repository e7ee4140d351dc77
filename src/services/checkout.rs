//! Checkout orchestration for both payment providers.
//!
//! Creating a session or order re-prices the requested products from the
//! catalog, applies the caller's coupon (if it is active) and, once the
//! provider accepted the request, records the submitted checkout and issues a
//! coupon for the next purchase when the undiscounted subtotal reaches the
//! threshold. Confirmation paths only persist an order after the provider
//! reports the payment as completed, and they take the products, coupon and
//! fallback total from the recorded checkout.

use crate::{
    config::AppConfig,
    entities::{address, coupon, order::ShippingAddress},
    errors::ServiceError,
    services::{
        coupons::CouponService,
        orders::{FinalizeOrder, Finalized, OrderService, PaymentReference},
        payments::{
            build_paypal_order, build_stripe_session,
            pending::{PendingCheckout, PendingCheckouts},
            session::EMPTY_PRODUCTS_MESSAGE,
            webhook::verify_stripe_signature,
            CheckoutLine, OrderedProduct, PaypalGateway, StripeDiscount, StripeGateway,
            StripeSession, StripeSessionMetadata,
        },
        pricing::from_minor_units,
        products::ProductService,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub const PAYMENT_SUCCESS_MESSAGE: &str =
    "Payment successful, order created, and coupon deactivated if used.";
const CHECKOUT_COMPLETED_EVENT: &str = "checkout.session.completed";

/// Product reference sent by the client. Any name or price it carries is
/// ignored; prices always come from the catalog.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CheckoutProduct {
    #[serde(alias = "_id")]
    pub id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStripeSessionRequest {
    #[serde(default)]
    #[validate]
    pub products: Vec<CheckoutProduct>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmStripeRequest {
    #[validate(length(min = 1, max = 255))]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaypalOrderRequest {
    #[serde(default)]
    #[validate]
    pub products: Vec<CheckoutProduct>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
}

/// Capture request. Products and coupon come from the checkout recorded when
/// the PayPal order was created; anything else in the body is ignored.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CapturePaypalRequest {
    #[validate(length(min = 1, max = 255))]
    pub order_id: String,
    /// Overrides the address given when the order was created
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub url: Option<String>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaypalOrderResponse {
    pub id: String,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentConfirmation {
    pub success: bool,
    pub message: String,
    pub order_id: Uuid,
}

impl From<&Finalized> for PaymentConfirmation {
    fn from(finalized: &Finalized) -> Self {
        Self {
            success: true,
            message: PAYMENT_SUCCESS_MESSAGE.to_string(),
            order_id: finalized.order.order.id,
        }
    }
}

/// What the webhook endpoint did with a delivery
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Finalized(Uuid),
    Unpaid,
    Ignored(String),
    /// Paid session this store never created
    UnknownSession(String),
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: serde_json::Value,
}

fn coupon_code(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|c| !c.is_empty())
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    products: ProductService,
    coupons: CouponService,
    orders: OrderService,
    pending: PendingCheckouts,
    stripe: Arc<dyn StripeGateway>,
    paypal: Arc<dyn PaypalGateway>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        products: ProductService,
        coupons: CouponService,
        orders: OrderService,
        stripe: Arc<dyn StripeGateway>,
        paypal: Arc<dyn PaypalGateway>,
    ) -> Self {
        Self {
            pending: PendingCheckouts::new(db.clone()),
            db,
            config,
            products,
            coupons,
            orders,
            stripe,
            paypal,
        }
    }

    fn order_currency(&self) -> String {
        self.config.currency.to_ascii_uppercase()
    }

    /// Re-prices the requested products from the catalog.
    async fn resolve_lines(
        &self,
        requested: &[CheckoutProduct],
    ) -> Result<Vec<CheckoutLine>, ServiceError> {
        if requested.is_empty() || requested.iter().any(|p| p.quantity == 0) {
            return Err(ServiceError::InvalidInput(EMPTY_PRODUCTS_MESSAGE.to_string()));
        }

        let ids: Vec<Uuid> = requested.iter().map(|p| p.id).collect();
        let catalog = self.products.get_many(&ids).await?;

        requested
            .iter()
            .map(|p| {
                let product = catalog.get(&p.id).ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", p.id))
                })?;
                Ok(CheckoutLine {
                    product_id: product.id,
                    name: product.name.clone(),
                    image: product.image.clone(),
                    unit_price: product.price,
                    quantity: p.quantity,
                })
            })
            .collect()
    }

    /// The caller's active coupon for `code`. Unknown or used codes are
    /// ignored and the checkout proceeds at full price.
    async fn usable_coupon(
        &self,
        user_id: Uuid,
        code: Option<&str>,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let Some(code) = coupon_code(code) else {
            return Ok(None);
        };
        let found = self.coupons.find_active(user_id, code).await?;
        if found.is_none() {
            debug!(%user_id, code, "coupon not usable, continuing without discount");
        }
        Ok(found)
    }

    async fn owned_address(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<Option<address::Model>, ServiceError> {
        Ok(address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    async fn ensure_owned_address(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(address_id) = address_id {
            if self.owned_address(user_id, address_id).await?.is_none() {
                return Err(ServiceError::NotFound("Address not found".to_string()));
            }
        }
        Ok(())
    }

    async fn shipping_snapshot(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<Option<ShippingAddress>, ServiceError> {
        match address_id {
            Some(id) => Ok(self
                .owned_address(user_id, id)
                .await?
                .map(|a| a.to_shipping_address())),
            None => Ok(None),
        }
    }

    /// Provider coupon for a store coupon, created the first time it is used.
    async fn stripe_discount(&self, coupon: coupon::Model) -> Result<StripeDiscount, ServiceError> {
        let percent = Decimal::from(coupon.discount_percentage);
        let coupon_id = match &coupon.stripe_coupon_id {
            Some(id) => id.clone(),
            None => {
                let id = self.stripe.create_coupon(percent).await?;
                self.coupons.attach_stripe_coupon(coupon, id.clone()).await?;
                id
            }
        };
        Ok(StripeDiscount { percent, coupon_id })
    }

    #[instrument(skip(self, request), fields(products = request.products.len()))]
    pub async fn create_stripe_session(
        &self,
        user_id: Uuid,
        request: CreateStripeSessionRequest,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        let lines = self.resolve_lines(&request.products).await?;
        self.ensure_owned_address(user_id, request.shipping_address_id)
            .await?;

        let coupon = self
            .usable_coupon(user_id, request.coupon_code.as_deref())
            .await?;
        let applied_code = coupon.as_ref().map(|c| c.code.clone());
        let discount = match coupon {
            Some(coupon) => Some(self.stripe_discount(coupon).await?),
            None => None,
        };

        let metadata = StripeSessionMetadata {
            user_id,
            coupon_code: applied_code.clone(),
            shipping_address_id: request.shipping_address_id,
        };
        let session_request = build_stripe_session(
            &lines,
            &self.config.stripe_currency(),
            discount,
            &self.config.purchase_success_url(),
            &self.config.purchase_cancel_url(),
            metadata,
        )?;

        let session = self.stripe.create_checkout_session(&session_request).await?;

        let subtotal = from_minor_units(session_request.subtotal_cents);
        let total_amount = from_minor_units(session_request.expected_total_cents);
        self.pending
            .record(&PendingCheckout {
                payment: PaymentReference::StripeSession(session.id.clone()),
                user_id,
                products: lines.iter().map(OrderedProduct::from).collect(),
                coupon_code: applied_code,
                subtotal,
                total_amount,
                shipping_address_id: request.shipping_address_id,
            })
            .await?;
        self.coupons.issue_if_qualifying(user_id, subtotal).await?;

        info!(session_id = %session.id, %subtotal, "Created Stripe checkout session");
        Ok(CheckoutSessionResponse {
            id: session.id,
            url: session.url,
            total_amount,
        })
    }

    #[instrument(skip(self))]
    pub async fn confirm_stripe_payment(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let session = self.stripe.retrieve_checkout_session(session_id).await?;
        if !session.is_paid() {
            return Err(ServiceError::PaymentIncomplete);
        }

        let pending = self
            .pending
            .find(&PaymentReference::StripeSession(session.id.clone()))
            .await?
            .ok_or_else(|| ServiceError::NotFound("Checkout session not found".to_string()))?;
        if pending.user_id != user_id {
            warn!(%user_id, owner = %pending.user_id, "session belongs to another user");
            return Err(ServiceError::Forbidden(
                "Checkout session belongs to another user".to_string(),
            ));
        }

        let finalized = self.finalize_stripe(&session, pending).await?;
        Ok(PaymentConfirmation::from(&finalized))
    }

    async fn finalize_stripe(
        &self,
        session: &StripeSession,
        pending: PendingCheckout,
    ) -> Result<Finalized, ServiceError> {
        let metadata = StripeSessionMetadata::from_json(&session.metadata)?;
        if metadata.user_id != pending.user_id {
            return Err(ServiceError::ExternalServiceError(
                "Session metadata does not match the recorded checkout".to_string(),
            ));
        }

        let charged = session.amount_total.map(from_minor_units);
        self.finalize_pending(pending, charged).await
    }

    /// Persists the order for a recorded checkout. `charged` is the amount the
    /// provider reports; the submitted total stands in when it is missing.
    async fn finalize_pending(
        &self,
        pending: PendingCheckout,
        charged: Option<Decimal>,
    ) -> Result<Finalized, ServiceError> {
        let total_amount = match charged {
            Some(amount) => {
                if amount != pending.total_amount {
                    warn!(
                        %amount,
                        submitted = %pending.total_amount,
                        "Provider charged a different amount than submitted"
                    );
                }
                amount
            }
            None => pending.total_amount,
        };
        let shipping_address = self
            .shipping_snapshot(pending.user_id, pending.shipping_address_id)
            .await?;

        self.orders
            .finalize(FinalizeOrder {
                user_id: pending.user_id,
                payment: pending.payment,
                products: pending.products,
                total_amount,
                currency: self.order_currency(),
                coupon_code: pending.coupon_code,
                shipping_address,
            })
            .await
    }

    /// Handles a Stripe webhook delivery. Deliveries are only accepted with a
    /// valid signature, so an unset webhook secret rejects every delivery.
    #[instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let Some(secret) = self.config.stripe.webhook_secret.as_deref() else {
            warn!("Rejecting Stripe webhook: no webhook secret configured");
            return Err(ServiceError::InvalidInput(
                "Stripe webhook secret is not configured".to_string(),
            ));
        };
        let header = signature.ok_or_else(|| {
            ServiceError::InvalidInput("Missing Stripe-Signature header".to_string())
        })?;
        verify_stripe_signature(
            header,
            payload,
            secret,
            self.config.stripe.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        let event: WebhookEvent = serde_json::from_slice(payload)?;
        if event.event_type != CHECKOUT_COMPLETED_EVENT {
            debug!(event_type = %event.event_type, "ignoring webhook event");
            return Ok(WebhookOutcome::Ignored(event.event_type));
        }

        let session: StripeSession = serde_json::from_value(event.data.object)?;
        if !session.is_paid() {
            return Ok(WebhookOutcome::Unpaid);
        }

        let payment = PaymentReference::StripeSession(session.id.clone());
        let Some(pending) = self.pending.find(&payment).await? else {
            return Ok(WebhookOutcome::UnknownSession(session.id));
        };
        let finalized = self.finalize_stripe(&session, pending).await?;
        Ok(WebhookOutcome::Finalized(finalized.order.order.id))
    }

    #[instrument(skip(self, request), fields(products = request.products.len()))]
    pub async fn create_paypal_order(
        &self,
        user_id: Uuid,
        request: CreatePaypalOrderRequest,
    ) -> Result<PaypalOrderResponse, ServiceError> {
        let lines = self.resolve_lines(&request.products).await?;
        self.ensure_owned_address(user_id, request.shipping_address_id)
            .await?;
        let coupon = self
            .usable_coupon(user_id, request.coupon_code.as_deref())
            .await?;
        let discount = coupon.as_ref().map(|c| Decimal::from(c.discount_percentage));

        let draft = build_paypal_order(
            &lines,
            &self.order_currency(),
            discount,
            &self.config.purchase_success_url(),
            &self.config.purchase_cancel_url(),
        )?;

        let order_id = self.paypal.create_order(&draft.request).await?;
        self.pending
            .record(&PendingCheckout {
                payment: PaymentReference::PaypalOrder(order_id.clone()),
                user_id,
                products: lines.iter().map(OrderedProduct::from).collect(),
                coupon_code: coupon.map(|c| c.code),
                subtotal: draft.subtotal,
                total_amount: draft.total,
                shipping_address_id: request.shipping_address_id,
            })
            .await?;
        self.coupons.issue_if_qualifying(user_id, draft.subtotal).await?;

        info!(%order_id, subtotal = %draft.subtotal, total = %draft.total, "Created PayPal order");
        Ok(PaypalOrderResponse {
            id: order_id,
            total_amount: draft.total,
        })
    }

    /// Captures an approved PayPal order created by the same user.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn capture_paypal_order(
        &self,
        user_id: Uuid,
        request: CapturePaypalRequest,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let payment = PaymentReference::PaypalOrder(request.order_id.clone());
        if let Some(existing) = self.orders.find_by_payment(&payment).await? {
            if existing.order.user_id != user_id {
                return Err(ServiceError::NotFound("Order not found".to_string()));
            }
            return Ok(PaymentConfirmation {
                success: true,
                message: PAYMENT_SUCCESS_MESSAGE.to_string(),
                order_id: existing.order.id,
            });
        }

        let mut pending = self
            .pending
            .find(&payment)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("PayPal order not found".to_string()))?;
        if request.shipping_address_id.is_some() {
            self.ensure_owned_address(user_id, request.shipping_address_id)
                .await?;
            pending.shipping_address_id = request.shipping_address_id;
        }

        let capture = self.paypal.capture_order(&request.order_id).await?;
        if !capture.is_completed() {
            info!(status = %capture.status, "PayPal order not completed");
            return Err(ServiceError::PaymentIncomplete);
        }

        let finalized = self.finalize_pending(pending, capture.amount).await?;
        Ok(PaymentConfirmation::from(&finalized))
    }
}
