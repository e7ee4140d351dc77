//! Checkouts handed to a provider but not yet paid.
//!
//! The row is written after the provider accepted the session or order and
//! carries exactly what was submitted. Confirmation, webhook and capture
//! paths read it back, so the recorded order never depends on what the
//! client resends or on what survives in provider metadata.

use crate::{
    entities::pending_checkout,
    errors::ServiceError,
    services::{orders::PaymentReference, payments::OrderedProduct},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCheckout {
    pub payment: PaymentReference,
    pub user_id: Uuid,
    pub products: Vec<OrderedProduct>,
    /// Coupon applied when the checkout was created
    pub coupon_code: Option<String>,
    pub subtotal: Decimal,
    /// Amount submitted to the provider
    pub total_amount: Decimal,
    pub shipping_address_id: Option<Uuid>,
}

impl PendingCheckout {
    fn from_model(
        payment: PaymentReference,
        model: pending_checkout::Model,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            payment,
            user_id: model.user_id,
            products: serde_json::from_value(model.products)?,
            coupon_code: model.coupon_code,
            subtotal: model.subtotal,
            total_amount: model.total_amount,
            shipping_address_id: model.shipping_address_id,
        })
    }
}

#[derive(Clone)]
pub struct PendingCheckouts {
    db: Arc<DatabaseConnection>,
}

impl PendingCheckouts {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores the checkout, replacing any earlier row for the same provider id.
    pub async fn record(&self, checkout: &PendingCheckout) -> Result<(), ServiceError> {
        let now = Utc::now();
        let row = pending_checkout::ActiveModel {
            provider: Set(checkout.payment.provider().to_string()),
            reference: Set(checkout.payment.reference().to_string()),
            user_id: Set(checkout.user_id),
            products: Set(serde_json::to_value(&checkout.products)?),
            coupon_code: Set(checkout.coupon_code.clone()),
            subtotal: Set(checkout.subtotal),
            total_amount: Set(checkout.total_amount),
            shipping_address_id: Set(checkout.shipping_address_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        pending_checkout::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    pending_checkout::Column::Provider,
                    pending_checkout::Column::Reference,
                ])
                .update_columns([
                    pending_checkout::Column::UserId,
                    pending_checkout::Column::Products,
                    pending_checkout::Column::CouponCode,
                    pending_checkout::Column::Subtotal,
                    pending_checkout::Column::TotalAmount,
                    pending_checkout::Column::ShippingAddressId,
                    pending_checkout::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        debug!(
            provider = checkout.payment.provider(),
            reference = checkout.payment.reference(),
            "Recorded pending checkout"
        );
        Ok(())
    }

    pub async fn find(
        &self,
        payment: &PaymentReference,
    ) -> Result<Option<PendingCheckout>, ServiceError> {
        let key = (
            payment.provider().to_string(),
            payment.reference().to_string(),
        );
        match pending_checkout::Entity::find_by_id(key).one(&*self.db).await? {
            Some(model) => Ok(Some(PendingCheckout::from_model(payment.clone(), model)?)),
            None => Ok(None),
        }
    }
}
