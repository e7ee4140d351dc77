use crate::{
    entities::{
        order::{self, OrderStatus, ShippingAddress},
        order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coupons, payments::OrderedProduct},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Provider correlation id of a paid checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentReference {
    StripeSession(String),
    PaypalOrder(String),
}

impl PaymentReference {
    pub fn provider(&self) -> &'static str {
        match self {
            PaymentReference::StripeSession(_) => "stripe",
            PaymentReference::PaypalOrder(_) => "paypal",
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            PaymentReference::StripeSession(id) | PaymentReference::PaypalOrder(id) => id,
        }
    }

    fn filter(&self) -> sea_orm::sea_query::SimpleExpr {
        match self {
            PaymentReference::StripeSession(id) => order::Column::StripeSessionId.eq(id.clone()),
            PaymentReference::PaypalOrder(id) => order::Column::PaypalOrderId.eq(id.clone()),
        }
    }
}

/// Everything needed to persist a paid order
#[derive(Debug, Clone)]
pub struct FinalizeOrder {
    pub user_id: Uuid,
    pub payment: PaymentReference,
    pub products: Vec<OrderedProduct>,
    pub total_amount: Decimal,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

/// Order together with its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Result of finalizing a payment
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub order: OrderWithItems,
    /// False when the provider id had already produced an order
    pub created: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// Order persistence: payment finalization, owner reads and admin status changes
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn load_items<C: ConnectionTrait>(
        conn: &C,
        order: order::Model,
    ) -> Result<OrderWithItems, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(conn)
            .await?;
        Ok(OrderWithItems { order, items })
    }

    async fn lookup_payment<C: ConnectionTrait>(
        conn: &C,
        payment: &PaymentReference,
    ) -> Result<Option<OrderWithItems>, ServiceError> {
        match order::Entity::find()
            .filter(payment.filter())
            .one(conn)
            .await?
        {
            Some(order) => Ok(Some(Self::load_items(conn, order).await?)),
            None => Ok(None),
        }
    }

    /// Order already created for a provider payment, if any.
    pub async fn find_by_payment(
        &self,
        payment: &PaymentReference,
    ) -> Result<Option<OrderWithItems>, ServiceError> {
        Self::lookup_payment(&*self.db, payment).await
    }

    /// Persists a paid order and consumes the coupon it used, in one
    /// transaction. Finalizing the same provider id again returns the
    /// existing order.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, payment = ?input.payment))]
    pub async fn finalize(&self, input: FinalizeOrder) -> Result<Finalized, ServiceError> {
        if let Some(existing) = Self::lookup_payment(&*self.db, &input.payment).await? {
            info!(order_id = %existing.order.id, "Payment already finalized");
            return Ok(Finalized {
                order: existing,
                created: false,
            });
        }

        let txn = self.db.begin().await?;
        match Self::insert_order(&txn, &input).await {
            Ok(order) => {
                txn.commit().await?;
                self.after_create(&order, input.coupon_code.as_deref()).await;
                Ok(Finalized {
                    order,
                    created: true,
                })
            }
            Err(err) => {
                txn.rollback().await?;
                // A concurrent finalization may have won the unique index
                match Self::lookup_payment(&*self.db, &input.payment).await? {
                    Some(existing) => {
                        warn!(order_id = %existing.order.id, "Lost finalization race; returning existing order");
                        Ok(Finalized {
                            order: existing,
                            created: false,
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn insert_order<C: ConnectionTrait>(
        conn: &C,
        input: &FinalizeOrder,
    ) -> Result<OrderWithItems, ServiceError> {
        if let Some(code) = &input.coupon_code {
            coupons::deactivate(conn, input.user_id, code).await?;
        }

        let (stripe_session_id, paypal_order_id) = match &input.payment {
            PaymentReference::StripeSession(id) => (Some(id.clone()), None),
            PaymentReference::PaypalOrder(id) => (None, Some(id.clone())),
        };
        let shipping_address = input
            .shipping_address
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(input.user_id),
            total_amount: Set(input.total_amount),
            currency: Set(input.currency.clone()),
            status: Set(OrderStatus::Pending),
            stripe_session_id: Set(stripe_session_id),
            paypal_order_id: Set(paypal_order_id),
            coupon_code: Set(input.coupon_code.clone()),
            shipping_address: Set(shipping_address),
            tracking_number: Set(None),
            estimated_delivery: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        let mut items = Vec::with_capacity(input.products.len());
        for product in &input.products {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                quantity: Set(product.quantity as i32),
                price: Set(product.price),
            }
            .insert(conn)
            .await?;
            items.push(item);
        }

        Ok(OrderWithItems { order, items })
    }

    async fn after_create(&self, created: &OrderWithItems, coupon_code: Option<&str>) {
        let order = &created.order;
        metrics::counter!("storefront_orders_finalized_total", 1);
        info!(order_id = %order.id, total = %order.total_amount, "Order created");

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id: order.user_id,
                total_amount: order.total_amount,
            })
            .await;
        if let Some(code) = coupon_code {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    user_id: order.user_id,
                    code: code.to_string(),
                })
                .await;
        }
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderWithItems>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            result.push(Self::load_items(&*self.db, order).await?);
        }
        Ok((result, total))
    }

    /// Orders are visible to their owner and to admins only.
    #[instrument(skip(self))]
    pub async fn get_for_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        is_admin: bool,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .filter(|o| is_admin || o.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        Self::load_items(&*self.db, order).await
    }

    #[instrument(skip(self, input), fields(status = ?input.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        input: UpdateOrderStatusInput,
    ) -> Result<OrderWithItems, ServiceError> {
        let existing = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = existing.status;
        if !old_status.can_transition_to(input.status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {:?} to {:?}",
                old_status, input.status
            )));
        }

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(input.status);
        if input.tracking_number.is_some() {
            active.tracking_number = Set(input.tracking_number);
        }
        if input.estimated_delivery.is_some() {
            active.estimated_delivery = Set(input.estimated_delivery);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{:?}", old_status).to_lowercase(),
                new_status: format!("{:?}", updated.status).to_lowercase(),
            })
            .await;

        Self::load_items(&*self.db, updated).await
    }
}
