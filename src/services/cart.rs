use crate::{
    entities::{cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{price_cart, PriceLine},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub const MAX_LINE_QUANTITY: i32 = 1000;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SetQuantityInput {
    /// Zero removes the line
    #[validate(range(min = 0, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RemoveFromCartInput {
    /// Absent clears the whole cart
    #[serde(default)]
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
}

/// Server-side cart for authenticated users, one line per product
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        let items: Vec<CartLine> = rows
            .into_iter()
            .filter_map(|(item, product)| {
                let product = product?;
                let line = PriceLine::new(item.unit_price, item.quantity.max(0) as u32);
                Some(CartLine {
                    product_id: product.id,
                    name: product.name,
                    image: product.image,
                    unit_price: item.unit_price,
                    quantity: line.quantity,
                    line_total: line.line_total(),
                })
            })
            .collect();

        let lines: Vec<PriceLine> = items
            .iter()
            .map(|l| PriceLine::new(l.unit_price, l.quantity))
            .collect();
        Ok(CartView {
            subtotal: price_cart(&lines, None).subtotal,
            items,
        })
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        Ok(cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }

    /// Adds to an existing line's quantity, or creates the line at the
    /// current catalog price.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add(&self, user_id: Uuid, input: AddToCartInput) -> Result<CartView, ServiceError> {
        input.validate()?;

        match self.find_line(user_id, input.product_id).await? {
            Some(existing) => {
                let quantity = (existing.quantity + input.quantity).min(MAX_LINE_QUANTITY);
                let mut active: cart_item::ActiveModel = existing.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            None => {
                let product = product::Entity::find_by_id(input.product_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product.id),
                    quantity: Set(input.quantity),
                    unit_price: Set(product.price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.event_sender.send_or_log(Event::CartUpdated(user_id)).await;
        self.get(user_id).await
    }

    #[instrument(skip(self, input))]
    pub async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: SetQuantityInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let existing = self
            .find_line(user_id, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not in cart".to_string()))?;

        if input.quantity == 0 {
            cart_item::Entity::delete_by_id(existing.id)
                .exec(&*self.db)
                .await?;
        } else {
            let mut active: cart_item::ActiveModel = existing.into();
            active.quantity = Set(input.quantity);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }

        self.event_sender.send_or_log(Event::CartUpdated(user_id)).await;
        self.get(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<CartView, ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        self.event_sender.send_or_log(Event::CartUpdated(user_id)).await;
        self.get(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let removed = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        self.event_sender.send_or_log(Event::CartCleared(user_id)).await;
        info!(%user_id, lines = removed.rows_affected, "Cart cleared");
        Ok(CartView {
            items: Vec::new(),
            subtotal: Decimal::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{event_sender, memory_db, seed_product};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn adding_twice_increments_quantity() {
        let db = memory_db().await;
        let svc = CartService::new(db.clone(), event_sender());
        let tee = seed_product(&db, "Tee", dec!(20), "t-shirts").await;
        let user = Uuid::new_v4();

        svc.add(user, AddToCartInput { product_id: tee.id, quantity: 1 })
            .await
            .unwrap();
        let cart = svc
            .add(user, AddToCartInput { product_id: tee.id, quantity: 2 })
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.subtotal, dec!(60));
    }

    #[tokio::test]
    async fn set_quantity_and_zero_removes() {
        let db = memory_db().await;
        let svc = CartService::new(db.clone(), event_sender());
        let tee = seed_product(&db, "Tee", dec!(20), "t-shirts").await;
        let user = Uuid::new_v4();
        svc.add(user, AddToCartInput { product_id: tee.id, quantity: 1 })
            .await
            .unwrap();

        let cart = svc
            .set_quantity(user, tee.id, SetQuantityInput { quantity: 5 })
            .await
            .unwrap();
        assert_eq!(cart.items[0].line_total, dec!(100));

        let cart = svc
            .set_quantity(user, tee.id, SetQuantityInput { quantity: 0 })
            .await
            .unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn missing_product_or_line_is_not_found() {
        let svc = CartService::new(memory_db().await, event_sender());
        let user = Uuid::new_v4();
        assert_matches!(
            svc.add(
                user,
                AddToCartInput {
                    product_id: Uuid::new_v4(),
                    quantity: 1
                }
            )
            .await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            svc.set_quantity(user, Uuid::new_v4(), SetQuantityInput { quantity: 1 })
                .await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let db = memory_db().await;
        let svc = CartService::new(db.clone(), event_sender());
        let tee = seed_product(&db, "Tee", dec!(20), "t-shirts").await;
        let cap = seed_product(&db, "Cap", dec!(15), "hats").await;
        let user = Uuid::new_v4();
        for id in [tee.id, cap.id] {
            svc.add(user, AddToCartInput { product_id: id, quantity: 1 })
                .await
                .unwrap();
        }

        let cart = svc.remove(user, tee.id).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product_id, cap.id);

        svc.clear(user).await.unwrap();
        assert!(svc.get(user).await.unwrap().items.is_empty());
    }
}
