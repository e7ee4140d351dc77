use crate::{
    entities::{product, wishlist, wishlist_item},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Product fields shown on a wishlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub category: String,
    pub average_rating: f64,
}

impl From<product::Model> for WishlistProduct {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            image: p.image,
            category: p.category,
            average_rating: p.average_rating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub product: WishlistProduct,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_wishlist<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<wishlist::Model>, ServiceError> {
        Ok(wishlist::Entity::find()
            .filter(wishlist::Column::UserId.eq(user_id))
            .one(conn)
            .await?)
    }

    async fn get_or_create(&self, user_id: Uuid) -> Result<wishlist::Model, ServiceError> {
        if let Some(existing) = Self::find_wishlist(&*self.db, user_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let created = wishlist::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        Ok(created)
    }

    /// The user's wishlist, oldest entry first. Creates an empty one on first use.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, ServiceError> {
        let list = self.get_or_create(user_id).await?;
        let rows = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .order_by_asc(wishlist_item::Column::AddedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, product)| {
                product.map(|p| WishlistEntry {
                    product: p.into(),
                    added_at: item.added_at,
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn add(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        if product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound("Product not found".to_string()));
        }

        let list = self.get_or_create(user_id).await?;
        let already = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        if already > 0 {
            return Err(ServiceError::InvalidOperation(
                "Product already in wishlist".to_string(),
            ));
        }

        wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            wishlist_id: Set(list.id),
            product_id: Set(product_id),
            added_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::WishlistItemAdded {
                user_id,
                product_id,
            })
            .await;
        info!(%user_id, %product_id, "Added product to wishlist");
        Ok(())
    }

    /// Removing a product that is not listed is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let list = Self::find_wishlist(&*self.db, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Wishlist not found".to_string()))?;

        let removed = wishlist_item::Entity::delete_many()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if removed.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::WishlistItemRemoved {
                    user_id,
                    product_id,
                })
                .await;
        }
        Ok(())
    }

    pub async fn contains(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, ServiceError> {
        let Some(list) = Self::find_wishlist(&*self.db, user_id).await? else {
            return Ok(false);
        };
        let count = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }
}
