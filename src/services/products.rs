use crate::{
    entities::product,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_must_not_be_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(url)]
    pub image: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
}

/// Catalog reads and admin creation
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateProductInput) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            image: Set(input.image),
            category: Set(input.category),
            is_featured: Set(input.is_featured),
            average_rating: Set(0.0),
            num_reviews: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(model.id))
            .await;
        info!(product_id = %model.id, "Created product");
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Loads every product in `ids`; any unknown id is a 404.
    pub async fn get_many(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        let found: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        if let Some(missing) = ids.iter().find(|id| !found.contains_key(id)) {
            return Err(ServiceError::NotFound(format!("Product {} not found", missing)));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{event_sender, memory_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn input(name: &str, price: Decimal) -> CreateProductInput {
        CreateProductInput {
            name: name.into(),
            description: "Soft cotton tee".into(),
            price,
            image: None,
            category: "t-shirts".into(),
            is_featured: false,
        }
    }

    #[tokio::test]
    async fn create_starts_with_empty_rating() {
        let svc = ProductService::new(memory_db().await, event_sender());
        let product = svc.create(input("Tee", dec!(25))).await.unwrap();
        assert_eq!(product.average_rating, 0.0);
        assert_eq!(product.num_reviews, 0);
        assert_eq!(svc.get(product.id).await.unwrap().name, "Tee");
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let svc = ProductService::new(memory_db().await, event_sender());
        assert_matches!(
            svc.create(input("Tee", dec!(-1))).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn get_many_reports_missing_ids() {
        let svc = ProductService::new(memory_db().await, event_sender());
        let tee = svc.create(input("Tee", dec!(25))).await.unwrap();

        let found = svc.get_many(&[tee.id]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_matches!(
            svc.get_many(&[tee.id, Uuid::new_v4()]).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
