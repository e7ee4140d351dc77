// Pure money math and provider payloads
pub mod pricing;
pub mod payments;

// Catalog and orders
pub mod products;
pub mod orders;

// Checkout and loyalty coupons
pub mod checkout;
pub mod coupons;

// Customer-facing features
pub mod addresses;
pub mod cart;
pub mod reviews;
pub mod search;
pub mod wishlist;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        db::{establish_connection_with_config, run_migrations, DbConfig},
        entities::product,
        events::{process_events, EventSender},
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    /// Fresh migrated in-memory SQLite database. A single pooled connection
    /// keeps every query on the same memory database.
    pub async fn memory_db() -> Arc<DatabaseConnection> {
        let config = DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        };
        let db = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        Arc::new(db)
    }

    pub fn event_sender() -> Arc<EventSender> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(process_events(rx));
        Arc::new(EventSender::new(tx))
    }

    pub async fn seed_product(
        db: &DatabaseConnection,
        name: &str,
        price: Decimal,
        category: &str,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(format!("{} description", name)),
            price: Set(price),
            image: Set(None),
            category: Set(category.to_string()),
            is_featured: Set(false),
            average_rating: Set(0.0),
            num_reviews: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap()
    }
}
