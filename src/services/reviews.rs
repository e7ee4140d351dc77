//! Product reviews and the rating summary derived from them.
//!
//! Every create, update and delete is followed by
//! [`recompute_product_rating`], which rewrites the product's
//! `average_rating` and `num_reviews` from the reviews currently stored. The
//! recompute runs after the review write and outside its transaction, so two
//! concurrent writes to the same product can leave a stale summary until the
//! next write.

use crate::{
    entities::{order, order_item, product, review},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const DEFAULT_REVIEWS_PER_PAGE: u64 = 10;
const MAX_REVIEW_IMAGES: usize = 5;
const DUPLICATE_REVIEW_MESSAGE: &str = "You have already reviewed this product";

/// A concurrent create can pass the existence check and then hit the
/// user/product unique index; that surfaces as the same conflict.
fn duplicate_review_conflict(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(DUPLICATE_REVIEW_MESSAGE.to_string())
        }
        _ => err.into(),
    }
}

fn validate_images(images: &[String]) -> Result<(), ValidationError> {
    if images.len() > MAX_REVIEW_IMAGES {
        return Err(ValidationError::new("too_many_images"));
    }
    if images.iter().any(|url| !validator::validate_url(url)) {
        return Err(ValidationError::new("invalid_image_url"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReviewInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(min = 1, max = 500))]
    pub comment: String,
    #[serde(default)]
    #[validate(custom = "validate_images")]
    pub images: Vec<String>,
}

/// Absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateReviewInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<i32>,
    #[validate(length(min = 1, max = 500))]
    pub comment: Option<String>,
    #[validate(custom = "validate_images")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub num_reviews: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewPagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_reviews: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl ReviewPagination {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let per_page = per_page.max(1);
        Self {
            current_page: page,
            total_pages: total.div_ceil(per_page),
            total_reviews: total,
            has_next: page.saturating_mul(per_page) < total,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPage {
    pub reviews: Vec<review::Model>,
    pub pagination: ReviewPagination,
}

/// Mean rating rounded to one decimal, and the count. No ratings gives 0 / 0.
pub fn summarize_ratings(ratings: &[i32]) -> RatingSummary {
    if ratings.is_empty() {
        return RatingSummary {
            average_rating: 0.0,
            num_reviews: 0,
        };
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    RatingSummary {
        average_rating: (mean * 10.0).round() / 10.0,
        num_reviews: ratings.len() as i32,
    }
}

/// Rewrites the product's rating summary from its stored reviews.
pub async fn recompute_product_rating<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<RatingSummary, ServiceError> {
    let ratings: Vec<i32> = review::Entity::find()
        .select_only()
        .column(review::Column::Rating)
        .filter(review::Column::ProductId.eq(product_id))
        .into_tuple()
        .all(conn)
        .await?;

    let summary = summarize_ratings(&ratings);
    product::Entity::update_many()
        .col_expr(
            product::Column::AverageRating,
            Expr::value(summary.average_rating),
        )
        .col_expr(product::Column::NumReviews, Expr::value(summary.num_reviews))
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    Ok(summary)
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn refresh_rating(&self, product_id: Uuid) -> Result<RatingSummary, ServiceError> {
        let summary = recompute_product_rating(&*self.db, product_id).await?;
        self.event_sender
            .send_or_log(Event::ProductRatingRecomputed {
                product_id,
                average_rating: summary.average_rating,
                num_reviews: summary.num_reviews,
            })
            .await;
        Ok(summary)
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        product_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<ReviewPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let paginator = review::Entity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .order_by_desc(review::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let reviews = paginator.fetch_page(page - 1).await?;

        Ok(ReviewPage {
            reviews,
            pagination: ReviewPagination::new(page, per_page, total),
        })
    }

    async fn has_purchased(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, ServiceError> {
        let purchases = order_item::Entity::find()
            .join(JoinType::InnerJoin, order_item::Relation::Order.def())
            .filter(order::Column::UserId.eq(user_id))
            .filter(order_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        Ok(purchases > 0)
    }

    #[instrument(skip(self, input, user_name))]
    pub async fn create(
        &self,
        user_id: Uuid,
        user_name: Option<String>,
        product_id: Uuid,
        input: CreateReviewInput,
    ) -> Result<review::Model, ServiceError> {
        input.validate()?;

        if product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound("Product not found".to_string()));
        }

        let existing = review::Entity::find()
            .filter(review::Column::UserId.eq(user_id))
            .filter(review::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(DUPLICATE_REVIEW_MESSAGE.to_string()));
        }

        let is_verified = self.has_purchased(user_id, product_id).await?;
        let now = Utc::now();
        let created = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            user_name: Set(user_name),
            product_id: Set(product_id),
            rating: Set(input.rating),
            comment: Set(input.comment),
            images: Set(serde_json::to_value(&input.images)?),
            is_verified: Set(is_verified),
            helpful: Set(0),
            reported: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(duplicate_review_conflict)?;

        self.event_sender
            .send_or_log(Event::ReviewCreated {
                review_id: created.id,
                product_id,
            })
            .await;
        self.refresh_rating(product_id).await?;

        info!(review_id = %created.id, is_verified, "Review created");
        Ok(created)
    }

    async fn find_owned(
        &self,
        review_id: Uuid,
        user_id: Uuid,
    ) -> Result<review::Model, ServiceError> {
        review::Entity::find_by_id(review_id)
            .filter(review::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Review not found or not owned".to_string()))
    }

    async fn find(&self, review_id: Uuid) -> Result<review::Model, ServiceError> {
        review::Entity::find_by_id(review_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Review not found".to_string()))
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        input: UpdateReviewInput,
    ) -> Result<review::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_owned(review_id, user_id).await?;
        let product_id = existing.product_id;

        let mut active: review::ActiveModel = existing.into();
        if let Some(rating) = input.rating {
            active.rating = Set(rating);
        }
        if let Some(comment) = input.comment {
            active.comment = Set(comment);
        }
        if let Some(images) = input.images {
            active.images = Set(serde_json::to_value(images)?);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ReviewUpdated {
                review_id,
                product_id,
            })
            .await;
        self.refresh_rating(product_id).await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, review_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_owned(review_id, user_id).await?;
        let product_id = existing.product_id;

        review::Entity::delete_by_id(review_id)
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::ReviewDeleted {
                review_id,
                product_id,
            })
            .await;
        self.refresh_rating(product_id).await?;
        info!(%review_id, "Review deleted");
        Ok(())
    }

    /// Adds one helpful vote and returns the new count.
    #[instrument(skip(self))]
    pub async fn mark_helpful(&self, review_id: Uuid) -> Result<i32, ServiceError> {
        self.find(review_id).await?;
        review::Entity::update_many()
            .col_expr(
                review::Column::Helpful,
                Expr::col(review::Column::Helpful).add(1),
            )
            .filter(review::Column::Id.eq(review_id))
            .exec(&*self.db)
            .await?;
        Ok(self.find(review_id).await?.helpful)
    }

    #[instrument(skip(self))]
    pub async fn report(&self, review_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find(review_id).await?;
        let mut active: review::ActiveModel = existing.into();
        active.reported = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!(%review_id, "Review reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::orders::{FinalizeOrder, OrderService, PaymentReference};
    use crate::services::payments::OrderedProduct;
    use crate::services::test_support::{event_sender, memory_db, seed_product};
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn rated(rating: i32) -> CreateReviewInput {
        CreateReviewInput {
            rating,
            comment: "Fits well".into(),
            images: vec![],
        }
    }

    async fn rating_of(db: &DatabaseConnection, id: Uuid) -> (f64, i32) {
        let p = product::Entity::find_by_id(id).one(db).await.unwrap().unwrap();
        (p.average_rating, p.num_reviews)
    }

    #[rstest]
    #[case(&[], 0.0, 0)]
    #[case(&[4, 5, 3], 4.0, 3)]
    #[case(&[4, 5], 4.5, 2)]
    #[case(&[5, 4, 4], 4.3, 3)]
    #[case(&[1, 2], 1.5, 2)]
    fn summary_is_rounded_mean(#[case] ratings: &[i32], #[case] avg: f64, #[case] count: i32) {
        let summary = summarize_ratings(ratings);
        assert_eq!(summary.average_rating, avg);
        assert_eq!(summary.num_reviews, count);
    }

    #[test]
    fn pagination_flags() {
        let p = ReviewPagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let last = ReviewPagination::new(3, 10, 25);
        assert!(!last.has_next);
        assert!(last.has_prev);
        assert_eq!(ReviewPagination::new(1, 10, 0).total_pages, 0);
    }

    #[tokio::test]
    async fn rating_follows_creates_and_deletes() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;

        let mut ids = Vec::new();
        for rating in [4, 5, 3] {
            let r = svc
                .create(Uuid::new_v4(), None, product.id, rated(rating))
                .await
                .unwrap();
            ids.push((r.user_id, r.id));
        }
        assert_eq!(rating_of(&db, product.id).await, (4.0, 3));

        let (user, id) = ids[2];
        svc.delete(user, id).await.unwrap();
        assert_eq!(rating_of(&db, product.id).await, (4.5, 2));

        for (user, id) in &ids[..2] {
            svc.delete(*user, *id).await.unwrap();
        }
        assert_eq!(rating_of(&db, product.id).await, (0.0, 0));
    }

    #[tokio::test]
    async fn unique_index_violation_maps_to_conflict() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        let user = Uuid::new_v4();
        svc.create(user, None, product.id, rated(4)).await.unwrap();

        // Same insert a racing request would make after passing the check
        let now = Utc::now();
        let err = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user),
            user_name: Set(None),
            product_id: Set(product.id),
            rating: Set(5),
            comment: Set("Second opinion".into()),
            images: Set(serde_json::json!([])),
            is_verified: Set(false),
            helpful: Set(0),
            reported: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*db)
        .await
        .unwrap_err();

        assert_matches!(
            duplicate_review_conflict(err),
            ServiceError::Conflict(msg) if msg == DUPLICATE_REVIEW_MESSAGE
        );
        assert_matches!(
            duplicate_review_conflict(DbErr::Custom("boom".into())),
            ServiceError::DatabaseError(_)
        );
    }

    #[tokio::test]
    async fn update_recomputes_rating() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        let user = Uuid::new_v4();
        let created = svc.create(user, None, product.id, rated(2)).await.unwrap();

        let updated = svc
            .update(
                user,
                created.id,
                UpdateReviewInput {
                    rating: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.comment, "Fits well");
        assert_eq!(rating_of(&db, product.id).await, (5.0, 1));
    }

    #[tokio::test]
    async fn second_review_by_same_user_is_rejected() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        let user = Uuid::new_v4();

        svc.create(user, None, product.id, rated(4)).await.unwrap();
        assert_matches!(
            svc.create(user, None, product.id, rated(5)).await,
            Err(ServiceError::Conflict(_))
        );
        assert_eq!(rating_of(&db, product.id).await, (4.0, 1));
    }

    #[tokio::test]
    async fn review_for_missing_product_is_not_found() {
        let svc = ReviewService::new(memory_db().await, event_sender());
        assert_matches!(
            svc.create(Uuid::new_v4(), None, Uuid::new_v4(), rated(4)).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn out_of_range_rating_is_invalid() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        assert_matches!(
            svc.create(Uuid::new_v4(), None, product.id, rated(6)).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn purchasers_get_verified_reviews() {
        let db = memory_db().await;
        let events = event_sender();
        let svc = ReviewService::new(db.clone(), events.clone());
        let orders = OrderService::new(db.clone(), events);
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        let buyer = Uuid::new_v4();

        orders
            .finalize(FinalizeOrder {
                user_id: buyer,
                payment: PaymentReference::PaypalOrder("PP-1".into()),
                products: vec![OrderedProduct {
                    id: product.id,
                    quantity: 1,
                    price: dec!(120),
                }],
                total_amount: dec!(120),
                currency: "USD".into(),
                coupon_code: None,
                shipping_address: None,
            })
            .await
            .unwrap();

        let verified = svc.create(buyer, None, product.id, rated(5)).await.unwrap();
        let unverified = svc
            .create(Uuid::new_v4(), None, product.id, rated(5))
            .await
            .unwrap();
        assert!(verified.is_verified);
        assert!(!unverified.is_verified);
    }

    #[tokio::test]
    async fn only_the_author_can_edit_or_delete() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        let created = svc
            .create(Uuid::new_v4(), None, product.id, rated(4))
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        assert_matches!(
            svc.delete(stranger, created.id).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            svc.update(stranger, created.id, UpdateReviewInput::default())
                .await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn helpful_and_report() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        let created = svc
            .create(Uuid::new_v4(), None, product.id, rated(4))
            .await
            .unwrap();

        assert_eq!(svc.mark_helpful(created.id).await.unwrap(), 1);
        assert_eq!(svc.mark_helpful(created.id).await.unwrap(), 2);
        svc.report(created.id).await.unwrap();
        assert!(svc.find(created.id).await.unwrap().reported);
        assert_matches!(
            svc.mark_helpful(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn list_is_paginated() {
        let db = memory_db().await;
        let svc = ReviewService::new(db.clone(), event_sender());
        let product = seed_product(&db, "Jacket", dec!(120), "jackets").await;
        for _ in 0..3 {
            svc.create(Uuid::new_v4(), None, product.id, rated(4))
                .await
                .unwrap();
        }

        let page = svc.list(product.id, 2, 2).await.unwrap();
        assert_eq!(page.reviews.len(), 1);
        assert_eq!(page.pagination.total_reviews, 3);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }
}
