use crate::{
    config::CouponPolicy,
    entities::coupon,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const CODE_SUFFIX_LEN: usize = 6;

/// `prefix` followed by six random uppercase alphanumerics.
pub fn generate_code(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}{}", prefix, suffix)
}

/// Marks the user's coupon with `code` inactive. Runs on any connection so
/// the order finalizer can call it inside its transaction.
pub async fn deactivate<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    code: &str,
) -> Result<u64, ServiceError> {
    let result = coupon::Entity::update_many()
        .col_expr(coupon::Column::IsActive, Expr::value(false))
        .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupon::Column::UserId.eq(user_id))
        .filter(coupon::Column::Code.eq(code))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Loyalty coupon issuance and lookup.
///
/// A user owns at most one coupon row. Issuing deletes the previous row and
/// inserts a fresh one; the two statements are not wrapped in a transaction.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    policy: CouponPolicy,
}

impl CouponService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        policy: CouponPolicy,
    ) -> Self {
        Self {
            db,
            event_sender,
            policy,
        }
    }

    pub fn policy(&self) -> &CouponPolicy {
        &self.policy
    }

    /// Whether an undiscounted subtotal earns a new coupon.
    pub fn qualifies(&self, subtotal: Decimal) -> bool {
        subtotal >= self.policy.threshold
    }

    /// Replaces any coupon the user holds with a fresh one.
    #[instrument(skip(self))]
    pub async fn issue_for_user(&self, user_id: Uuid) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::delete_many()
            .filter(coupon::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(generate_code(&self.policy.code_prefix)),
            discount_percentage: Set(self.policy.discount_percent),
            expiration_date: Set(now + Duration::days(self.policy.validity_days)),
            is_active: Set(true),
            user_id: Set(user_id),
            stripe_coupon_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        metrics::counter!("storefront_coupons_issued_total", 1);
        self.event_sender
            .send_or_log(Event::CouponIssued {
                user_id,
                code: model.code.clone(),
            })
            .await;

        info!(user_id = %user_id, code = %model.code, "Issued coupon");
        Ok(model)
    }

    /// Issues a coupon when `subtotal` reaches the threshold.
    pub async fn issue_if_qualifying(
        &self,
        user_id: Uuid,
        subtotal: Decimal,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        if self.qualifies(subtotal) {
            self.issue_for_user(user_id).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Active, unexpired coupon with `code` owned by the user.
    #[instrument(skip(self))]
    pub async fn find_active(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let found = coupon::Entity::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ExpirationDate.gt(Utc::now()))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    /// The user's usable coupon, if any.
    #[instrument(skip(self))]
    pub async fn current_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let found = coupon::Entity::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ExpirationDate.gt(Utc::now()))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    /// Checks a code typed by the user. An expired coupon is switched off
    /// and reported as not found.
    #[instrument(skip(self))]
    pub async fn validate(&self, user_id: Uuid, code: &str) -> Result<coupon::Model, ServiceError> {
        let found = coupon::Entity::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        if found.expiration_date <= Utc::now() {
            deactivate(&*self.db, user_id, code).await?;
            return Err(ServiceError::NotFound("Coupon expired".to_string()));
        }

        Ok(found)
    }

    /// Remembers the provider-side coupon created for this store coupon.
    pub async fn attach_stripe_coupon(
        &self,
        coupon: coupon::Model,
        stripe_coupon_id: String,
    ) -> Result<coupon::Model, ServiceError> {
        let mut active: coupon::ActiveModel = coupon.into();
        active.stripe_coupon_id = Set(Some(stripe_coupon_id));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{event_sender, memory_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use sea_orm::PaginatorTrait;

    async fn service() -> CouponService {
        CouponService::new(memory_db().await, event_sender(), CouponPolicy::default())
    }

    #[test]
    fn generated_codes_have_prefix_and_six_uppercase_chars() {
        for _ in 0..50 {
            let code = generate_code("GIFT");
            assert_eq!(code.len(), 10);
            assert!(code.starts_with("GIFT"));
            assert!(code[4..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let svc = service().await;
        assert!(svc.qualifies(dec!(200)));
        assert!(!svc.qualifies(dec!(199.99)));
    }

    #[tokio::test]
    async fn reissuing_leaves_exactly_one_coupon() {
        let svc = service().await;
        let user = Uuid::new_v4();

        let first = svc.issue_for_user(user).await.unwrap();
        let second = svc.issue_for_user(user).await.unwrap();
        assert_ne!(first.code, second.code);

        let count = coupon::Entity::find()
            .filter(coupon::Column::UserId.eq(user))
            .count(&*svc.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            svc.current_for_user(user).await.unwrap().unwrap().code,
            second.code
        );
    }

    #[tokio::test]
    async fn issued_coupon_follows_policy() {
        let svc = service().await;
        let coupon = svc.issue_for_user(Uuid::new_v4()).await.unwrap();
        assert_eq!(coupon.discount_percentage, 10);
        assert!(coupon.is_active);
        let days = (coupon.expiration_date - coupon.created_at).num_days();
        assert_eq!(days, 30);
    }

    #[tokio::test]
    async fn coupons_are_scoped_to_their_owner() {
        let svc = service().await;
        let owner = Uuid::new_v4();
        let coupon = svc.issue_for_user(owner).await.unwrap();

        assert!(svc
            .find_active(Uuid::new_v4(), &coupon.code)
            .await
            .unwrap()
            .is_none());
        assert!(svc.find_active(owner, &coupon.code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deactivated_coupon_is_no_longer_found() {
        let svc = service().await;
        let user = Uuid::new_v4();
        let coupon = svc.issue_for_user(user).await.unwrap();

        assert_eq!(deactivate(&*svc.db, user, &coupon.code).await.unwrap(), 1);
        assert!(svc.find_active(user, &coupon.code).await.unwrap().is_none());
        assert_matches!(
            svc.validate(user, &coupon.code).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn expired_coupon_is_deactivated_on_validate() {
        let svc = service().await;
        let user = Uuid::new_v4();
        let coupon = svc.issue_for_user(user).await.unwrap();

        let mut expired: coupon::ActiveModel = coupon.clone().into();
        expired.expiration_date = Set(Utc::now() - Duration::days(1));
        expired.update(&*svc.db).await.unwrap();

        assert_matches!(
            svc.validate(user, &coupon.code).await,
            Err(ServiceError::NotFound(msg)) if msg == "Coupon expired"
        );
        let stored = coupon::Entity::find_by_id(coupon.id)
            .one(&*svc.db)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_active);
    }
}
