use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Loyalty coupon. A user owns at most one row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_percentage: i32,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
    #[sea_orm(unique)]
    pub user_id: Uuid,
    /// Provider-side coupon, created the first time this coupon reaches Stripe
    pub stripe_coupon_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expiration_date > now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
