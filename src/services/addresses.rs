use crate::{entities::address, errors::ServiceError};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 50))]
    pub address_type: String,
    #[validate(length(min = 1, max = 255))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub zip_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial update; empty strings are treated as absent
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AddressPatch {
    #[serde(default, rename = "type")]
    #[validate(length(max = 50))]
    pub address_type: Option<String>,
    #[validate(length(max = 255))]
    pub street: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 20))]
    pub zip_code: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    pub is_default: Option<bool>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn clear_default<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<(), ServiceError> {
    address::Entity::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .filter(address::Column::UserId.eq(user_id))
        .filter(address::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}

/// Saved shipping addresses. Marking one default clears the flag on the
/// others in the same transaction.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_asc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn find_owned<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))
    }

    #[instrument(skip(self, input))]
    pub async fn add(
        &self,
        user_id: Uuid,
        input: AddressInput,
    ) -> Result<address::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        if input.is_default {
            clear_default(&txn, user_id).await?;
        }
        let now = Utc::now();
        let created = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            address_type: Set(input.address_type),
            street: Set(input.street),
            city: Set(input.city),
            state: Set(input.state),
            zip_code: Set(input.zip_code),
            country: Set(input.country),
            is_default: Set(input.is_default),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(address_id = %created.id, "Address added");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        patch: AddressPatch,
    ) -> Result<address::Model, ServiceError> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let existing = Self::find_owned(&txn, user_id, address_id).await?;
        if patch.is_default == Some(true) {
            clear_default(&txn, user_id).await?;
        }

        let mut active: address::ActiveModel = existing.into();
        if let Some(v) = non_empty(patch.address_type) {
            active.address_type = Set(v);
        }
        if let Some(v) = non_empty(patch.street) {
            active.street = Set(v);
        }
        if let Some(v) = non_empty(patch.city) {
            active.city = Set(v);
        }
        if let Some(v) = non_empty(patch.state) {
            active.state = Set(v);
        }
        if let Some(v) = non_empty(patch.zip_code) {
            active.zip_code = Set(v);
        }
        if let Some(v) = non_empty(patch.country) {
            active.country = Set(v);
        }
        if let Some(is_default) = patch.is_default {
            active.is_default = Set(is_default);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let result = address::Entity::delete_many()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Address not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let existing = Self::find_owned(&txn, user_id, address_id).await?;
        clear_default(&txn, user_id).await?;

        let mut active: address::ActiveModel = existing.into();
        active.is_default = Set(true);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }
}
