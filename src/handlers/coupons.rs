use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::coupon,
    errors::ServiceError,
    ApiResponse, AppState,
};

use super::common::validate_input;

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

/// Coupon as shown to its owner. Provider ids stay server-side.
#[derive(Debug, Clone, Serialize)]
pub struct CouponResponse {
    pub code: String,
    pub discount_percentage: i32,
    pub expiration_date: DateTime<Utc>,
}

impl From<coupon::Model> for CouponResponse {
    fn from(c: coupon::Model) -> Self {
        Self {
            code: c.code,
            discount_percentage: c.discount_percentage,
            expiration_date: c.expiration_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CouponValidation {
    pub message: String,
    pub code: String,
    pub discount_percentage: i32,
}

/// GET /api/v1/coupons
///
/// Returns `null` data when the caller has no usable coupon.
pub async fn get_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Option<CouponResponse>>>, ServiceError> {
    let current = state
        .services
        .coupons
        .current_for_user(auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(current.map(CouponResponse::from))))
}

/// POST /api/v1/coupons/validate
pub async fn validate_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<CouponValidation>>, ServiceError> {
    validate_input(&payload)?;
    let found = state
        .services
        .coupons
        .validate(auth_user.user_id, payload.code.trim())
        .await?;
    Ok(Json(ApiResponse::success(CouponValidation {
        message: "Coupon is valid".to_string(),
        code: found.code,
        discount_percentage: found.discount_percentage,
    })))
}

pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_coupon))
        .route("/validate", post(validate_coupon))
        .with_auth()
}
