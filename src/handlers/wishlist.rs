use axum::{
    extract::{Path, State},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    services::wishlist::WishlistEntry,
    ApiResponse, AppState,
};

use super::common::message_response;

#[derive(Debug, Serialize)]
pub struct WishlistCheck {
    pub in_wishlist: bool,
}

/// GET /api/v1/wishlist
pub async fn get_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<WishlistEntry>>>, ServiceError> {
    let entries = state.services.wishlist.get(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// POST /api/v1/wishlist/:product_id
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .wishlist
        .add(auth_user.user_id, product_id)
        .await?;
    Ok(message_response("Product added to wishlist"))
}

/// DELETE /api/v1/wishlist/:product_id
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .wishlist
        .remove(auth_user.user_id, product_id)
        .await?;
    Ok(message_response("Product removed from wishlist"))
}

/// GET /api/v1/wishlist/check/:product_id
pub async fn check_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<WishlistCheck>>, ServiceError> {
    let in_wishlist = state
        .services
        .wishlist
        .contains(auth_user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(WishlistCheck { in_wishlist })))
}

pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_wishlist))
        .route(
            "/:product_id",
            post(add_to_wishlist).delete(remove_from_wishlist),
        )
        .route("/check/:product_id", get(check_wishlist))
        .with_auth()
}
