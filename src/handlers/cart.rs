use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    services::cart::{AddToCartInput, CartView, RemoveFromCartInput, SetQuantityInput},
    ApiResponse, AppState,
};

use super::common::validate_input;

/// GET /api/v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.cart.get(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// POST /api/v1/cart
pub async fn add_to_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AddToCartInput>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    validate_input(&payload)?;
    let cart = state.services.cart.add(auth_user.user_id, payload).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// DELETE /api/v1/cart
///
/// With a `product_id` in the body only that line goes; without one the
/// whole cart is emptied.
pub async fn remove_from_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Option<Json<RemoveFromCartInput>>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let input = payload.map(|Json(p)| p).unwrap_or_default();
    let cart = match input.product_id {
        Some(product_id) => {
            state
                .services
                .cart
                .remove(auth_user.user_id, product_id)
                .await?
        }
        None => state.services.cart.clear(auth_user.user_id).await?,
    };
    Ok(Json(ApiResponse::success(cart)))
}

/// PUT /api/v1/cart/:product_id
pub async fn update_quantity(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<SetQuantityInput>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .cart
        .set_quantity(auth_user.user_id, product_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(get_cart).post(add_to_cart).delete(remove_from_cart),
        )
        .route("/:product_id", put(update_quantity))
        .with_auth()
}
