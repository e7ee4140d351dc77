use axum::{
    extract::{Path, State},
    response::{Json, Response},
    routing::{get, put},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::address,
    errors::ServiceError,
    services::addresses::{AddressInput, AddressPatch},
    ApiResponse, AppState,
};

use super::common::{created_response, message_response, validate_input};

/// GET /api/v1/addresses
pub async fn list_addresses(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<address::Model>>>, ServiceError> {
    let addresses = state.services.addresses.list(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

/// POST /api/v1/addresses
pub async fn add_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AddressInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let created = state
        .services
        .addresses
        .add(auth_user.user_id, payload)
        .await?;
    Ok(created_response(created))
}

/// PUT /api/v1/addresses/:id
pub async fn update_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressPatch>,
) -> Result<Json<ApiResponse<address::Model>>, ServiceError> {
    validate_input(&payload)?;
    let updated = state
        .services
        .addresses
        .update(auth_user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/v1/addresses/:id
pub async fn delete_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .addresses
        .delete(auth_user.user_id, id)
        .await?;
    Ok(message_response("Address deleted"))
}

/// PUT /api/v1/addresses/:id/default
pub async fn set_default_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<address::Model>>, ServiceError> {
    let updated = state
        .services
        .addresses
        .set_default(auth_user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addresses).post(add_address))
        .route("/:id", put(update_address).delete(delete_address))
        .route("/:id/default", put(set_default_address))
        .with_auth()
}
