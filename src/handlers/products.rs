use axum::{
    extract::{Path, State},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, ADMIN_ROLE},
    entities::product,
    errors::ServiceError,
    services::products::CreateProductInput,
    ApiResponse, AppState,
};

use super::common::{created_response, validate_input};

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    let product = state.services.products.get(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// POST /api/v1/products (admin)
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let product = state.services.products.create(payload).await?;
    Ok(created_response(product))
}

pub fn product_routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/", post(create_product))
        .with_role(ADMIN_ROLE);

    Router::new().route("/:id", get(get_product)).merge(admin)
}
