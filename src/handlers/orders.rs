use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, put},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthUser, ADMIN_ROLE},
    errors::ServiceError,
    services::orders::{OrderWithItems, UpdateOrderStatusInput},
    ApiResponse, AppState,
};

use super::common::{PaginatedResponse, PaginationParams};

/// GET /api/v1/orders
///
/// The caller's own orders, newest first.
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderWithItems>>>, ServiceError> {
    let params = params.normalized();
    let (orders, total) = state
        .services
        .orders
        .list_for_user(auth_user.user_id, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders,
        params.page,
        params.per_page,
        total,
    ))))
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderWithItems>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_for_user(id, auth_user.user_id, auth_user.is_admin())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// PUT /api/v1/orders/:id/status (admin)
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusInput>,
) -> Result<Json<ApiResponse<OrderWithItems>>, ServiceError> {
    let order = state.services.orders.update_status(id, payload).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub fn order_routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/:id/status", put(update_order_status))
        .with_role(ADMIN_ROLE);

    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .with_auth()
        .merge(admin)
}
