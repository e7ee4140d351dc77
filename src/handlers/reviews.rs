use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::review,
    errors::ServiceError,
    services::reviews::{CreateReviewInput, ReviewPage, UpdateReviewInput, DEFAULT_REVIEWS_PER_PAGE},
    ApiResponse, AppState,
};

use super::common::{created_response, message_response, validate_input, PaginationParams};

#[derive(Debug, Default, Deserialize)]
pub struct ReviewListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HelpfulCount {
    pub helpful: i32,
}

/// GET /api/v1/reviews/product/:product_id
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<ApiResponse<ReviewPage>>, ServiceError> {
    let params =
        PaginationParams::with_default_per_page(query.page, query.limit, DEFAULT_REVIEWS_PER_PAGE);
    let page = state
        .services
        .reviews
        .list(product_id, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// POST /api/v1/reviews/product/:product_id
pub async fn create_review(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<CreateReviewInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let created = state
        .services
        .reviews
        .create(auth_user.user_id, auth_user.name.clone(), product_id, payload)
        .await?;
    Ok(created_response(created))
}

/// PUT /api/v1/reviews/:review_id
pub async fn update_review(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(review_id): Path<Uuid>,
    Json(payload): Json<UpdateReviewInput>,
) -> Result<Json<ApiResponse<review::Model>>, ServiceError> {
    validate_input(&payload)?;
    let updated = state
        .services
        .reviews
        .update(auth_user.user_id, review_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/v1/reviews/:review_id
pub async fn delete_review(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(review_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .reviews
        .delete(auth_user.user_id, review_id)
        .await?;
    Ok(message_response("Review deleted successfully"))
}

/// POST /api/v1/reviews/:review_id/helpful
pub async fn mark_helpful(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(review_id): Path<Uuid>,
) -> Result<Json<ApiResponse<HelpfulCount>>, ServiceError> {
    let helpful = state.services.reviews.mark_helpful(review_id).await?;
    Ok(Json(ApiResponse::success(HelpfulCount { helpful })))
}

/// POST /api/v1/reviews/:review_id/report
pub async fn report_review(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(review_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.reviews.report(review_id).await?;
    Ok(message_response("Review reported"))
}

pub fn review_routes() -> Router<AppState> {
    let authenticated = Router::new()
        .route("/product/:product_id", post(create_review))
        .route("/:review_id", put(update_review).delete(delete_review))
        .route("/:review_id/helpful", post(mark_helpful))
        .route("/:review_id/report", post(report_review))
        .with_auth();

    Router::new()
        .route("/product/:product_id", get(list_reviews))
        .merge(authenticated)
}
