use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::{
    errors::ServiceError,
    services::search::{
        CategoryPage, PageQuery, ProductSummary, SearchQuery, SearchResults, Suggestion,
    },
    ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/v1/search
pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<SearchResults>>, ServiceError> {
    let results = state.services.search.search(query).await?;
    Ok(Json(ApiResponse::success(results)))
}

/// GET /api/v1/search/suggestions
pub async fn search_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<ApiResponse<Vec<Suggestion>>>, ServiceError> {
    let suggestions = state.services.search.suggestions(&query.q).await?;
    Ok(Json(ApiResponse::success(suggestions)))
}

/// GET /api/v1/search/featured
pub async fn featured_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductSummary>>>, ServiceError> {
    let products = state.services.search.featured().await?;
    Ok(Json(ApiResponse::success(products)))
}

/// GET /api/v1/search/category/:category
pub async fn products_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<CategoryPage>>, ServiceError> {
    let listing = state.services.search.by_category(&category, page).await?;
    Ok(Json(ApiResponse::success(listing)))
}

/// Public catalog browsing
pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search_products))
        .route("/suggestions", get(search_suggestions))
        .route("/featured", get(featured_products))
        .route("/category/:category", get(products_by_category))
}
