use crate::{entities::product, errors::ServiceError};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, SimpleExpr},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u64 = 12;
pub const MAX_PAGE_SIZE: u64 = 100;
const FEATURED_LIMIT: u64 = 8;
const SUGGESTION_PRODUCTS: u64 = 5;
const SUGGESTION_LIMIT: usize = 8;
const SUGGESTION_MIN_CHARS: usize = 2;
const DEFAULT_PRICE_RANGE: (i64, i64) = (0, 1000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SortBy {
    #[default]
    #[serde(rename = "createdAt", alias = "created_at")]
    CreatedAt,
    #[serde(rename = "rating")]
    Rating,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "popularity")]
    Popularity,
}

impl SortBy {
    fn column(self) -> product::Column {
        match self {
            SortBy::CreatedAt => product::Column::CreatedAt,
            SortBy::Rating => product::Column::AverageRating,
            SortBy::Price => product::Column::Price,
            SortBy::Popularity => product::Column::NumReviews,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl From<SortOrder> for Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Minimum average rating
    pub rating: Option<f64>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Listing fields of a product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub category: String,
    pub average_rating: f64,
    pub num_reviews: i32,
    pub is_featured: bool,
}

impl From<product::Model> for ProductSummary {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            image: p.image,
            category: p.category,
            average_rating: p.average_rating,
            num_reviews: p.num_reviews,
            is_featured: p.is_featured,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductPagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_products: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl ProductPagination {
    fn new(page: u64, per_page: u64, total: u64) -> Self {
        Self {
            current_page: page,
            total_pages: total.div_ceil(per_page),
            total_products: total,
            has_next: page.saturating_mul(per_page) < total,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRange {
    pub min_price: Decimal,
    pub max_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchFilters {
    pub categories: Vec<String>,
    pub price_range: PriceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub products: Vec<ProductSummary>,
    pub pagination: ProductPagination,
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPage {
    pub products: Vec<ProductSummary>,
    pub pagination: ProductPagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Product,
    Category,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub value: String,
}

fn page_and_size(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

/// `%term%` with LIKE wildcards in the term escaped
fn contains_pattern(term: &str) -> LikeExpr {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    LikeExpr::new(format!("%{}%", escaped)).escape('\\')
}

/// Case-insensitive substring match on a column
fn icontains(column: product::Column, term: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).like(contains_pattern(term))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Catalog search, listing and suggestions
#[derive(Clone)]
pub struct SearchService {
    db: Arc<DatabaseConnection>,
}

impl SearchService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn filter_condition(query: &SearchQuery) -> Condition {
        let mut condition = Condition::all();
        if let Some(q) = non_blank(&query.q) {
            condition = condition.add(
                Condition::any()
                    .add(icontains(product::Column::Name, q))
                    .add(icontains(product::Column::Description, q)),
            );
        }
        if let Some(category) = non_blank(&query.category) {
            condition = condition.add(icontains(product::Column::Category, category));
        }
        if let Some(min) = query.min_price {
            condition = condition.add(product::Column::Price.gte(min));
        }
        if let Some(max) = query.max_price {
            condition = condition.add(product::Column::Price.lte(max));
        }
        if let Some(rating) = query.rating {
            condition = condition.add(product::Column::AverageRating.gte(rating));
        }
        condition
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResults, ServiceError> {
        let (page, limit) = page_and_size(query.page, query.limit);

        let paginator = product::Entity::find()
            .filter(Self::filter_condition(&query))
            .order_by(query.sort_by.column(), query.sort_order.into())
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(SearchResults {
            products: products.into_iter().map(ProductSummary::from).collect(),
            pagination: ProductPagination::new(page, limit, total),
            filters: SearchFilters {
                categories: self.categories().await?,
                price_range: self.price_range().await?,
            },
        })
    }

    async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        Ok(product::Entity::find()
            .select_only()
            .column(product::Column::Category)
            .distinct()
            .order_by_asc(product::Column::Category)
            .into_tuple()
            .all(&*self.db)
            .await?)
    }

    async fn price_range(&self) -> Result<PriceRange, ServiceError> {
        let bounds: Option<(Option<Decimal>, Option<Decimal>)> = product::Entity::find()
            .select_only()
            .column_as(Expr::col(product::Column::Price).min(), "min_price")
            .column_as(Expr::col(product::Column::Price).max(), "max_price")
            .into_tuple()
            .one(&*self.db)
            .await?;

        Ok(match bounds {
            Some((Some(min_price), Some(max_price))) => PriceRange {
                min_price,
                max_price,
            },
            _ => PriceRange {
                min_price: Decimal::from(DEFAULT_PRICE_RANGE.0),
                max_price: Decimal::from(DEFAULT_PRICE_RANGE.1),
            },
        })
    }

    /// Up to five product names then matching categories, eight at most.
    /// Terms shorter than two characters yield nothing.
    #[instrument(skip(self))]
    pub async fn suggestions(&self, q: &str) -> Result<Vec<Suggestion>, ServiceError> {
        let q = q.trim();
        if q.chars().count() < SUGGESTION_MIN_CHARS {
            return Ok(Vec::new());
        }

        let names: Vec<String> = product::Entity::find()
            .select_only()
            .column(product::Column::Name)
            .filter(icontains(product::Column::Name, q))
            .limit(SUGGESTION_PRODUCTS)
            .into_tuple()
            .all(&*self.db)
            .await?;
        let categories: Vec<String> = product::Entity::find()
            .select_only()
            .column(product::Column::Category)
            .distinct()
            .filter(icontains(product::Column::Category, q))
            .order_by_asc(product::Column::Category)
            .into_tuple()
            .all(&*self.db)
            .await?;

        Ok(names
            .into_iter()
            .map(|value| Suggestion {
                kind: SuggestionKind::Product,
                value,
            })
            .chain(categories.into_iter().map(|value| Suggestion {
                kind: SuggestionKind::Category,
                value,
            }))
            .take(SUGGESTION_LIMIT)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn featured(&self) -> Result<Vec<ProductSummary>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::AverageRating)
            .order_by_desc(product::Column::NumReviews)
            .limit(FEATURED_LIMIT)
            .all(&*self.db)
            .await?;
        Ok(products.into_iter().map(ProductSummary::from).collect())
    }

    /// Best rated first
    #[instrument(skip(self))]
    pub async fn by_category(
        &self,
        category: &str,
        page: PageQuery,
    ) -> Result<CategoryPage, ServiceError> {
        let (page, limit) = page_and_size(page.page, page.limit);
        let paginator = product::Entity::find()
            .filter(icontains(product::Column::Category, category.trim()))
            .order_by_desc(product::Column::AverageRating)
            .order_by_desc(product::Column::NumReviews)
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(CategoryPage {
            products: products.into_iter().map(ProductSummary::from).collect(),
            pagination: ProductPagination::new(page, limit, total),
        })
    }
}
