use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Product {
    pub id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    /// Price in the smallest currency unit.
    pub price_cents: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductCreateRequest {
    pub category_id: Option<i64>,
    #[schema(example = "Espresso cup")]
    pub name: String,
    #[schema(example = "Porcelain, 90ml")]
    pub description: Option<String>,
    #[schema(example = 1299)]
    pub price_cents: i64,
    #[serde(default)]
    #[schema(example = 40)]
    pub stock: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductUpdateRequest {
    pub category_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: Option<i64>,
}

/// A purchasable variant of a product with its own stock.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct ProductOption {
    pub id: i64,
    pub product_id: i64,
    pub label: String,
    /// Overrides the product price when set.
    pub price_cents: Option<i64>,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductOptionCreateRequest {
    #[schema(example = "Matte black")]
    pub label: String,
    #[schema(example = 1499)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    #[schema(example = 12)]
    pub stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CategoryCreateRequest {
    #[schema(example = "Kitchen")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CategoryUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}
