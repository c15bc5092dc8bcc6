//! Request/response types for shops and products.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    /// Id of the parent shop when creating a branch.
    pub parent: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShopResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShopEnvelope {
    pub shop: ShopResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShopListResponse {
    pub shops: Vec<ShopResponse>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub shop_id: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub sku: Option<String>,
    pub stock: Option<i32>,
    pub unit: Option<String>,
    pub tax_rate: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    pub price: f64,
    pub sku: Option<String>,
    pub stock: i32,
    pub unit: Option<String>,
    pub tax_rate: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductEnvelope {
    pub product: ProductResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub shop_id: Option<String>,
}
