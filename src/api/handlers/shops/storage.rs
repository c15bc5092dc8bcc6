//! Database helpers for shops and products.
//!
//! Parent-shop ownership is checked under `FOR SHARE` in the same
//! transaction as the insert, so a shop can never be created referencing a
//! parent the caller does not own.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug)]
pub(super) struct ShopRecord {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) description: Option<String>,
    pub(super) domain: Option<String>,
    pub(super) contact_email: Option<String>,
    pub(super) address: Option<String>,
    pub(super) parent_id: Option<Uuid>,
}

#[derive(Debug)]
pub(super) struct NewShop<'a> {
    pub(super) name: &'a str,
    pub(super) description: Option<&'a str>,
    pub(super) domain: Option<&'a str>,
    pub(super) contact_email: Option<&'a str>,
    pub(super) address: Option<&'a str>,
    pub(super) parent_id: Option<Uuid>,
}

#[derive(Debug)]
pub(super) enum CreateShopOutcome {
    Created(ShopRecord),
    ParentMissing,
    ParentForbidden,
}

#[derive(Debug)]
pub(super) struct ProductRecord {
    pub(super) id: Uuid,
    pub(super) shop_id: Uuid,
    pub(super) name: String,
    pub(super) price: f64,
    pub(super) sku: Option<String>,
    pub(super) stock: i32,
    pub(super) unit: Option<String>,
    pub(super) tax_rate: Option<f64>,
    pub(super) description: Option<String>,
}

#[derive(Debug)]
pub(super) struct NewProduct<'a> {
    pub(super) shop_id: Uuid,
    pub(super) name: &'a str,
    pub(super) price: f64,
    pub(super) sku: Option<&'a str>,
    pub(super) stock: i32,
    pub(super) unit: Option<&'a str>,
    pub(super) tax_rate: Option<f64>,
    pub(super) description: Option<&'a str>,
}

#[derive(Debug)]
pub(super) enum ShopAccess {
    Owned,
    Missing,
    Forbidden,
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn shop_from_row(row: &sqlx::postgres::PgRow) -> ShopRecord {
    ShopRecord {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        domain: row.get("domain"),
        contact_email: row.get("contact_email"),
        address: row.get("address"),
        parent_id: row.get("parent_id"),
    }
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> ProductRecord {
    ProductRecord {
        id: row.get("id"),
        shop_id: row.get("shop_id"),
        name: row.get("name"),
        price: row.get("price"),
        sku: row.get("sku"),
        stock: row.get("stock"),
        unit: row.get("unit"),
        tax_rate: row.get("tax_rate"),
        description: row.get("description"),
    }
}

/// Create a shop for `owner_id`, validating parent ownership atomically
/// with the insert.
pub(super) async fn create_shop(
    pool: &PgPool,
    owner_id: Uuid,
    shop: NewShop<'_>,
) -> Result<CreateShopOutcome> {
    let mut tx = pool.begin().await.context("begin shop transaction")?;

    if let Some(parent_id) = shop.parent_id {
        // FOR SHARE pins the parent row until commit.
        let query = "SELECT owner_id FROM shops WHERE id = $1 FOR SHARE";
        let row = sqlx::query(query)
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup parent shop")?;

        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Ok(CreateShopOutcome::ParentMissing);
        };
        let parent_owner: Uuid = row.get("owner_id");
        if parent_owner != owner_id {
            let _ = tx.rollback().await;
            return Ok(CreateShopOutcome::ParentForbidden);
        }
    }

    let query = r"
        INSERT INTO shops (owner_id, parent_id, name, description, domain, contact_email, address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, name, description, domain, contact_email, address, parent_id
    ";
    let row = sqlx::query(query)
        .bind(owner_id)
        .bind(shop.parent_id)
        .bind(shop.name)
        .bind(shop.description)
        .bind(shop.domain)
        .bind(shop.contact_email)
        .bind(shop.address)
        .fetch_one(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert shop")?;

    let record = shop_from_row(&row);
    tx.commit().await.context("commit shop transaction")?;

    Ok(CreateShopOutcome::Created(record))
}

pub(super) async fn list_shops(pool: &PgPool, owner_id: Uuid) -> Result<Vec<ShopRecord>> {
    let query = r"
        SELECT id, name, description, domain, contact_email, address, parent_id
        FROM shops
        WHERE owner_id = $1
        ORDER BY created_at
    ";
    let rows = sqlx::query(query)
        .bind(owner_id)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to list shops")?;

    Ok(rows.iter().map(shop_from_row).collect())
}

/// Classify the caller's access to a shop.
pub(super) async fn shop_access(
    pool: &PgPool,
    shop_id: Uuid,
    caller_id: Uuid,
) -> Result<ShopAccess> {
    let query = "SELECT owner_id FROM shops WHERE id = $1";
    let row = sqlx::query(query)
        .bind(shop_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup shop owner")?;

    Ok(match row {
        None => ShopAccess::Missing,
        Some(row) => {
            let owner_id: Uuid = row.get("owner_id");
            if owner_id == caller_id {
                ShopAccess::Owned
            } else {
                ShopAccess::Forbidden
            }
        }
    })
}

pub(super) async fn insert_product(
    pool: &PgPool,
    product: NewProduct<'_>,
) -> Result<ProductRecord> {
    let query = r"
        INSERT INTO products (shop_id, name, price, sku, stock, unit, tax_rate, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, shop_id, name, price, sku, stock, unit, tax_rate, description
    ";
    let row = sqlx::query(query)
        .bind(product.shop_id)
        .bind(product.name)
        .bind(product.price)
        .bind(product.sku)
        .bind(product.stock)
        .bind(product.unit)
        .bind(product.tax_rate)
        .bind(product.description)
        .fetch_one(pool)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert product")?;

    Ok(product_from_row(&row))
}

pub(super) async fn list_products(pool: &PgPool, shop_id: Uuid) -> Result<Vec<ProductRecord>> {
    let query = r"
        SELECT id, shop_id, name, price, sku, stock, unit, tax_rate, description
        FROM products
        WHERE shop_id = $1
        ORDER BY created_at
    ";
    let rows = sqlx::query(query)
        .bind(shop_id)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to list products")?;

    Ok(rows.iter().map(product_from_row).collect())
}
