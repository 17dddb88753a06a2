//! Postgres-backed product store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed | N/A | `Backend` |
//! | ColumnDecode / Decode | N/A | `Decode` |
//! | Other | N/A | `Backend` |
//!
//! ## Atomicity
//!
//! Both write paths are single statements: the insert relies on the unique
//! index on `name` (`ON CONFLICT DO NOTHING`), and the price swap carries the
//! expected price in its `WHERE` clause. No transaction spans a lookup and a
//! write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use pricefeed_core::ProductId;
use pricefeed_products::{ListQuery, Product};

use super::r#trait::{InsertOutcome, PriceSwap, ProductStore, StoreError};

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        price_update_count BIGINT NOT NULL DEFAULT 0 CHECK (price_update_count >= 0)
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS products_name_key ON products (name)",
];

const COLUMNS: &str = "id, name, price, updated_at, price_update_count";

/// Postgres-backed product store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and shared by every
/// pipeline stage.
#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    /// Create a new store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the `products` table and its unique name index if absent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_price(&self, id: ProductId) -> Result<Option<f64>, StoreError> {
        let row = sqlx::query("SELECT price FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_price", e))?;

        row.map(|r| {
            r.try_get::<f64, _>("price")
                .map_err(|e| StoreError::Decode(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self), err)]
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM products WHERE name = $1"))
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_name", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(
        skip(self, product),
        fields(
            name = %product.name(),
            product_id = %product.id_typed(),
            outcome = tracing::field::Empty
        ),
        err
    )]
    async fn insert_if_absent(&self, product: Product) -> Result<InsertOutcome, StoreError> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO products ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.price())
        .bind(product.updated_at())
        .bind(i64::from(product.price_update_count()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_if_absent", e))?;

        if let Some(row) = inserted {
            Span::current().record("outcome", "inserted");
            return product_from_row(&row).map(InsertOutcome::Inserted);
        }

        match self.find_by_name(product.name()).await? {
            Some(existing) => {
                Span::current().record("outcome", "existing");
                Ok(InsertOutcome::Existing(existing))
            }
            None => Err(StoreError::Conflict(format!(
                "name '{}' was taken and released during insert",
                product.name()
            ))),
        }
    }

    #[instrument(skip(self, at), err)]
    async fn swap_price(
        &self,
        id: ProductId,
        expected: f64,
        new_price: f64,
        at: DateTime<Utc>,
    ) -> Result<PriceSwap, StoreError> {
        let swapped = sqlx::query(&format!(
            r#"
            UPDATE products
            SET price = $3,
                updated_at = $4,
                price_update_count = price_update_count + 1
            WHERE id = $1 AND price = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(expected)
        .bind(new_price)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("swap_price", e))?;

        if let Some(row) = swapped {
            return product_from_row(&row).map(PriceSwap::Swapped);
        }

        Ok(match self.fetch_price(id).await? {
            Some(current) => PriceSwap::Stale(current),
            None => PriceSwap::Missing,
        })
    }

    #[instrument(skip(self), fields(offset = query.skip(), limit = query.limit()), err)]
    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM products ORDER BY {} LIMIT $1 OFFSET $2",
            order_by_clause(query)
        );
        let offset = i64::try_from(query.skip())
            .map_err(|_| StoreError::Rejected("page offset out of range".to_string()))?;

        let rows = sqlx::query(&sql)
            .bind(i64::from(query.limit()))
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(product_from_row).collect()
    }
}

/// Build the `ORDER BY` list. Column names come from the closed `SortField`
/// set, never from caller text.
fn order_by_clause(query: &ListQuery) -> String {
    query
        .order_by
        .iter()
        .map(|key| format!("{} {}", key.field.as_str(), key.direction.as_sql()))
        .chain(std::iter::once("id ASC".to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());

    let id: uuid::Uuid = row.try_get("id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let price: f64 = row.try_get("price").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;
    let count: i64 = row.try_get("price_update_count").map_err(decode)?;
    let count = u32::try_from(count)
        .map_err(|_| StoreError::Decode(format!("price_update_count {count} out of range")))?;

    Ok(Product::restore(
        ProductId::from_uuid(id),
        name,
        price,
        updated_at,
        count,
    ))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("decode error in {}: {}", operation, err))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
