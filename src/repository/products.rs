//! Product persistence and due-product selection.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel_async::RunQueryDsl;

use super::models::{NewProduct, ProductChanges, ProductRecord};
use super::pool::{DbError, DbPool, SqliteConn};
use super::util::{format_timestamp, parse_datetime_opt};
use crate::models::Product;
use crate::schema::products;
use crate::with_conn;

/// A product selected for checking.
#[derive(Debug, Clone, PartialEq)]
pub struct DueProduct {
    pub id: String,
    pub canonical_url: String,
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(QueryableByName, Debug)]
struct DueProductRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    canonical_url: String,
    #[diesel(sql_type = Nullable<Text>)]
    last_success_at: Option<String>,
}

/// Repository for products.
#[derive(Clone)]
pub struct ProductRepository {
    pool: DbPool,
}

impl ProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a product by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Product>, DbError> {
        with_conn!(self.pool, conn, {
            products::table
                .find(id)
                .select(ProductRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Product::from))
        })
    }

    /// Get a product by its canonical URL.
    pub async fn get_by_url(&self, canonical_url: &str) -> Result<Option<Product>, DbError> {
        with_conn!(self.pool, conn, { Self::get_by_url_on(&mut conn, canonical_url).await })
    }

    /// List all products, oldest first.
    pub async fn list(&self) -> Result<Vec<Product>, DbError> {
        with_conn!(self.pool, conn, {
            products::table
                .order(products::created_at.asc())
                .select(ProductRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(Product::from).collect())
        })
    }

    /// Register a product by URL without checking it. Returns the existing
    /// product when the URL is already known.
    pub async fn register(&self, canonical_url: &str) -> Result<Product, DbError> {
        with_conn!(self.pool, conn, {
            if let Some(existing) = Self::get_by_url_on(&mut conn, canonical_url).await? {
                return Ok(existing);
            }
            let product = Product::new(canonical_url);
            Self::insert_on(&mut conn, &product).await?;
            Ok(product)
        })
    }

    pub(crate) async fn get_by_url_on(
        conn: &mut SqliteConn,
        canonical_url: &str,
    ) -> Result<Option<Product>, DbError> {
        products::table
            .filter(products::canonical_url.eq(canonical_url))
            .select(ProductRecord::as_select())
            .first(conn)
            .await
            .optional()
            .map(|r| r.map(Product::from))
    }

    pub(crate) async fn insert_on(conn: &mut SqliteConn, product: &Product) -> Result<(), DbError> {
        let created_at = format_timestamp(product.created_at);
        let updated_at = format_timestamp(product.updated_at);
        diesel::insert_into(products::table)
            .values(&NewProduct {
                id: &product.id,
                canonical_url: &product.canonical_url,
                display_name: product.display_name.as_deref(),
                primary_image_url: product.primary_image_url.as_deref(),
                created_at: &created_at,
                updated_at: &updated_at,
            })
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Create the product for a URL, or refresh its name and image.
    ///
    /// Fields that were not extracted this time keep their stored values.
    /// The update runs first so that inside a transaction the write lock is
    /// taken before anything is read.
    pub(crate) async fn upsert_on(
        conn: &mut SqliteConn,
        canonical_url: &str,
        display_name: Option<&str>,
        primary_image_url: Option<&str>,
    ) -> Result<Product, DbError> {
        let now = format_timestamp(Utc::now());
        let updated = diesel::update(products::table.filter(products::canonical_url.eq(canonical_url)))
            .set(&ProductChanges {
                display_name,
                primary_image_url,
                updated_at: &now,
            })
            .execute(conn)
            .await?;

        if updated == 0 {
            let mut product = Product::new(canonical_url);
            product.display_name = display_name.map(str::to_string);
            product.primary_image_url = primary_image_url.map(str::to_string);
            Self::insert_on(conn, &product).await?;
            return Ok(product);
        }

        Self::get_by_url_on(conn, canonical_url)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Select products that have an active tracker and no successful check
    /// since `cutoff`. Never-checked products come first, then the oldest.
    pub async fn due_for_check(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DueProduct>, DbError> {
        let cutoff = format_timestamp(cutoff);
        with_conn!(self.pool, conn, {
            let rows: Vec<DueProductRow> = diesel::sql_query(
                r#"
                SELECT id, canonical_url, last_success_at FROM (
                    SELECT p.id AS id,
                           p.canonical_url AS canonical_url,
                           p.created_at AS created_at,
                           (SELECT MAX(c.finished_at) FROM check_runs c
                             WHERE c.product_id = p.id AND c.status = 'success') AS last_success_at
                    FROM products p
                    WHERE EXISTS (
                        SELECT 1 FROM trackers t WHERE t.product_id = p.id AND t.active = 1
                    )
                )
                WHERE last_success_at IS NULL OR last_success_at < ?
                ORDER BY last_success_at IS NOT NULL, last_success_at ASC, created_at ASC
                LIMIT ?
                "#,
            )
            .bind::<Text, _>(cutoff)
            .bind::<BigInt, _>(limit as i64)
            .load(&mut conn)
            .await?;

            Ok(rows
                .into_iter()
                .map(|row| DueProduct {
                    id: row.id,
                    canonical_url: row.canonical_url,
                    last_success_at: parse_datetime_opt(row.last_success_at),
                })
                .collect())
        })
    }
}
