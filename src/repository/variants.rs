//! Variant persistence.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewVariant, VariantRecord};
use super::pool::{DbError, DbPool, SqliteConn};
use super::util::{format_timestamp, to_diesel_error};
use crate::models::{Price, StockStatus, Variant};
use crate::schema::variants;
use crate::with_conn;

/// Repository for product variants.
#[derive(Clone)]
pub struct VariantRepository {
    pool: DbPool,
}

impl VariantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a variant by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Variant>, DbError> {
        with_conn!(self.pool, conn, {
            variants::table
                .find(id)
                .select(VariantRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Variant::from))
        })
    }

    /// All variants of a product in creation order.
    pub async fn list_for_product(&self, product_id: &str) -> Result<Vec<Variant>, DbError> {
        with_conn!(self.pool, conn, {
            Self::list_for_product_on(&mut conn, product_id).await
        })
    }

    pub(crate) async fn list_for_product_on(
        conn: &mut SqliteConn,
        product_id: &str,
    ) -> Result<Vec<Variant>, DbError> {
        variants::table
            .filter(variants::product_id.eq(product_id))
            .order((variants::created_at.asc(), variants::id.asc()))
            .select(VariantRecord::as_select())
            .load(conn)
            .await
            .map(|records| records.into_iter().map(Variant::from).collect())
    }

    pub(crate) async fn insert_on(conn: &mut SqliteConn, variant: &Variant) -> Result<(), DbError> {
        let attributes = serde_json::to_string(&variant.attributes).map_err(to_diesel_error)?;
        let created_at = format_timestamp(variant.created_at);
        let updated_at = format_timestamp(variant.updated_at);
        let price = variant.current_price.as_ref();
        diesel::insert_into(variants::table)
            .values(&NewVariant {
                id: &variant.id,
                product_id: &variant.product_id,
                attributes: &attributes,
                sku: variant.sku.as_deref(),
                current_price_minor: price.map(|p| p.amount_minor),
                currency: price.and_then(|p| p.currency.as_deref()),
                current_stock_status: variant.current_stock_status.as_str(),
                created_at: &created_at,
                updated_at: &updated_at,
            })
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Record a SKU learned after the variant was created.
    pub(crate) async fn set_sku_on(
        conn: &mut SqliteConn,
        variant_id: &str,
        sku: &str,
    ) -> Result<(), DbError> {
        diesel::update(variants::table.find(variant_id))
            .set(variants::sku.eq(sku))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Bump `updated_at`. Inside a transaction this takes the write lock.
    pub(crate) async fn touch_on(conn: &mut SqliteConn, variant_id: &str) -> Result<(), DbError> {
        diesel::update(variants::table.find(variant_id))
            .set(variants::updated_at.eq(format_timestamp(Utc::now())))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Overwrite the current price and stock columns.
    pub(crate) async fn update_current_on(
        conn: &mut SqliteConn,
        variant_id: &str,
        price: Option<&Price>,
        stock: StockStatus,
    ) -> Result<(), DbError> {
        let now = format_timestamp(Utc::now());
        match price {
            Some(price) => {
                diesel::update(variants::table.find(variant_id))
                    .set((
                        variants::current_price_minor.eq(Some(price.amount_minor)),
                        variants::currency.eq(price.currency.as_deref()),
                        variants::current_stock_status.eq(stock.as_str()),
                        variants::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;
            }
            None => {
                diesel::update(variants::table.find(variant_id))
                    .set((
                        variants::current_stock_status.eq(stock.as_str()),
                        variants::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;
            }
        }
        Ok(())
    }
}
