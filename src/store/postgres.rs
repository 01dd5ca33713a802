//! PostgreSQL store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a transaction whose
//! `lock_timeout` is set locally, so a blocked lock wait surfaces as
//! [`LedgerError::LockTimeout`] instead of hanging the request. Writes
//! outside a [`PgTx`], such as the discount clears, still go through
//! [`Store::begin`] to get the same timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use crate::domain::aggregates::{Order, Product, Shop};
use crate::domain::value_objects::OrderNumber;
use crate::store::{InsertOutcome, Store, StoreTx};
use crate::{LedgerError, Result};

const PRODUCT_COLUMNS: &str =
    "id, shop_id, name, price, new_price, discount_end_at, quantity, currency, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, product_id, shop_id, customer_id, quantity, unit_price, order_total, \
     order_number, status, note, created_at, updated_at";

/// Mirrors `Product::discount_needs_clearing`; `$1` is the current time.
const DISCOUNT_NEEDS_CLEARING: &str =
    "(discount_end_at IS NULL OR discount_end_at < $1) AND (new_price <> 0 OR discount_end_at IS NOT NULL)";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    shop_id: String,
    name: String,
    price: Decimal,
    new_price: Decimal,
    discount_end_at: Option<DateTime<Utc>>,
    quantity: i32,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = LedgerError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            quantity: from_db_count(r.quantity, "products.quantity")?,
            id: r.id, shop_id: r.shop_id, name: r.name, price: r.price, new_price: r.new_price,
            discount_end_at: r.discount_end_at, currency: r.currency,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    product_id: String,
    shop_id: String,
    customer_id: String,
    quantity: i32,
    unit_price: Decimal,
    order_total: Decimal,
    order_number: String,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerError;
    fn try_from(r: OrderRow) -> Result<Self> {
        Ok(Order {
            quantity: from_db_count(r.quantity, "orders.quantity")?,
            order_number: OrderNumber::parse(&r.order_number).map_err(|e| LedgerError::Storage(e.to_string()))?,
            status: r.status.parse()?,
            id: r.id, product_id: r.product_id, shop_id: r.shop_id, customer_id: r.customer_id,
            unit_price: r.unit_price, order_total: r.order_total, note: r.note,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

fn from_db_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| LedgerError::Storage(format!("{column} is negative: {value}")))
}

fn to_db_count(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| LedgerError::Storage(format!("count {value} exceeds column range")))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self { Self { pool, lock_timeout } }

    pub async fn connect(url: &str, max_connections: u32, lock_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let mut tx = self.pool.begin().await?;
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis().max(1));
        sqlx::query(&set_timeout).execute(&mut *tx).await?;
        Ok(PgTx { tx })
    }

    async fn insert_shop(&self, shop: &Shop) -> Result<()> {
        sqlx::query("INSERT INTO shops (id, name, currency, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(&shop.id).bind(&shop.name).bind(&shop.currency).bind(shop.created_at).bind(shop.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn find_shop(&self, id: &str) -> Result<Option<Shop>> {
        let shop = sqlx::query_as::<_, Shop>("SELECT id, name, currency, created_at, updated_at FROM shops WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(shop)
    }

    async fn insert_product(&self, p: &Product) -> Result<()> {
        let sql = format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)");
        sqlx::query(&sql)
            .bind(&p.id).bind(&p.shop_id).bind(&p.name).bind(p.price).bind(p.new_price)
            .bind(p.discount_end_at).bind(to_db_count(p.quantity)?).bind(&p.currency)
            .bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn find_product(&self, id: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn find_order(&self, id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn clear_expired_discount(&self, product_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let sql = format!(
            "UPDATE products SET new_price = 0, discount_end_at = NULL, updated_at = $1 \
             WHERE id = $2 AND {DISCOUNT_NEEDS_CLEARING}"
        );
        let mut tx = self.begin().await?;
        let done = sqlx::query(&sql).bind(now).bind(product_id).execute(&mut *tx.tx).await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    async fn clear_expired_discounts(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "UPDATE products SET new_price = 0, discount_end_at = NULL, updated_at = $1 WHERE {DISCOUNT_NEEDS_CLEARING}"
        );
        let mut tx = self.begin().await?;
        let done = sqlx::query(&sql).bind(now).execute(&mut *tx.tx).await?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }

    async fn completed_sales(&self, shop_id: &str, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(order_total), 0) FROM orders \
             WHERE shop_id = $1 AND status = 'completed' AND created_at >= $2 AND created_at < $3",
        )
        .bind(shop_id).bind(from).bind(until)
        .fetch_one(&self.pool).await?;
        Ok(total)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product(&mut self, id: &str) -> Result<Product> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id).fetch_optional(&mut *self.tx).await?
            .ok_or(LedgerError::ProductNotFound)?
            .try_into()
    }

    async fn lock_order(&mut self, id: &str) -> Result<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id).fetch_optional(&mut *self.tx).await?
            .ok_or(LedgerError::OrderNotFound)?
            .try_into()
    }

    async fn save_product(&mut self, p: &Product) -> Result<()> {
        sqlx::query(
            "UPDATE products SET price = $2, new_price = $3, discount_end_at = $4, quantity = $5, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(&p.id).bind(p.price).bind(p.new_price).bind(p.discount_end_at)
        .bind(to_db_count(p.quantity)?).bind(p.updated_at)
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_order(&mut self, o: &Order) -> Result<InsertOutcome> {
        let sql = format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (order_number) DO NOTHING"
        );
        let done = sqlx::query(&sql)
            .bind(&o.id).bind(&o.product_id).bind(&o.shop_id).bind(&o.customer_id)
            .bind(to_db_count(o.quantity)?).bind(o.unit_price).bind(o.order_total)
            .bind(o.order_number.as_str()).bind(o.status.as_str()).bind(&o.note)
            .bind(o.created_at).bind(o.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(if done.rows_affected() == 0 { InsertOutcome::DuplicateOrderNumber } else { InsertOutcome::Inserted })
    }

    async fn save_order(&mut self, o: &Order) -> Result<()> {
        // quantity and pricing columns are never rewritten after insert
        sqlx::query("UPDATE orders SET status = $2, note = $3, updated_at = $4 WHERE id = $1")
            .bind(&o.id).bind(o.status.as_str()).bind(&o.note).bind(o.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
