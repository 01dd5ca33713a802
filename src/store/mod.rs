//! Persistence seam
//!
//! Every mutation runs inside a [`StoreTx`]: rows are locked exclusively
//! when loaded, staged writes become visible only on `commit`, and a
//! transaction dropped without committing rolls back. Any operation that
//! touches both a product and one of its orders locks the product first.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use crate::domain::aggregates::{Order, Product, Shop};
use crate::Result;

/// Outcome of inserting an order under the unique order-number constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateOrderNumber,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn insert_shop(&self, shop: &Shop) -> Result<()>;
    async fn find_shop(&self, id: &str) -> Result<Option<Shop>>;
    async fn insert_product(&self, product: &Product) -> Result<()>;

    /// Plain snapshot reads; no locks taken.
    async fn find_product(&self, id: &str) -> Result<Option<Product>>;
    async fn find_order(&self, id: &str) -> Result<Option<Order>>;

    /// Clears one product's discount if it outlived its window.
    /// Idempotent; returns whether a row changed.
    async fn clear_expired_discount(&self, product_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Same rule as [`Store::clear_expired_discount`], applied to every product.
    async fn clear_expired_discounts(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Sum of `order_total` over completed orders with `from <= created_at < until`.
    async fn completed_sales(&self, shop_id: &str, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Decimal>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Loads a product and holds its row lock until commit or drop.
    async fn lock_product(&mut self, id: &str) -> Result<Product>;
    async fn lock_order(&mut self, id: &str) -> Result<Order>;

    async fn save_product(&mut self, product: &Product) -> Result<()>;
    async fn insert_order(&mut self, order: &Order) -> Result<InsertOutcome>;
    async fn save_order(&mut self, order: &Order) -> Result<()>;

    async fn commit(self) -> Result<()>;
}
