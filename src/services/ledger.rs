//! Order Ledger
//!
//! Places orders and moves them through the status graph. Each operation
//! is a single store transaction; the product row is always locked before
//! any order row.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;
use crate::domain::aggregates::{Order, OrderStatus, MAX_QUANTITY};
use crate::domain::value_objects::{OrderNumberSource, RandomOrderNumbers};
use crate::services::{Clock, SystemClock};
use crate::store::{InsertOutcome, Store, StoreTx};
use crate::{LedgerError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrder {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub shop_id: String,
    #[validate(length(min = 1))]
    pub customer_id: String,
    #[validate(range(min = 1, max = 2147483647))]
    pub quantity: u32,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    /// Only `pending` is accepted when present.
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    /// Rejected unless equal to the stored quantity.
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl From<OrderStatus> for StatusUpdate {
    fn from(status: OrderStatus) -> Self { Self { status, quantity: None } }
}

pub struct OrderLedger<S: Store> {
    store: Arc<S>,
    numbers: Arc<dyn OrderNumberSource>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> OrderLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, numbers: Arc::new(RandomOrderNumbers), clock: Arc::new(SystemClock) }
    }

    pub fn with_order_numbers(mut self, numbers: Arc<dyn OrderNumberSource>) -> Self { self.numbers = numbers; self }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self { self.clock = clock; self }

    pub async fn place_order(&self, req: PlaceOrder) -> Result<Order> {
        if let Some(status) = req.status.filter(|s| *s != OrderStatus::Pending) {
            return Err(LedgerError::InvalidInitialStatus(status));
        }
        if req.quantity == 0 || req.quantity > MAX_QUANTITY { return Err(LedgerError::InvalidQuantity); }
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let mut product = tx.lock_product(&req.product_id).await?;
        if product.shop_id() != req.shop_id {
            return Err(LedgerError::ShopMismatch(req.shop_id));
        }
        let unit_price = product.resolve_price(now);
        product.decrement_stock(req.quantity, now)?;
        tx.save_product(&product).await?;

        let mut order = Order::place(&product, req.customer_id, req.quantity, unit_price, self.numbers.next(now), req.note, now)?;
        if tx.insert_order(&order).await? == InsertOutcome::DuplicateOrderNumber {
            warn!(order_number = %order.order_number(), "order number taken, regenerating");
            order.renumber(self.numbers.next(now));
            if tx.insert_order(&order).await? == InsertOutcome::DuplicateOrderNumber {
                return Err(LedgerError::OrderNumberConflict);
            }
        }
        tx.commit().await?;

        info!(
            order_id = order.id(), order_number = %order.order_number(), product_id = product.id(),
            quantity = order.quantity(), total = %order.order_total(), "order placed"
        );
        Ok(order)
    }

    pub async fn update_order_status(&self, order_id: &str, update: StatusUpdate) -> Result<Order> {
        // product_id never changes, so an unlocked read is enough to find
        // which product row to lock first
        let product_id = self.store.find_order(order_id).await?
            .ok_or(LedgerError::OrderNotFound)?
            .product_id()
            .to_string();
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let mut product = tx.lock_product(&product_id).await?;
        let mut order = tx.lock_order(order_id).await?;
        let from = order.status();

        let restore = order.transition_to(update.status, now)?;
        order.ensure_quantity_unchanged(update.quantity)?;
        if let Some(qty) = restore {
            product.expire_discount(now);
            product.restore_stock(qty, now)?;
            tx.save_product(&product).await?;
        }
        tx.save_order(&order).await?;
        tx.commit().await?;

        info!(order_id, %from, to = %order.status(), restored = restore.unwrap_or(0), "order status updated");
        Ok(order)
    }

    /// Sum of completed order totals for the shop in the given UTC month.
    pub async fn monthly_completed_sales(&self, shop_id: &str, year: i32, month: u32) -> Result<Decimal> {
        let (from, until) = month_bounds(year, month).ok_or(LedgerError::InvalidPeriod { year, month })?;
        self.store.completed_sales(shop_id, from, until).await
    }

    /// Monthly completed sales of the order's shop for the month the order
    /// was placed in; zero unless the order itself is completed.
    pub async fn order_monthly_sales(&self, order_id: &str) -> Result<Decimal> {
        let order = self.store.find_order(order_id).await?.ok_or(LedgerError::OrderNotFound)?;
        if order.status() != OrderStatus::Completed { return Ok(Decimal::ZERO); }
        let placed = order.created_at();
        self.monthly_completed_sales(order.shop_id(), placed.year(), placed.month()).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.store.find_order(order_id).await?.ok_or(LedgerError::OrderNotFound)
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 { NaiveDate::from_ymd_opt(year + 1, 1, 1)? } else { NaiveDate::from_ymd_opt(year, month + 1, 1)? };
    Some((start.and_hms_opt(0, 0, 0)?.and_utc(), next.and_hms_opt(0, 0, 0)?.and_utc()))
}
