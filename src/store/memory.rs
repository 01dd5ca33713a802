//! In-process store
//!
//! Each row carries its own async lock, held by a transaction from the
//! moment the row is loaded until commit or drop. Committed values live
//! behind a separate `RwLock` so snapshot reads never wait on row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use crate::domain::aggregates::{Order, OrderStatus, Product, Shop};
use crate::store::{InsertOutcome, Store, StoreTx};
use crate::{LedgerError, Result};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

struct Row<T> {
    lock: Arc<Mutex<()>>,
    value: RwLock<T>,
}

impl<T: Clone> Row<T> {
    fn new(value: T) -> Arc<Self> {
        Arc::new(Self { lock: Arc::new(Mutex::new(())), value: RwLock::new(value) })
    }

    fn read(&self) -> Result<T> {
        Ok(self.value.read().map_err(poisoned)?.clone())
    }

    fn write(&self, value: T) -> Result<()> {
        *self.value_mut()? = value;
        Ok(())
    }

    fn value_mut(&self) -> Result<RwLockWriteGuard<'_, T>> {
        self.value.write().map_err(poisoned)
    }

    async fn acquire(&self, timeout: Duration) -> Result<OwnedMutexGuard<()>> {
        tokio::time::timeout(timeout, self.lock.clone().lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout)
    }
}

fn poisoned<E>(_: E) -> LedgerError {
    LedgerError::Storage("memory store lock poisoned".to_string())
}

#[derive(Default)]
struct Tables {
    shops: RwLock<HashMap<String, Shop>>,
    products: RwLock<HashMap<String, Arc<Row<Product>>>>,
    orders: RwLock<HashMap<String, Arc<Row<Order>>>>,
    order_numbers: StdMutex<HashSet<String>>,
}

impl Tables {
    fn product(&self, id: &str) -> Result<Option<Arc<Row<Product>>>> {
        Ok(self.products.read().map_err(poisoned)?.get(id).cloned())
    }

    fn order(&self, id: &str) -> Result<Option<Arc<Row<Order>>>> {
        Ok(self.orders.read().map_err(poisoned)?.get(id).cloned())
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new() -> Self { Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT) }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { tables: Arc::new(Tables::default()), lock_timeout }
    }

    async fn clear_one(&self, row: &Row<Product>, now: DateTime<Utc>) -> Result<bool> {
        let _guard = row.acquire(self.lock_timeout).await?;
        let mut product = row.read()?;
        if !product.expire_discount(now) { return Ok(false); }
        row.write(product)?;
        Ok(true)
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx {
            tables: self.tables.clone(),
            lock_timeout: self.lock_timeout,
            products: HashMap::new(),
            orders: HashMap::new(),
            new_orders: Vec::new(),
            reserved_numbers: Vec::new(),
        })
    }

    async fn insert_shop(&self, shop: &Shop) -> Result<()> {
        self.tables.shops.write().map_err(poisoned)?.insert(shop.id().to_string(), shop.clone());
        Ok(())
    }

    async fn find_shop(&self, id: &str) -> Result<Option<Shop>> {
        Ok(self.tables.shops.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.tables.products.write().map_err(poisoned)?.insert(product.id().to_string(), Row::new(product.clone()));
        Ok(())
    }

    async fn find_product(&self, id: &str) -> Result<Option<Product>> {
        self.tables.product(id)?.map(|row| row.read()).transpose()
    }

    async fn find_order(&self, id: &str) -> Result<Option<Order>> {
        self.tables.order(id)?.map(|row| row.read()).transpose()
    }

    async fn clear_expired_discount(&self, product_id: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.tables.product(product_id)? {
            Some(row) => self.clear_one(&row, now).await,
            None => Ok(false),
        }
    }

    async fn clear_expired_discounts(&self, now: DateTime<Utc>) -> Result<u64> {
        let rows: Vec<_> = self.tables.products.read().map_err(poisoned)?.values().cloned().collect();
        let mut cleared = 0;
        for row in rows {
            if self.clear_one(&row, now).await? { cleared += 1; }
        }
        Ok(cleared)
    }

    async fn completed_sales(&self, shop_id: &str, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Decimal> {
        let rows: Vec<_> = self.tables.orders.read().map_err(poisoned)?.values().cloned().collect();
        let mut total = Decimal::ZERO;
        for row in rows {
            let order = row.read()?;
            if order.shop_id() == shop_id
                && order.status() == OrderStatus::Completed
                && order.created_at() >= from
                && order.created_at() < until
            {
                total += order.order_total();
            }
        }
        Ok(total)
    }
}

struct Held<T> {
    row: Arc<Row<T>>,
    staged: Option<T>,
    _guard: OwnedMutexGuard<()>,
}

impl<T: Clone> Held<T> {
    fn current(&self) -> Result<T> {
        match &self.staged {
            Some(value) => Ok(value.clone()),
            None => self.row.read(),
        }
    }
}

pub struct MemoryTx {
    tables: Arc<Tables>,
    lock_timeout: Duration,
    products: HashMap<String, Held<Product>>,
    orders: HashMap<String, Held<Order>>,
    new_orders: Vec<Order>,
    reserved_numbers: Vec<String>,
}

fn not_locked(kind: &str, id: &str) -> LedgerError {
    LedgerError::Storage(format!("{kind} {id} saved without holding its lock"))
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_product(&mut self, id: &str) -> Result<Product> {
        if let Some(held) = self.products.get(id) { return held.current(); }
        let row = self.tables.product(id)?.ok_or(LedgerError::ProductNotFound)?;
        let guard = row.acquire(self.lock_timeout).await?;
        let product = row.read()?;
        self.products.insert(id.to_string(), Held { row, staged: None, _guard: guard });
        Ok(product)
    }

    async fn lock_order(&mut self, id: &str) -> Result<Order> {
        if let Some(held) = self.orders.get(id) { return held.current(); }
        let row = self.tables.order(id)?.ok_or(LedgerError::OrderNotFound)?;
        let guard = row.acquire(self.lock_timeout).await?;
        let order = row.read()?;
        self.orders.insert(id.to_string(), Held { row, staged: None, _guard: guard });
        Ok(order)
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        let held = self.products.get_mut(product.id()).ok_or_else(|| not_locked("product", product.id()))?;
        held.staged = Some(product.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<InsertOutcome> {
        let number = order.order_number().as_str().to_string();
        if !self.tables.order_numbers.lock().map_err(poisoned)?.insert(number.clone()) {
            return Ok(InsertOutcome::DuplicateOrderNumber);
        }
        self.reserved_numbers.push(number);
        self.new_orders.push(order.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        let held = self.orders.get_mut(order.id()).ok_or_else(|| not_locked("order", order.id()))?;
        held.staged = Some(order.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        // Every lock is taken before anything is published, so a poisoned
        // lock fails the commit without a partial write.
        let mut products = Vec::new();
        for held in self.products.values() {
            if let Some(product) = &held.staged { products.push((held.row.value_mut()?, product.clone())); }
        }
        let mut orders = Vec::new();
        for held in self.orders.values() {
            if let Some(order) = &held.staged { orders.push((held.row.value_mut()?, order.clone())); }
        }
        let mut table = self.tables.orders.write().map_err(poisoned)?;

        for (mut slot, product) in products { *slot = product; }
        for (mut slot, order) in orders { *slot = order; }
        for order in self.new_orders.drain(..) {
            table.insert(order.id().to_string(), Row::new(order));
        }
        drop(table);
        self.reserved_numbers.clear();
        Ok(())
    }
}

impl Drop for MemoryTx {
    // Rollback: give back order numbers reserved by uncommitted inserts.
    fn drop(&mut self) {
        if self.reserved_numbers.is_empty() { return; }
        if let Ok(mut numbers) = self.tables.order_numbers.lock() {
            for number in self.reserved_numbers.drain(..) { numbers.remove(&number); }
        }
    }
}
