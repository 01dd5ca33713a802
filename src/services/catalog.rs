//! Catalog Store operations: shops, products, pricing and discount expiry

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;
use crate::domain::aggregates::{PricingUpdate, Product, ProductSummary, Shop};
use crate::services::{Clock, SystemClock};
use crate::store::{Store, StoreTx};
use crate::{LedgerError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1))]
    pub shop_id: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: u32,
    #[validate(length(min = 3, max = 5))]
    pub currency: Option<String>,
    pub new_price: Option<Decimal>,
    pub discount_end_at: Option<DateTime<Utc>>,
}

pub struct Catalog<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> Catalog<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store, clock: Arc::new(SystemClock) } }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self { self.clock = clock; self }

    pub async fn create_shop(&self, name: &str, currency: &str) -> Result<Shop> {
        let shop = Shop::create(name, currency);
        self.store.insert_shop(&shop).await?;
        info!(shop_id = shop.id(), "shop created");
        Ok(shop)
    }

    pub async fn create_product(&self, req: NewProduct) -> Result<Product> {
        let now = self.clock.now();
        let shop = self.store.find_shop(&req.shop_id).await?.ok_or(LedgerError::ShopNotFound)?;
        let currency = req.currency.as_deref().unwrap_or(shop.currency());
        let mut product = Product::create(shop.id(), req.name, req.price, currency)?.with_stock(req.quantity)?;
        let discount = PricingUpdate { new_price: req.new_price, discount_end_at: req.discount_end_at, ..Default::default() };
        product.apply_pricing(&discount, now)?;
        self.store.insert_product(&product).await?;
        info!(product_id = product.id(), shop_id = shop.id(), "product created");
        Ok(product)
    }

    /// Admin edit of price, discount window and stock, under the row lock.
    pub async fn update_pricing(&self, product_id: &str, update: &PricingUpdate) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let mut product = tx.lock_product(product_id).await?;
        product.apply_pricing(update, self.clock.now())?;
        tx.save_product(&product).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Resolve-and-heal: prices the product and clears a discount that
    /// outlived its window.
    pub async fn get_current_price(&self, product_id: &str) -> Result<Decimal> {
        let now = self.clock.now();
        let product = self.heal(product_id).await?;
        Ok(product.current_price(now))
    }

    pub async fn product_summary(&self, product_id: &str) -> Result<ProductSummary> {
        let now = self.clock.now();
        let product = self.heal(product_id).await?;
        Ok(product.summary(now))
    }

    /// Bulk form of the expiry rule, run periodically.
    pub async fn clear_expired_discounts(&self) -> Result<u64> {
        let cleared = self.store.clear_expired_discounts(self.clock.now()).await?;
        if cleared > 0 {
            info!(cleared, "cleared expired discounts");
        }
        Ok(cleared)
    }

    async fn heal(&self, product_id: &str) -> Result<Product> {
        let now = self.clock.now();
        let mut product = self.store.find_product(product_id).await?.ok_or(LedgerError::ProductNotFound)?;
        if product.discount_needs_clearing(now) {
            if self.store.clear_expired_discount(product_id, now).await? {
                debug!(product_id, "expired discount cleared on read");
            }
            product.expire_discount(now);
        }
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ManualClock;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    async fn catalog_with_clock() -> (Catalog<MemoryStore>, Arc<MemoryStore>, Arc<ManualClock>, Shop) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let catalog = Catalog::new(store.clone()).with_clock(clock.clone());
        let shop = catalog.create_shop("Lamp Store", "EUR").await.unwrap();
        (catalog, store, clock, shop)
    }

    fn discounted(shop: &Shop, ends_in: Duration) -> NewProduct {
        NewProduct {
            shop_id: shop.id().to_string(),
            name: "Desk Lamp".into(),
            price: Decimal::new(10000, 2),
            quantity: 3,
            currency: None,
            new_price: Some(Decimal::new(8000, 2)),
            discount_end_at: Some(Utc::now() + ends_in),
        }
    }

    #[tokio::test]
    async fn test_discount_expires_and_heals() {
        let (catalog, store, clock, shop) = catalog_with_clock().await;
        let product = catalog.create_product(discounted(&shop, Duration::hours(1))).await.unwrap();
        assert_eq!(catalog.get_current_price(product.id()).await.unwrap(), Decimal::new(8000, 2));

        clock.advance(Duration::hours(2));
        assert_eq!(catalog.get_current_price(product.id()).await.unwrap(), Decimal::new(10000, 2));
        let stored = store.find_product(product.id()).await.unwrap().unwrap();
        assert!(stored.new_price().is_zero());
        assert_eq!(stored.discount_end_at(), None);
    }

    #[tokio::test]
    async fn test_sweep_clears_only_expired() {
        let (catalog, store, clock, shop) = catalog_with_clock().await;
        let short = catalog.create_product(discounted(&shop, Duration::minutes(10))).await.unwrap();
        let long = catalog.create_product(discounted(&shop, Duration::days(10))).await.unwrap();

        clock.advance(Duration::hours(1));
        assert_eq!(catalog.clear_expired_discounts().await.unwrap(), 1);
        assert_eq!(catalog.clear_expired_discounts().await.unwrap(), 0);
        assert!(store.find_product(short.id()).await.unwrap().unwrap().new_price().is_zero());
        assert_eq!(store.find_product(long.id()).await.unwrap().unwrap().new_price(), Decimal::new(8000, 2));
    }

    #[tokio::test]
    async fn test_heal_and_sweep_time_out_behind_row_lock() {
        let store = Arc::new(MemoryStore::with_lock_timeout(std::time::Duration::from_millis(50)));
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let catalog = Catalog::new(store.clone()).with_clock(clock.clone());
        let shop = catalog.create_shop("Lamp Store", "EUR").await.unwrap();
        let product = catalog.create_product(discounted(&shop, Duration::minutes(5))).await.unwrap();
        clock.advance(Duration::hours(1));

        let mut holder = store.begin().await.unwrap();
        holder.lock_product(product.id()).await.unwrap();
        let err = catalog.get_current_price(product.id()).await.unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout));
        assert!(matches!(catalog.clear_expired_discounts().await, Err(LedgerError::LockTimeout)));

        drop(holder);
        assert_eq!(catalog.get_current_price(product.id()).await.unwrap(), Decimal::new(10000, 2));
    }

    #[tokio::test]
    async fn test_limits_of_storage_are_validated() {
        let (catalog, _, _, shop) = catalog_with_clock().await;
        let req = NewProduct { price: Decimal::new(10_000_000_000, 2), ..discounted(&shop, Duration::hours(1)) };
        assert!(matches!(catalog.create_product(req).await, Err(LedgerError::InvalidAmount(_))));
        let req = NewProduct { quantity: u32::MAX, ..discounted(&shop, Duration::hours(1)) };
        assert!(matches!(catalog.create_product(req).await, Err(LedgerError::InvalidQuantity)));

        let product = catalog.create_product(discounted(&shop, Duration::hours(1))).await.unwrap();
        let update = PricingUpdate { quantity: Some(u32::MAX), ..Default::default() };
        assert!(matches!(catalog.update_pricing(product.id(), &update).await, Err(LedgerError::InvalidQuantity)));
    }

    #[tokio::test]
    async fn test_product_requires_shop() {
        let (catalog, _, _, _) = catalog_with_clock().await;
        let req = NewProduct {
            shop_id: "shop-missing".into(),
            name: "Ghost".into(),
            price: Decimal::ONE,
            quantity: 0,
            currency: None,
            new_price: None,
            discount_end_at: None,
        };
        assert!(matches!(catalog.create_product(req).await, Err(LedgerError::ShopNotFound)));
    }

    #[tokio::test]
    async fn test_pricing_update_and_summary() {
        let (catalog, _, _, shop) = catalog_with_clock().await;
        let product = catalog.create_product(discounted(&shop, Duration::hours(1))).await.unwrap();
        let update = PricingUpdate { price: Some(Decimal::new(16000, 2)), quantity: Some(9), ..Default::default() };
        let updated = catalog.update_pricing(product.id(), &update).await.unwrap();
        assert_eq!(updated.quantity(), 9);

        let summary = catalog.product_summary(product.id()).await.unwrap();
        assert_eq!(summary.current_price, Decimal::new(8000, 2));
        assert_eq!(summary.discount_percentage, Decimal::new(50, 0));
        assert_eq!(summary.currency, "EUR");
        assert_eq!(summary.available_quantity, 9);
    }
}
