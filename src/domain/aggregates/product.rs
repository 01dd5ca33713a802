//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::record_id;

/// Largest stock or order quantity a row can hold (`INTEGER` column).
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// Largest money amount a row can hold (`NUMERIC(10, 2)` column).
pub fn max_amount() -> Decimal { Decimal::new(9_999_999_999, 2) }

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Product {
    pub(crate) id: String,
    pub(crate) shop_id: String,
    pub(crate) name: String,
    pub(crate) price: Decimal,
    /// Discounted price; zero means no discount.
    pub(crate) new_price: Decimal,
    pub(crate) discount_end_at: Option<DateTime<Utc>>,
    pub(crate) quantity: u32,
    pub(crate) currency: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

/// Admin edit of price, discount and stock. `None` leaves a field as is.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PricingUpdate {
    pub price: Option<Decimal>,
    pub new_price: Option<Decimal>,
    pub discount_end_at: Option<DateTime<Utc>>,
    pub quantity: Option<u32>,
}

/// Attributes shown on a product detail card.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductSummary {
    pub name: String,
    pub current_price: Decimal,
    pub price: Decimal,
    pub currency: String,
    pub available_quantity: u32,
    pub discount_percentage: Decimal,
    pub savings: Decimal,
    pub discount_end_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn create(shop_id: impl Into<String>, name: impl Into<String>, price: Decimal, currency: &str) -> Result<Self, ProductError> {
        check_amount(price)?;
        let now = Utc::now();
        Ok(Self {
            id: record_id("prod"), shop_id: shop_id.into(), name: name.into(),
            price: price.round_dp(2), new_price: Decimal::ZERO, discount_end_at: None, quantity: 0,
            currency: currency.to_string(), created_at: now, updated_at: now,
        })
    }

    pub fn with_stock(mut self, quantity: u32) -> Result<Self, ProductError> {
        self.quantity = check_stock(quantity)?;
        Ok(self)
    }

    pub fn with_discount(mut self, new_price: Decimal, ends_at: DateTime<Utc>) -> Result<Self, ProductError> {
        check_amount(new_price)?;
        self.new_price = new_price.round_dp(2);
        self.discount_end_at = Some(ends_at);
        Ok(self)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn shop_id(&self) -> &str { &self.shop_id }
    pub fn name(&self) -> &str { &self.name }
    pub fn price(&self) -> Decimal { self.price }
    pub fn new_price(&self) -> Decimal { self.new_price }
    pub fn discount_end_at(&self) -> Option<DateTime<Utc>> { self.discount_end_at }
    pub fn quantity(&self) -> u32 { self.quantity }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// A missing end date counts as expired: a discount needs a window.
    pub fn is_discount_expired(&self, now: DateTime<Utc>) -> bool {
        match self.discount_end_at {
            None => true,
            Some(ends_at) => now > ends_at,
        }
    }

    pub fn is_discount_active(&self, now: DateTime<Utc>) -> bool {
        self.new_price > Decimal::ZERO && self.new_price < self.price && !self.is_discount_expired(now)
    }

    pub fn current_price(&self, now: DateTime<Utc>) -> Decimal {
        if self.is_discount_active(now) { self.new_price } else { self.price }
    }

    /// True when stored discount fields outlived their window.
    /// The bulk sweep in the stores applies the same predicate.
    pub fn discount_needs_clearing(&self, now: DateTime<Utc>) -> bool {
        self.is_discount_expired(now) && (!self.new_price.is_zero() || self.discount_end_at.is_some())
    }

    /// Clears an expired discount. Idempotent; returns whether anything changed.
    pub fn expire_discount(&mut self, now: DateTime<Utc>) -> bool {
        if !self.discount_needs_clearing(now) { return false; }
        self.new_price = Decimal::ZERO;
        self.discount_end_at = None;
        self.touch(now);
        true
    }

    /// Heals an expired discount, then prices the product.
    pub fn resolve_price(&mut self, now: DateTime<Utc>) -> Decimal {
        self.expire_discount(now);
        self.current_price(now)
    }

    pub fn discount_percentage(&self, now: DateTime<Utc>) -> Decimal {
        if !self.is_discount_active(now) || self.price.is_zero() { return Decimal::ZERO; }
        ((self.price - self.new_price) / self.price * Decimal::ONE_HUNDRED).round()
    }

    pub fn savings(&self, now: DateTime<Utc>) -> Decimal {
        if self.is_discount_active(now) { self.price - self.new_price } else { Decimal::ZERO }
    }

    pub fn decrement_stock(&mut self, qty: u32, now: DateTime<Utc>) -> Result<(), ProductError> {
        if qty > self.quantity {
            return Err(ProductError::InsufficientStock { requested: qty, available: self.quantity });
        }
        self.quantity -= qty;
        self.touch(now);
        Ok(())
    }

    /// Over-restoring is a caller bug and not checked here, but the result
    /// must still fit a stock row.
    pub fn restore_stock(&mut self, qty: u32, now: DateTime<Utc>) -> Result<(), ProductError> {
        let restored = self.quantity.checked_add(qty).ok_or(ProductError::StockTooLarge(u64::from(self.quantity) + u64::from(qty)))?;
        self.quantity = check_stock(restored)?;
        self.touch(now);
        Ok(())
    }

    pub fn apply_pricing(&mut self, update: &PricingUpdate, now: DateTime<Utc>) -> Result<(), ProductError> {
        if let Some(price) = update.price { check_amount(price)?; self.price = price.round_dp(2); }
        if let Some(new_price) = update.new_price { check_amount(new_price)?; self.new_price = new_price.round_dp(2); }
        if update.discount_end_at.is_some() { self.discount_end_at = update.discount_end_at; }
        if let Some(quantity) = update.quantity { self.quantity = check_stock(quantity)?; }
        self.touch(now);
        self.expire_discount(now);
        Ok(())
    }

    pub fn summary(&self, now: DateTime<Utc>) -> ProductSummary {
        ProductSummary {
            name: self.name.clone(),
            current_price: self.current_price(now),
            price: self.price,
            currency: self.currency.clone(),
            available_quantity: self.quantity,
            discount_percentage: self.discount_percentage(now),
            savings: self.savings(now),
            discount_end_at: self.discount_end_at.filter(|_| self.is_discount_active(now)),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

fn check_amount(amount: Decimal) -> Result<(), ProductError> {
    if amount.is_sign_negative() { return Err(ProductError::NegativeAmount(amount)); }
    if amount.round_dp(2) > max_amount() { return Err(ProductError::AmountTooLarge(amount)); }
    Ok(())
}

fn check_stock(quantity: u32) -> Result<u32, ProductError> {
    if quantity > MAX_QUANTITY { Err(ProductError::StockTooLarge(u64::from(quantity))) } else { Ok(quantity) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("amount must not be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("amount {0} exceeds the largest storable price")]
    AmountTooLarge(Decimal),

    #[error("stock of {0} exceeds the largest storable quantity")]
    StockTooLarge(u64),
}
