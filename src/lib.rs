//! Shop Ledger
//!
//! Multi-tenant shop catalog and order ledger.
//!
//! ## Features
//! - Product pricing with time-bounded discounts and lazy expiry
//! - Order placement with row-locked stock reservation
//! - Order status workflow with stock restore on cancellation
//! - Monthly completed-sales reporting per shop

pub mod api;
pub mod config;
pub mod domain;
pub mod services;
pub mod store;

pub use domain::aggregates::{Order, OrderStatus, PricingUpdate, Product, ProductSummary, Shop};
pub use domain::value_objects::{OrderNumber, OrderNumberSource, RandomOrderNumbers};
pub use services::{Catalog, OrderLedger, PlaceOrder, StatusUpdate};
pub use store::{memory::MemoryStore, postgres::PgStore, Store, StoreTx};

use domain::aggregates::{OrderError, ProductError};
use rust_decimal::Decimal;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Shop not found")]
    ShopNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Only {available} in stock, {requested} requested")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("Invalid status change: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot change {0} after creation")]
    ImmutableField(&'static str),

    #[error("Orders can only be created as pending, got {0}")]
    InvalidInitialStatus(OrderStatus),

    #[error("Quantity must be between 1 and 2147483647")]
    InvalidQuantity,

    #[error("Amount out of range: {0}")]
    InvalidAmount(Decimal),

    #[error("Product does not belong to shop {0}")]
    ShopMismatch(String),

    #[error("Invalid reporting period {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Order number collided twice")]
    OrderNumberConflict,

    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether retrying the whole operation from scratch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout | Self::OrderNumberConflict)
    }
}

impl From<ProductError> for LedgerError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::InsufficientStock { requested, available } => Self::InsufficientStock { requested, available },
            ProductError::NegativeAmount(amount) | ProductError::AmountTooLarge(amount) => Self::InvalidAmount(amount),
            ProductError::StockTooLarge(_) => Self::InvalidQuantity,
        }
    }
}

impl From<OrderError> for LedgerError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::ImmutableField(field) => Self::ImmutableField(field),
            OrderError::InvalidQuantity => Self::InvalidQuantity,
            OrderError::TotalTooLarge(total) => Self::InvalidAmount(total),
            OrderError::UnknownStatus(s) => Self::Storage(format!("unknown order status {s}")),
        }
    }
}

/// SQLSTATEs that mean "another transaction holds the row, try again".
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if let Some(code) = db.code() {
                if [LOCK_NOT_AVAILABLE, DEADLOCK_DETECTED, SERIALIZATION_FAILURE].contains(&&*code) {
                    return Self::LockTimeout;
                }
            }
        }
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
