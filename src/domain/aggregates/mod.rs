//! Aggregates module
pub mod shop;
pub mod product;
pub mod order;

pub use shop::Shop;
pub use product::{max_amount, PricingUpdate, Product, ProductError, ProductSummary, MAX_QUANTITY};
pub use order::{Order, OrderError, OrderStatus};
