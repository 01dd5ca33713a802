//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::domain::aggregates::product::{max_amount, Product, MAX_QUANTITY};
use crate::domain::value_objects::{record_id, OrderNumber};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    pub(crate) id: String,
    pub(crate) product_id: String,
    pub(crate) shop_id: String,
    pub(crate) customer_id: String,
    pub(crate) quantity: u32,
    pub(crate) unit_price: Decimal,
    pub(crate) order_total: Decimal,
    pub(crate) order_number: OrderNumber,
    pub(crate) status: OrderStatus,
    pub(crate) note: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Processing, Self::Shipped, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Processing, Self::Shipped, Self::Completed, Self::Cancelled],
            Self::Processing => &[Self::Shipped, Self::Completed, Self::Cancelled],
            Self::Shipped => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool { self.allowed_transitions().is_empty() }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool { self.allowed_transitions().contains(&next) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl Order {
    /// Opens a pending order, snapshotting `unit_price` into the total.
    pub fn place(
        product: &Product,
        customer_id: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
        order_number: OrderNumber,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if quantity == 0 || quantity > MAX_QUANTITY { return Err(OrderError::InvalidQuantity); }
        let order_total = unit_price
            .checked_mul(Decimal::from(quantity))
            .map(|total| total.round_dp(2))
            .filter(|total| *total <= max_amount())
            .ok_or_else(|| OrderError::TotalTooLarge(unit_price.saturating_mul(Decimal::from(quantity))))?;
        Ok(Self {
            id: record_id("ord"),
            product_id: product.id().to_string(),
            shop_id: product.shop_id().to_string(),
            customer_id: customer_id.into(),
            quantity,
            unit_price,
            order_total,
            order_number,
            status: OrderStatus::Pending,
            note,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn product_id(&self) -> &str { &self.product_id }
    pub fn shop_id(&self) -> &str { &self.shop_id }
    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn quantity(&self) -> u32 { self.quantity }
    pub fn unit_price(&self) -> Decimal { self.unit_price }
    pub fn order_total(&self) -> Decimal { self.order_total }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn note(&self) -> Option<&str> { self.note.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub(crate) fn renumber(&mut self, order_number: OrderNumber) { self.order_number = order_number; }

    /// Quantity is fixed at creation; a differing value is rejected.
    pub fn ensure_quantity_unchanged(&self, requested: Option<u32>) -> Result<(), OrderError> {
        match requested {
            Some(qty) if qty != self.quantity => Err(OrderError::ImmutableField("quantity")),
            _ => Ok(()),
        }
    }

    /// Moves to `next`. Returns the units to hand back to stock when the
    /// move cancels the order.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<Option<u32>, OrderError> {
        let from = self.status;
        if from.is_terminal() || (next != from && !from.can_transition_to(next)) {
            return Err(OrderError::InvalidTransition { from, to: next });
        }
        let restore = (next == OrderStatus::Cancelled && from != OrderStatus::Cancelled).then_some(self.quantity);
        self.status = next;
        self.updated_at = now;
        Ok(restore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("invalid status change: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0} cannot change after creation")]
    ImmutableField(&'static str),

    #[error("quantity must be between 1 and 2147483647")]
    InvalidQuantity,

    #[error("order total {0} exceeds the largest storable amount")]
    TotalTooLarge(Decimal),

    #[error("unknown order status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{OrderNumberSource, RandomOrderNumbers};

    fn order(qty: u32) -> Order {
        let now = Utc::now();
        let product = Product::create("shop1", "Widget", Decimal::new(1250, 2), "EUR").unwrap().with_stock(10).unwrap();
        Order::place(&product, "cust1", qty, product.current_price(now), RandomOrderNumbers.next(now), None, now).unwrap()
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order(3);
        assert_eq!(o.status(), OrderStatus::Pending);
        assert_eq!(o.order_total(), Decimal::new(3750, 2));
        assert_eq!(o.transition_to(OrderStatus::Processing, Utc::now()), Ok(None));
        assert_eq!(o.transition_to(OrderStatus::Shipped, Utc::now()), Ok(None));
        assert_eq!(o.transition_to(OrderStatus::Cancelled, Utc::now()), Ok(Some(3)));
        assert_eq!(o.quantity(), 3);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [OrderStatus::Completed, OrderStatus::Cancelled] {
            for next in OrderStatus::ALL {
                let mut o = order(1);
                o.status = terminal;
                assert_eq!(
                    o.transition_to(next, Utc::now()),
                    Err(OrderError::InvalidTransition { from: terminal, to: next })
                );
            }
        }
    }

    #[test]
    fn test_no_backwards_moves() {
        let mut o = order(1);
        o.status = OrderStatus::Shipped;
        assert!(o.transition_to(OrderStatus::Processing, Utc::now()).is_err());
        assert!(o.transition_to(OrderStatus::Pending, Utc::now()).is_err());
        assert_eq!(o.transition_to(OrderStatus::Shipped, Utc::now()), Ok(None));
    }

    #[test]
    fn test_quantity_is_immutable() {
        let o = order(2);
        assert_eq!(o.ensure_quantity_unchanged(Some(3)), Err(OrderError::ImmutableField("quantity")));
        assert!(o.ensure_quantity_unchanged(Some(2)).is_ok());
        assert!(o.ensure_quantity_unchanged(None).is_ok());
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let now = Utc::now();
        let product = Product::create("shop1", "Widget", Decimal::ONE, "EUR").unwrap();
        let res = Order::place(&product, "cust1", 0, Decimal::ONE, RandomOrderNumbers.next(now), None, now);
        assert_eq!(res, Err(OrderError::InvalidQuantity));
    }

    #[test]
    fn test_total_must_fit_storage() {
        let now = Utc::now();
        let price = Decimal::new(9_000_000_000, 2);
        let product = Product::create("shop1", "Villa", price, "EUR").unwrap();
        let res = Order::place(&product, "cust1", 2, price, RandomOrderNumbers.next(now), None, now);
        assert_eq!(res, Err(OrderError::TotalTooLarge(Decimal::new(18_000_000_000, 2))));
        assert!(Order::place(&product, "cust1", 1, price, RandomOrderNumbers.next(now), None, now).is_ok());

        let cheap = Product::create("shop1", "Pin", Decimal::ZERO, "EUR").unwrap();
        let res = Order::place(&cheap, "cust1", MAX_QUANTITY + 1, Decimal::ZERO, RandomOrderNumbers.next(now), None, now);
        assert_eq!(res, Err(OrderError::InvalidQuantity));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Completed".parse::<OrderStatus>(), Ok(OrderStatus::Completed));
        assert!("refunded".parse::<OrderStatus>().is_err());
    }
}
