//! Catalog and order ledger operations over a [`crate::store::Store`]
pub mod catalog;
pub mod ledger;

pub use catalog::{Catalog, NewProduct};
pub use ledger::{OrderLedger, PlaceOrder, StatusUpdate};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}
