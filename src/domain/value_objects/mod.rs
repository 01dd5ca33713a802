//! Value Objects for the shop ledger

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Builds a prefixed, time-ordered record id such as `prod018f3c...`.
pub fn record_id(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::now_v7().simple()).to_lowercase()
}

/// Human-readable order number: `ORD-YYYYMMDD-XXXXX`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    pub const PREFIX: &'static str = "ORD";
    pub const SUFFIX_LEN: usize = 5;
    const CHARSET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    pub fn generate<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: String = (0..Self::SUFFIX_LEN)
            .map(|_| Self::CHARSET[rng.gen_range(0..Self::CHARSET.len())] as char)
            .collect();
        Self(format!("{}-{}-{}", Self::PREFIX, now.format("%Y%m%d"), suffix))
    }

    pub fn parse(value: &str) -> Result<Self, OrderNumberError> {
        let mut parts = value.split('-');
        let (Some(prefix), Some(date), Some(suffix), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(OrderNumberError::Malformed(value.to_string()));
        };
        let date_ok = date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit());
        let suffix_ok = suffix.len() == Self::SUFFIX_LEN
            && suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if prefix != Self::PREFIX || !date_ok || !suffix_ok {
            return Err(OrderNumberError::Malformed(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderNumberError {
    #[error("malformed order number: {0}")]
    Malformed(String),
}

/// Source of fresh order numbers. Swappable so collisions can be forced.
pub trait OrderNumberSource: Send + Sync {
    fn next(&self, now: DateTime<Utc>) -> OrderNumber;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberSource for RandomOrderNumbers {
    fn next(&self, now: DateTime<Utc>) -> OrderNumber {
        OrderNumber::generate(now, &mut rand::thread_rng())
    }
}
