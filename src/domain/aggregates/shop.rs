//! Shop Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::domain::value_objects::record_id;

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Shop {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) currency: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Shop {
    pub fn create(name: impl Into<String>, currency: &str) -> Self {
        let now = Utc::now();
        Self { id: record_id("shop"), name: name.into(), currency: currency.to_string(), created_at: now, updated_at: now }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn currency(&self) -> &str { &self.currency }
}
