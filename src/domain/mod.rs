//! Domain model: shops, products, orders and their value objects
pub mod aggregates;
pub mod value_objects;
