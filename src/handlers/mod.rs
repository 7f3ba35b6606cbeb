//! HTTP handlers, one module per resource group under `/api/v1`.

pub mod auth;
pub mod carts;
pub mod categories;
pub mod common;
pub mod coupons;
pub mod customers;
pub mod emails;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod roles;
pub mod suppliers;
pub mod user_activity;
pub mod users;
