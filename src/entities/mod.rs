pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod customer;
pub mod email;
pub mod inventory_allocation;
pub mod inventory_log;
pub mod inventory_stock;
pub mod order;
pub mod order_item;
pub mod permission;
pub mod product;
pub mod product_category;
pub mod role;
pub mod role_permission;
pub mod supplier;
pub mod user;
pub mod user_activity;
pub mod user_role;
pub mod warehouse;
