//! Permission catalog.
//!
//! Permissions are `resource:action` strings. Routes reference the constants in
//! [`consts`]; [`ALL_PERMISSIONS`] and [`DEFAULT_ROLES`] seed a fresh database.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Role that bypasses every permission check
pub const ADMIN_ROLE: &str = "admin";

pub mod consts {
    pub const USERS_READ: &str = "users:read";
    pub const USERS_CREATE: &str = "users:create";
    pub const USERS_UPDATE: &str = "users:update";
    pub const USERS_DELETE: &str = "users:delete";

    pub const ROLES_READ: &str = "roles:read";
    pub const ROLES_MANAGE: &str = "roles:manage";

    pub const CATEGORIES_READ: &str = "categories:read";
    pub const CATEGORIES_CREATE: &str = "categories:create";
    pub const CATEGORIES_UPDATE: &str = "categories:update";
    pub const CATEGORIES_DELETE: &str = "categories:delete";

    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_CREATE: &str = "customers:create";
    pub const CUSTOMERS_UPDATE: &str = "customers:update";
    pub const CUSTOMERS_DELETE: &str = "customers:delete";

    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_UPDATE: &str = "orders:update";
    pub const ORDERS_DELETE: &str = "orders:delete";

    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_CREATE: &str = "products:create";
    pub const PRODUCTS_UPDATE: &str = "products:update";
    pub const PRODUCTS_DELETE: &str = "products:delete";

    pub const INVENTORY_READ: &str = "inventory:read";
    pub const INVENTORY_ADJUST: &str = "inventory:adjust";
    pub const INVENTORY_TRANSFER: &str = "inventory:transfer";
    pub const INVENTORY_ALLOCATE: &str = "inventory:allocate";

    pub const SUPPLIERS_READ: &str = "suppliers:read";
    pub const SUPPLIERS_CREATE: &str = "suppliers:create";
    pub const SUPPLIERS_UPDATE: &str = "suppliers:update";
    pub const SUPPLIERS_DELETE: &str = "suppliers:delete";

    pub const COUPONS_READ: &str = "coupons:read";
    pub const COUPONS_CREATE: &str = "coupons:create";
    pub const COUPONS_UPDATE: &str = "coupons:update";
    pub const COUPONS_DELETE: &str = "coupons:delete";

    pub const EMAILS_READ: &str = "emails:read";
    pub const EMAILS_SEND: &str = "emails:send";
    pub const EMAILS_DELETE: &str = "emails:delete";

    pub const ACTIVITY_READ: &str = "activity:read";
}

use consts::*;

pub const ALL_PERMISSIONS: &[&str] = &[
    USERS_READ,
    USERS_CREATE,
    USERS_UPDATE,
    USERS_DELETE,
    ROLES_READ,
    ROLES_MANAGE,
    CATEGORIES_READ,
    CATEGORIES_CREATE,
    CATEGORIES_UPDATE,
    CATEGORIES_DELETE,
    CUSTOMERS_READ,
    CUSTOMERS_CREATE,
    CUSTOMERS_UPDATE,
    CUSTOMERS_DELETE,
    ORDERS_READ,
    ORDERS_CREATE,
    ORDERS_UPDATE,
    ORDERS_DELETE,
    PRODUCTS_READ,
    PRODUCTS_CREATE,
    PRODUCTS_UPDATE,
    PRODUCTS_DELETE,
    INVENTORY_READ,
    INVENTORY_ADJUST,
    INVENTORY_TRANSFER,
    INVENTORY_ALLOCATE,
    SUPPLIERS_READ,
    SUPPLIERS_CREATE,
    SUPPLIERS_UPDATE,
    SUPPLIERS_DELETE,
    COUPONS_READ,
    COUPONS_CREATE,
    COUPONS_UPDATE,
    COUPONS_DELETE,
    EMAILS_READ,
    EMAILS_SEND,
    EMAILS_DELETE,
    ACTIVITY_READ,
];

pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

pub fn is_known_permission(name: &str) -> bool {
    ALL_PERMISSIONS.contains(&name)
}

lazy_static! {
    /// Built-in roles and the permissions they start with.
    pub static ref DEFAULT_ROLES: HashMap<&'static str, Vec<&'static str>> = {
        let mut roles = HashMap::new();
        roles.insert(ADMIN_ROLE, ALL_PERMISSIONS.to_vec());
        roles.insert(
            "manager",
            ALL_PERMISSIONS
                .iter()
                .copied()
                .filter(|p| !p.starts_with("users:") && !p.starts_with("roles:"))
                .collect(),
        );
        roles.insert(
            "viewer",
            ALL_PERMISSIONS
                .iter()
                .copied()
                .filter(|p| p.ends_with(":read"))
                .collect(),
        );
        roles
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_resource_action_pairs() {
        for name in ALL_PERMISSIONS {
            let (resource, action) = name.split_once(':').unwrap();
            assert_eq!(format_permission(resource, action), *name);
        }
        assert!(is_known_permission("inventory:transfer"));
        assert!(!is_known_permission("inventory:teleport"));
    }

    #[test]
    fn viewer_role_is_read_only() {
        let viewer = &DEFAULT_ROLES["viewer"];
        assert!(viewer.contains(&PRODUCTS_READ));
        assert!(!viewer.contains(&PRODUCTS_CREATE));
        assert!(!DEFAULT_ROLES["manager"].contains(&ROLES_MANAGE));
    }
}
