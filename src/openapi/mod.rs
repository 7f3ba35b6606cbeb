use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Commerce Admin API",
        version = "1.0.0",
        description = r#"
# Commerce Admin API

Back-office API for an online store: catalog, customers, orders, coupons,
suppliers, multi-warehouse inventory, shopping carts and staff mailboxes.

## Authentication

Staff authenticate with `POST /api/v1/auth/login`, customers with
`POST /api/v1/auth/customer/login`. Send the access token on every call:

```
Authorization: Bearer <access-token>
```

Staff routes additionally require the permission named on the route
(for example `product.create`). Guests use the cart routes with an
`X-Cart-Session` header instead of a token.

## Responses

Successful calls return an envelope:

```json
{ "success": true, "data": { }, "meta": { "request_id": "...", "timestamp": "..." } }
```

Failures return an `ErrorResponse` with the matching HTTP status.

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100)
and return `items`, `total`, `page`, `limit` and `total_pages`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, refresh and logout"),
        (name = "users", description = "Staff accounts"),
        (name = "roles", description = "Roles and permissions"),
        (name = "categories", description = "Catalog categories"),
        (name = "products", description = "Catalog products"),
        (name = "customers", description = "Customer accounts"),
        (name = "orders", description = "Order lifecycle"),
        (name = "inventory", description = "Warehouses, stock and allocations"),
        (name = "suppliers", description = "Suppliers"),
        (name = "coupons", description = "Discount coupons"),
        (name = "carts", description = "Customer and guest carts"),
        (name = "emails", description = "Staff mailboxes"),
        (name = "activity", description = "Audit trail of staff requests"),
    ),
    paths(
        crate::handlers::auth::login,
        crate::handlers::auth::customer_login,
        crate::handlers::auth::refresh,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,

        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::deactivate_user,
        crate::handlers::users::activate_user,
        crate::handlers::users::delete_user,
        crate::handlers::users::restore_user,

        crate::handlers::roles::list_roles,
        crate::handlers::roles::get_role,
        crate::handlers::roles::create_role,
        crate::handlers::roles::update_role,
        crate::handlers::roles::delete_role,
        crate::handlers::roles::sync_permissions,
        crate::handlers::roles::list_permissions,
        crate::handlers::roles::create_permission,
        crate::handlers::roles::assign_role,
        crate::handlers::roles::revoke_role,

        crate::handlers::categories::list_categories,
        crate::handlers::categories::get_category,
        crate::handlers::categories::create_category,
        crate::handlers::categories::update_category,
        crate::handlers::categories::delete_category,
        crate::handlers::categories::restore_category,

        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::product_stock,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::restore_product,

        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::customer_orders,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,
        crate::handlers::customers::restore_customer,

        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::restore_order,

        crate::handlers::inventory::list_stock,
        crate::handlers::inventory::get_stock,
        crate::handlers::inventory::create_stock,
        crate::handlers::inventory::update_stock,
        crate::handlers::inventory::delete_stock,
        crate::handlers::inventory::list_warehouses,
        crate::handlers::inventory::create_warehouse,
        crate::handlers::inventory::update_warehouse,
        crate::handlers::inventory::adjust_stock,
        crate::handlers::inventory::transfer_stock,
        crate::handlers::inventory::allocate_order,
        crate::handlers::inventory::release_order,
        crate::handlers::inventory::order_allocations,
        crate::handlers::inventory::auto_restock,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::expiring_stock,
        crate::handlers::inventory::expired_stock,
        crate::handlers::inventory::stock_logs,
        crate::handlers::inventory::forecast,

        crate::handlers::suppliers::list_suppliers,
        crate::handlers::suppliers::get_supplier,
        crate::handlers::suppliers::supplier_stock,
        crate::handlers::suppliers::create_supplier,
        crate::handlers::suppliers::update_supplier,
        crate::handlers::suppliers::delete_supplier,
        crate::handlers::suppliers::restore_supplier,

        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::delete_coupon,

        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::apply_coupon,
        crate::handlers::carts::remove_coupon,
        crate::handlers::carts::merge_cart,
        crate::handlers::carts::checkout,

        crate::handlers::emails::list_emails,
        crate::handlers::emails::get_email,
        crate::handlers::emails::send_email,
        crate::handlers::emails::save_draft,
        crate::handlers::emails::toggle_star,
        crate::handlers::emails::trash_email,
        crate::handlers::emails::restore_email,
        crate::handlers::emails::force_delete_email,
        crate::handlers::emails::empty_trash,

        crate::handlers::user_activity::list_activity,
        crate::handlers::user_activity::get_activity,
        crate::handlers::user_activity::prune_activity,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::errors::ErrorResponse,
            crate::auth::Guard,
            crate::auth::AuthUser,
            crate::auth::TokenPair,
            crate::repositories::email_repository::MailboxFolder,
            crate::repositories::inventory_repository::TransferLine,
            crate::repositories::role_repository::SeedSummary,
        )
    )
)]
pub struct ApiDoc;

/// Registers the `Bearer` scheme referenced by the secured paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn api_doc() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource_group() {
        let json = serde_json::to_string(&api_doc()).unwrap();
        assert!(json.contains("Commerce Admin API"));
        for path in [
            "/api/v1/auth/login",
            "/api/v1/product",
            "/api/v1/inventory/transfer",
            "/api/v1/gift/validate/{code}",
            "/api/v1/cart/checkout",
            "/api/v1/email/trash",
            "/api/v1/user_activity/prune",
        ] {
            assert!(json.contains(path), "missing {}", path);
        }
        assert!(json.contains("\"Bearer\""));
    }
}
