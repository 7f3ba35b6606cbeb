//! Commerce Admin API
//!
//! Back-office REST API for an online shop: catalog, customers, orders,
//! coupons, suppliers, multi-warehouse inventory, carts, mailboxes and
//! role-based access control.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod jobs;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod rate_limiter;
pub mod repositories;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::{delete, get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use utoipa::ToSchema;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::consts as perm;
use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::notifications::Mailer;
use crate::rate_limiter::{rate_limit_middleware, RateLimiter};
use crate::repositories::Repositories;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub auth: Arc<AuthService>,
    pub repos: Repositories,
    pub mailer: Arc<dyn Mailer>,
    pub cart_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: EventSender,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let cache = cache::build_cache(&config);
        let repos = Repositories::new(
            db.clone(),
            event_sender.clone(),
            cache,
            config.category_cache_ttl(),
        );
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        let cart_limiter = RateLimiter::for_carts(&config);
        Self {
            db,
            config: Arc::new(config),
            event_sender,
            auth,
            repos,
            mailer,
            cart_limiter,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::middleware_helpers::request_id::current_request_id()
                .map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes(state: &AppState) -> Router<AppState> {
    use handlers::*;

    // Auth
    let auth_public = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/customer/login", post(auth::customer_login))
        .route("/auth/refresh", post(auth::refresh));
    let auth_session = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .with_auth();

    // Users
    let users_read = Router::new()
        .route("/user", get(users::list_users))
        .route("/user/:id", get(users::get_user))
        .with_permission(perm::USERS_READ);
    let users_create = Router::new()
        .route("/user", post(users::create_user))
        .with_permission(perm::USERS_CREATE);
    let users_update = Router::new()
        .route("/user/:id", put(users::update_user))
        .route("/user/:id/deactivate", post(users::deactivate_user))
        .route("/user/:id/activate", post(users::activate_user))
        .route("/user/:id/restore", post(users::restore_user))
        .with_permission(perm::USERS_UPDATE);
    let users_delete = Router::new()
        .route("/user/:id", delete(users::delete_user))
        .with_permission(perm::USERS_DELETE);

    // Roles & permissions
    let roles_read = Router::new()
        .route("/role", get(roles::list_roles))
        .route("/role/permissions", get(roles::list_permissions))
        .route("/role/:id", get(roles::get_role))
        .with_permission(perm::ROLES_READ);
    let roles_manage = Router::new()
        .route("/role", post(roles::create_role))
        .route("/role/permissions", post(roles::create_permission))
        .route("/role/assign", post(roles::assign_role))
        .route("/role/revoke", post(roles::revoke_role))
        .route("/role/:id", put(roles::update_role).delete(roles::delete_role))
        .route("/role/:id/permissions", put(roles::sync_permissions))
        .with_permission(perm::ROLES_MANAGE);

    // Categories
    let categories_read = Router::new()
        .route("/category", get(categories::list_categories))
        .route("/category/:id", get(categories::get_category))
        .with_permission(perm::CATEGORIES_READ);
    let categories_create = Router::new()
        .route("/category", post(categories::create_category))
        .with_permission(perm::CATEGORIES_CREATE);
    let categories_update = Router::new()
        .route("/category/:id", put(categories::update_category))
        .route("/category/:id/restore", post(categories::restore_category))
        .with_permission(perm::CATEGORIES_UPDATE);
    let categories_delete = Router::new()
        .route("/category/:id", delete(categories::delete_category))
        .with_permission(perm::CATEGORIES_DELETE);

    // Customers
    let customers_read = Router::new()
        .route("/customer", get(customers::list_customers))
        .route("/customer/:id", get(customers::get_customer))
        .route("/customer/:id/orders", get(customers::customer_orders))
        .with_permission(perm::CUSTOMERS_READ);
    let customers_create = Router::new()
        .route("/customer", post(customers::create_customer))
        .with_permission(perm::CUSTOMERS_CREATE);
    let customers_update = Router::new()
        .route("/customer/:id", put(customers::update_customer))
        .route("/customer/:id/restore", post(customers::restore_customer))
        .with_permission(perm::CUSTOMERS_UPDATE);
    let customers_delete = Router::new()
        .route("/customer/:id", delete(customers::delete_customer))
        .with_permission(perm::CUSTOMERS_DELETE);

    // Orders
    let orders_read = Router::new()
        .route("/order", get(orders::list_orders))
        .route("/order/:id", get(orders::get_order))
        .with_permission(perm::ORDERS_READ);
    let orders_create = Router::new()
        .route("/order", post(orders::create_order))
        .with_permission(perm::ORDERS_CREATE);
    let orders_update = Router::new()
        .route("/order/:id/status", put(orders::update_order_status))
        .route("/order/:id/cancel", post(orders::cancel_order))
        .route("/order/:id/restore", post(orders::restore_order))
        .with_permission(perm::ORDERS_UPDATE);
    let orders_delete = Router::new()
        .route("/order/:id", delete(orders::delete_order))
        .with_permission(perm::ORDERS_DELETE);

    // Products
    let products_read = Router::new()
        .route("/product", get(products::list_products))
        .route("/product/:id", get(products::get_product))
        .route("/product/:id/stock", get(products::product_stock))
        .with_permission(perm::PRODUCTS_READ);
    let products_create = Router::new()
        .route("/product", post(products::create_product))
        .with_permission(perm::PRODUCTS_CREATE);
    let products_update = Router::new()
        .route("/product/:id", put(products::update_product))
        .route("/product/:id/restore", post(products::restore_product))
        .with_permission(perm::PRODUCTS_UPDATE);
    let products_delete = Router::new()
        .route("/product/:id", delete(products::delete_product))
        .with_permission(perm::PRODUCTS_DELETE);

    // Inventory
    let inventory_read = Router::new()
        .route("/inventory", get(inventory::list_stock))
        .route("/inventory/warehouses", get(inventory::list_warehouses))
        .route("/inventory/low-stock", get(inventory::low_stock))
        .route("/inventory/expiring", get(inventory::expiring_stock))
        .route("/inventory/expired", get(inventory::expired_stock))
        .route("/inventory/logs", get(inventory::stock_logs))
        .route("/inventory/forecast/:product_id", get(inventory::forecast))
        .route("/inventory/allocations/:order_id", get(inventory::order_allocations))
        .route("/inventory/:id", get(inventory::get_stock))
        .with_permission(perm::INVENTORY_READ);
    let inventory_adjust = Router::new()
        .route("/inventory", post(inventory::create_stock))
        .route("/inventory/warehouses", post(inventory::create_warehouse))
        .route("/inventory/warehouses/:id", put(inventory::update_warehouse))
        .route("/inventory/auto-restock", post(inventory::auto_restock))
        .route(
            "/inventory/:id",
            put(inventory::update_stock).delete(inventory::delete_stock),
        )
        .route("/inventory/:id/adjust", post(inventory::adjust_stock))
        .with_permission(perm::INVENTORY_ADJUST);
    let inventory_transfer = Router::new()
        .route("/inventory/transfer", post(inventory::transfer_stock))
        .with_permission(perm::INVENTORY_TRANSFER);
    let inventory_allocate = Router::new()
        .route("/inventory/allocate/:order_id", post(inventory::allocate_order))
        .route("/inventory/release/:order_id", post(inventory::release_order))
        .with_permission(perm::INVENTORY_ALLOCATE);

    // Suppliers
    let suppliers_read = Router::new()
        .route("/supplier", get(suppliers::list_suppliers))
        .route("/supplier/:id", get(suppliers::get_supplier))
        .route("/supplier/:id/stock", get(suppliers::supplier_stock))
        .with_permission(perm::SUPPLIERS_READ);
    let suppliers_create = Router::new()
        .route("/supplier", post(suppliers::create_supplier))
        .with_permission(perm::SUPPLIERS_CREATE);
    let suppliers_update = Router::new()
        .route("/supplier/:id", put(suppliers::update_supplier))
        .route("/supplier/:id/restore", post(suppliers::restore_supplier))
        .with_permission(perm::SUPPLIERS_UPDATE);
    let suppliers_delete = Router::new()
        .route("/supplier/:id", delete(suppliers::delete_supplier))
        .with_permission(perm::SUPPLIERS_DELETE);

    // Coupons
    let coupons_read = Router::new()
        .route("/gift", get(coupons::list_coupons))
        .route("/gift/validate/:code", get(coupons::validate_coupon))
        .route("/gift/:id", get(coupons::get_coupon))
        .with_permission(perm::COUPONS_READ);
    let coupons_create = Router::new()
        .route("/gift", post(coupons::create_coupon))
        .with_permission(perm::COUPONS_CREATE);
    let coupons_update = Router::new()
        .route("/gift/:id", put(coupons::update_coupon))
        .with_permission(perm::COUPONS_UPDATE);
    let coupons_delete = Router::new()
        .route("/gift/:id", delete(coupons::delete_coupon))
        .with_permission(perm::COUPONS_DELETE);

    // Carts: customers or guests, behind the cart rate limiter
    let carts = Router::new()
        .route("/cart", get(carts::get_cart).delete(carts::clear_cart))
        .route("/cart/items", post(carts::add_item))
        .route(
            "/cart/items/:item_id",
            put(carts::update_item).delete(carts::remove_item),
        )
        .route(
            "/cart/coupon",
            post(carts::apply_coupon).delete(carts::remove_coupon),
        )
        .route("/cart/merge", post(carts::merge_cart))
        .route("/cart/checkout", post(carts::checkout))
        .with_optional_auth()
        .layer(axum::middleware::from_fn_with_state(
            state.cart_limiter.clone(),
            rate_limit_middleware,
        ));

    // Mailboxes
    let emails_read = Router::new()
        .route("/email", get(emails::list_emails))
        .route("/email/:id", get(emails::get_email))
        .with_permission(perm::EMAILS_READ);
    let emails_send = Router::new()
        .route("/email/send", post(emails::send_email))
        .route("/email/draft", post(emails::save_draft))
        .route("/email/:id/star", put(emails::toggle_star))
        .route("/email/:id/restore", post(emails::restore_email))
        .with_permission(perm::EMAILS_SEND);
    let emails_delete = Router::new()
        .route("/email/trash", delete(emails::empty_trash))
        .route("/email/:id", delete(emails::trash_email))
        .route("/email/:id/force", delete(emails::force_delete_email))
        .with_permission(perm::EMAILS_DELETE);

    // Activity audit
    let activity = Router::new()
        .route("/user_activity", get(user_activity::list_activity))
        .route("/user_activity/prune", delete(user_activity::prune_activity))
        .route("/user_activity/:id", get(user_activity::get_activity))
        .with_permission(perm::ACTIVITY_READ);

    Router::new()
        .route("/status", get(api_status))
        .merge(auth_public)
        .merge(auth_session)
        .merge(users_read)
        .merge(users_create)
        .merge(users_update)
        .merge(users_delete)
        .merge(roles_read)
        .merge(roles_manage)
        .merge(categories_read)
        .merge(categories_create)
        .merge(categories_update)
        .merge(categories_delete)
        .merge(customers_read)
        .merge(customers_create)
        .merge(customers_update)
        .merge(customers_delete)
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_update)
        .merge(orders_delete)
        .merge(products_read)
        .merge(products_create)
        .merge(products_update)
        .merge(products_delete)
        .merge(inventory_read)
        .merge(inventory_adjust)
        .merge(inventory_transfer)
        .merge(inventory_allocate)
        .merge(suppliers_read)
        .merge(suppliers_create)
        .merge(suppliers_update)
        .merge(suppliers_delete)
        .merge(coupons_read)
        .merge(coupons_create)
        .merge(coupons_update)
        .merge(coupons_delete)
        .merge(carts)
        .merge(emails_read)
        .merge(emails_send)
        .merge(emails_delete)
        .merge(activity)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-cart-session"),
            header::HeaderName::from_static("x-request-id"),
        ]);
    if origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Full application router: API, docs, health and the shared layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(&state))
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::api_doc()))
        .layer(Extension(state.repos.activities.clone()))
        .layer(Extension(state.auth.clone()))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .layer(middleware_helpers::request_id::http_trace_layer())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(Json(ApiResponse::success(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}

async fn health_check(State(state): State<AppState>) -> (axum::http::StatusCode, Json<ApiResponse<Value>>) {
    let healthy = db::check_connection(&state.db).await.is_ok();
    let status = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ApiResponse::success(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "checks": { "database": if healthy { "healthy" } else { "unhealthy" } },
            "timestamp": Utc::now().to_rfc3339(),
        }))),
    )
}
