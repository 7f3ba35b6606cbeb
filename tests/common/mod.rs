#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use commerce_admin_api::{
    auth::permissions::ADMIN_ROLE,
    build_router,
    config::AppConfig,
    db,
    entities::{customer, inventory_stock, product, product::ProductStatus, warehouse},
    events,
    jobs::JobContext,
    notifications::RecordingMailer,
    repositories::{
        customer_repository::CreateCustomer,
        inventory_repository::{CreateStock, CreateWarehouse},
        product_repository::CreateProduct,
        user_repository::CreateUser,
    },
    AppState,
};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password-1";
pub const CUSTOMER_PASSWORD: &str = "customer-pass-1";

/// Application backed by a throwaway SQLite file, with seeded roles and an
/// admin account.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: RecordingMailer,
    pub admin_id: Uuid,
    admin_token: String,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller tweak the configuration.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("commerce_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "integration-secret-0123456789-abcdefghijklmnop".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;
        cfg.cart_rate_limit_requests = 10_000;
        cfg.jobs_enabled = false;
        tweak(&mut cfg);

        let pool = db::connect_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let mailer = RecordingMailer::new();
        let state = AppState::new(Arc::new(pool), cfg, event_sender, Arc::new(mailer.clone()));

        state
            .repos
            .roles
            .seed_defaults()
            .await
            .expect("seed roles");
        let admin_role = state
            .repos
            .roles
            .find_by_name(ADMIN_ROLE)
            .await
            .expect("admin role");
        let admin = state
            .repos
            .users
            .create(CreateUser {
                name: "Admin".to_string(),
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
                is_active: Some(true),
                role_ids: vec![admin_role.id],
            })
            .await
            .expect("create admin");
        let (_, tokens) = state
            .auth
            .login(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("admin login");

        Self {
            router: build_router(state.clone()),
            state,
            mailer,
            admin_id: admin.user.id,
            admin_token: tokens.access_token,
            _dir: dir,
            _event_task: event_task,
        }
    }

    pub fn token(&self) -> &str {
        &self.admin_token
    }

    pub fn jobs(&self) -> JobContext {
        JobContext::from_state(&self.state)
    }

    /// Send a request with an optional bearer token and extra headers.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// Request as the seeded admin.
    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.send(method, uri, body, Some(self.token()), &[]).await
    }

    pub async fn create_customer(&self, email: &str) -> customer::Model {
        self.state
            .repos
            .customers
            .create(CreateCustomer {
                first_name: "Test".to_string(),
                last_name: "Customer".to_string(),
                email: email.to_string(),
                phone: None,
                password: Some(CUSTOMER_PASSWORD.to_string()),
            })
            .await
            .expect("create customer")
    }

    pub async fn customer_token(&self, email: &str) -> String {
        let (_, tokens) = self
            .state
            .auth
            .customer_login(email, CUSTOMER_PASSWORD)
            .await
            .expect("customer login");
        tokens.access_token
    }

    pub async fn create_product(&self, sku: &str, price: Decimal) -> product::Model {
        self.state
            .repos
            .products
            .create(CreateProduct {
                name: format!("Product {}", sku),
                slug: None,
                sku: sku.to_string(),
                description: None,
                category_id: None,
                brand: None,
                price,
                discount_price: None,
                cost_price: None,
                status: Some(ProductStatus::Active),
                is_featured: None,
            })
            .await
            .expect("create product")
    }

    pub async fn create_warehouse(&self, code: &str) -> warehouse::Model {
        self.state
            .repos
            .inventory
            .create_warehouse(CreateWarehouse {
                name: format!("Warehouse {}", code),
                code: code.to_string(),
                location: None,
                is_active: Some(true),
            })
            .await
            .expect("create warehouse")
    }

    pub async fn add_stock(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        batch: Option<&str>,
        expiry_date: Option<DateTime<Utc>>,
    ) -> inventory_stock::Model {
        self.state
            .repos
            .inventory
            .create(
                CreateStock {
                    product_id,
                    warehouse_id,
                    supplier_id: None,
                    batch_number: batch.map(str::to_string),
                    expiry_date,
                    quantity,
                    reorder_point: None,
                    reorder_quantity: None,
                    auto_restock: None,
                },
                None,
            )
            .await
            .expect("create stock")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Asserts the status and returns the envelope's `data`.
pub async fn expect_data(response: Response, status: StatusCode) -> Value {
    let actual = response.status();
    let body = body_json(response).await;
    assert_eq!(actual, status, "unexpected status, body: {}", body);
    body["data"].clone()
}

/// Decimals travel as JSON strings.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected a decimal, got {}", other),
    }
}
