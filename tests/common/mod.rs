#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::auth::{roles, AuthService};
use storefront_api::config::{AppConfig, PaymentConfig};
use storefront_api::db::{create_schema, DbPool};
use storefront_api::entities::{product, product_image, purchase, store, store_user, user};
use storefront_api::errors::ServiceError;
use storefront_api::events::{self, EventSender};
use storefront_api::handlers::AppServices;
use storefront_api::services::payments::{CheckoutRequest, CheckoutSession, PaymentGateway};
use storefront_api::{app_router, AppState};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Gateway double. Records every checkout request and either returns a
/// canned session or refuses.
pub struct MockGateway {
    fail: bool,
    pub requests: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        self.requests.lock().unwrap().push(request.tx_ref.clone());
        if self.fail {
            return Err(ServiceError::PaymentFailed("gateway declined".into()));
        }
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.test/{}", request.tx_ref),
            tx_ref: request.tx_ref,
        })
    }
}

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub gateway: Arc<MockGateway>,
    pub auth: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(MockGateway::succeeding()).await
    }

    pub async fn with_gateway(gateway: Arc<MockGateway>) -> Self {
        // A single connection so every query sees the same in-memory db.
        let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
        opts.max_connections(1).sqlx_logging(false);
        let pool = Database::connect(opts)
            .await
            .expect("failed to open in-memory database");
        create_schema(&pool).await.expect("failed to create schema");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db.clone(),
            gateway.clone() as Arc<dyn PaymentGateway>,
            Some(event_sender),
        );
        let auth = Arc::new(AuthService::new(TEST_JWT_SECRET, 3600));

        Self {
            db,
            services,
            gateway,
            auth,
            _event_task: event_task,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            config: Arc::new(test_config()),
            auth: self.auth.clone(),
            event_sender: None,
            services: self.services.clone(),
        }
    }

    pub fn router(&self) -> Router {
        app_router().with_state(self.state())
    }

    pub fn token_for(&self, user_id: Uuid, role: &str) -> String {
        self.auth
            .generate_token(user_id, &[role])
            .expect("failed to mint test token")
    }

    pub fn admin_token(&self, user_id: Uuid) -> String {
        self.token_for(user_id, roles::ADMIN)
    }

    pub fn cashier_token(&self, user_id: Uuid) -> String {
        self.token_for(user_id, roles::CASHIER)
    }

    pub fn customer_token(&self, user_id: Uuid) -> String {
        self.token_for(user_id, roles::CUSTOMER)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        db_max_connections: 1,
        jwt_secret: TEST_JWT_SECRET.into(),
        jwt_expiration: 3600,
        host: "127.0.0.1".into(),
        port: 18080,
        environment: "test".into(),
        log_level: "debug".into(),
        log_json: false,
        auto_migrate: true,
        payment: PaymentConfig {
            api_url: "https://gateway.test".into(),
            secret_key: "sec-test".into(),
            currency: "MWK".into(),
            callback_url: "http://127.0.0.1:18080/customer/orders".into(),
            return_url: "http://127.0.0.1:3000/orders".into(),
            timeout_secs: 2,
        },
    }
}

pub async fn seed_user(db: &DbPool, first_name: &str, last_name: &str, email: &str) -> Uuid {
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        first_name: Set(first_name.to_string()),
        last_name: Set(last_name.to_string()),
        email: Set(email.to_string()),
        phone: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed user");
    id
}

pub async fn seed_store(db: &DbPool, slug: &str) -> Uuid {
    let id = Uuid::new_v4();
    store::ActiveModel {
        id: Set(id),
        slug: Set(slug.to_string()),
        name: Set(slug.to_string()),
        status: Set(true),
    }
    .insert(db)
    .await
    .expect("failed to seed store");
    id
}

pub async fn assign_cashier(db: &DbPool, store_id: Uuid, user_id: Uuid) {
    store_user::ActiveModel {
        store_id: Set(store_id),
        user_id: Set(user_id),
    }
    .insert(db)
    .await
    .expect("failed to assign cashier");
}

pub async fn seed_product(db: &DbPool, sku: &str, status: bool, visibility: bool) -> Uuid {
    let id = Uuid::new_v4();
    product::ActiveModel {
        id: Set(id),
        slug: Set(sku.to_lowercase()),
        name: Set(format!("Product {}", sku)),
        description: Set(None),
        sku: Set(sku.to_string()),
        category_id: Set(None),
        status: Set(status),
        visibility: Set(visibility),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed product");
    id
}

pub async fn seed_product_image(db: &DbPool, product_id: Uuid, name: &str) {
    product_image::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
    .expect("failed to seed product image");
}

/// Adds `quantity` units of stock via the purchase ledger.
pub async fn seed_stock(db: &DbPool, product_id: Uuid, quantity: i32) {
    purchase::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        quantity: Set(quantity),
        order_price: Set(Decimal::new(500, 2)),
        selling_price: Set(Decimal::new(1000, 2)),
        store_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed stock");
}
