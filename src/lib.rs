//! Storefront API Library
//!
//! Dual-channel order backend: POS sales recorded by cashiers and online
//! orders paid through a hosted checkout session.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthService;
use crate::db::DbPool;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<config::AppConfig>,
    pub auth: Arc<AuthService>,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

pub fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub data: Vec<T>,
}

/// All application routes. Layers (tracing, CORS, timeouts) are applied
/// by the binary; tests mount this directly.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .nest("/admin/orders", admin_order_routes())
        .nest("/cashier/orders", cashier_order_routes())
        .nest("/customer/orders", customer_order_routes())
}

fn admin_order_routes() -> Router<AppState> {
    use handlers::orders;
    Router::new()
        .route(
            "/",
            post(orders::admin_create_order).get(orders::admin_list_orders),
        )
        .route("/:id", get(orders::admin_get_order))
}

fn cashier_order_routes() -> Router<AppState> {
    use handlers::orders;
    Router::new()
        .route(
            "/",
            post(orders::cashier_create_order).get(orders::cashier_list_orders),
        )
        .route(
            "/:order_id/store/:store_id",
            get(orders::cashier_get_order_for_store),
        )
}

fn customer_order_routes() -> Router<AppState> {
    use handlers::orders;
    Router::new()
        .route(
            "/",
            post(orders::customer_create_order).get(orders::customer_list_orders),
        )
        // GET is the owner's lookup (authenticated); PUT is the payment
        // gateway callback and deliberately carries no auth.
        .route(
            "/:id",
            get(orders::customer_get_order).put(orders::complete_order),
        )
        // The capture is a SKU here. It shares the `:id` name because the
        // router requires one parameter name per position.
        .route("/:id/item", get(orders::lookup_order_by_sku))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn api_status() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
