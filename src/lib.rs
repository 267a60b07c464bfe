//! Furniture ERP API Library
//!
//! Production, store, assembly, showroom, sales, transport negotiation and dispatch
//! workflows for a furniture manufacturer, exposed over a versioned JSON API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Option<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the state and every service from one pool.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<events::EventSender>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
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

/// Every workflow route, relative to `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .nest(
            "/production-orders",
            handlers::production_orders::production_order_routes(),
        )
        .nest(
            "/purchase-orders",
            handlers::purchase_orders::purchase_order_routes(),
        )
        .nest("/inventory", handlers::inventory::inventory_routes())
        .nest(
            "/assembly-orders",
            handlers::assembly_orders::assembly_order_routes(),
        )
        .nest("/showroom", handlers::showroom::showroom_routes())
        .nest("/sales-orders", handlers::sales_orders::sales_order_routes())
        .nest(
            "/approval-requests",
            handlers::sales_orders::approval_request_routes(),
        )
        .nest(
            "/transport-requests",
            handlers::transport_requests::transport_request_routes(),
        )
        .nest("/dispatch-requests", handlers::dispatch::dispatch_routes())
        .nest("/gate-passes", handlers::dispatch::gate_pass_routes())
        .nest("/vehicles", handlers::fleet::vehicle_routes())
        .nest("/transport-jobs", handlers::fleet::transport_job_routes())
        .nest("/finance-transactions", handlers::finance::finance_routes())
}

async fn api_status() -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "furniture-erp-api",
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn metrics_text() -> impl IntoResponse {
    match metrics::metrics_handler().await {
        Ok(body) => (StatusCode::OK, body),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("metrics error"),
        ),
    }
}

async fn metrics_json() -> impl IntoResponse {
    match metrics::metrics_json_handler().await {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "metrics error"})),
        ),
    }
}

/// CORS from configured origins, permissive in development or when explicitly allowed.
pub fn cors_layer(cfg: &config::AppConfig) -> Result<CorsLayer, String> {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    if cfg.should_allow_permissive_cors() {
        ::tracing::info!(environment = %cfg.environment, "no CORS origins configured, allowing any");
        return Ok(CorsLayer::permissive());
    }
    Err("no CORS origins configured for a non-development environment".to_string())
}

/// Full application router: health, metrics, OpenAPI document and the v1 API.
pub fn app_router(state: AppState) -> Result<Router, String> {
    let cors = cors_layer(&state.config)?;
    let health = health::health_routes_with_state(state.db.clone(), state.event_sender.clone());

    Ok(Router::<AppState>::new()
        .route("/", get(|| async { "furniture-erp-api up" }))
        .route("/metrics", get(metrics_text))
        .route("/metrics/json", get(metrics_json))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .nest("/health", health)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        )))
}

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::db::{DbPool, RowLocks};
    pub use crate::errors::{ApiError, ServiceError};
    pub use crate::events::{Event, EventSender};
    pub use crate::{app_router, ApiResponse, AppState};
}
