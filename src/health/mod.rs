/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - pings the database
 * - Readiness check (`/health/ready`) - database plus event channel
 * - Liveness check (`/health/live`) - process is up
 * - Version (`/health/version`)
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};

use crate::events::EventSender;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub event_sender: Option<EventSender>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    async fn database_detail(&self) -> HealthDetail {
        let started = std::time::Instant::now();
        let ping = self.db_pool.ping().await;
        crate::metrics::observe_histogram("db.ping_ms", started.elapsed().as_millis() as f64);
        let (status, message) = match ping {
            Ok(()) => (HealthStatus::Up, None),
            Err(e) => {
                crate::metrics::increment_counter("db.connection_failures");
                error!("Database health check failed: {}", e);
                (HealthStatus::Down, Some(e.to_string()))
            }
        };
        HealthDetail {
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    fn event_channel_detail(&self) -> HealthDetail {
        let (status, message) = match &self.event_sender {
            Some(sender) if sender.is_closed() => (
                HealthStatus::Degraded,
                Some("event processor stopped".to_string()),
            ),
            Some(_) => (HealthStatus::Up, None),
            None => (
                HealthStatus::Degraded,
                Some("event channel not configured".to_string()),
            ),
        };
        HealthDetail {
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Runs every component check and folds them into one status
    pub async fn check(&self) -> HealthInfo {
        let mut details = BTreeMap::new();
        details.insert("database".to_string(), self.database_detail().await);
        details.insert("event_channel".to_string(), self.event_channel_detail());

        let status = overall_status(details.values().map(|d| d.status));
        if status != HealthStatus::Up {
            for (name, detail) in &details {
                if detail.status != HealthStatus::Up {
                    warn!("Component {name} is not healthy: {:?}", detail.status);
                }
            }
        }

        HealthInfo {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.uptime(),
            details,
        }
    }
}

/// Down beats degraded beats up
pub fn overall_status(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
    statuses
        .into_iter()
        .fold(HealthStatus::Up, |acc, status| match (acc, status) {
            (HealthStatus::Down, _) | (_, HealthStatus::Down) => HealthStatus::Down,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Up,
        })
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIME").unwrap_or("unknown"),
    }))
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Health check endpoint called");

    let database = state.database_detail().await;
    (
        database.status.status_code(),
        Json(json!({
            "status": database.status,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now(),
        })),
    )
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Readiness check endpoint called");

    let health = state.check().await;
    (health.status.status_code(), Json(health))
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

/// Creates router with health check endpoints
pub fn health_routes_with_state(
    db_pool: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
) -> Router {
    let health_state = Arc::new(HealthState::new(db_pool, event_sender));

    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(health_state)
}
