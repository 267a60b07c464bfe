pub mod row_lock;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::metrics;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub use row_lock::{for_update, lock_key, RowGuard, RowLocks};

pub type DbPool = DatabaseConnection;

/// Pool tuning taken from the `db_*` settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for PoolSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl PoolSettings {
    fn options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(false);
        opt
    }
}

/// Opens the pool described by the application settings.
pub async fn connect(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let settings = PoolSettings::from(cfg);
    debug!(?settings, "opening database pool");
    metrics::set_gauge("db.max_connections", settings.max_connections as f64);

    let pool = Database::connect(settings.options()).await.map_err(|e| {
        error!("database connection failed: {}", e);
        ServiceError::db_error(e)
    })?;

    info!(
        backend = ?pool.get_database_backend(),
        max_connections = settings.max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Applies every pending schema migration.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let pending = crate::migrator::Migrator::get_pending_migrations(pool)
        .await
        .map_err(ServiceError::db_error)?
        .len();
    if pending == 0 {
        debug!("schema is up to date");
        return Ok(());
    }

    let start = Instant::now();
    crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| {
            error!("migrations failed after {:?}: {}", start.elapsed(), e);
            ServiceError::db_error(e)
        })?;
    info!(pending, elapsed = ?start.elapsed(), "migrations applied");
    Ok(())
}
