//! Relational store access: pool setup, embedded migrations and a liveness ping.

use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub type DbPool = DatabaseConnection;

/// Pool bounds and timeouts. Requests beyond `max_connections` wait up to
/// `acquire_timeout` for a free connection.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(6),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        let secs = Duration::from_secs;
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: secs(cfg.db_connect_timeout_secs),
            idle_timeout: secs(cfg.db_idle_timeout_secs),
            acquire_timeout: secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Opens a bounded pool with sqlx statement logging off.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await.map_err(|e| {
        error!(error = %e, "Could not open database pool");
        ServiceError::DatabaseError(e)
    })?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool ready"
    );
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending migration from [`crate::migrator::Migrator`].
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match crate::migrator::Migrator::up(pool, None).await {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "Migrations applied");
            Ok(())
        }
        Err(e) => {
            error!(elapsed = ?started.elapsed(), error = %e, "Migrations failed");
            Err(ServiceError::MigrationError(e.to_string()))
        }
    }
}

/// Round-trips a ping through the pool.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    pool.ping().await.map_err(|e| {
        error!(elapsed = ?started.elapsed(), error = %e, "Database ping failed");
        ServiceError::DatabaseError(e)
    })?;
    debug!(elapsed = ?started.elapsed(), "Database ping ok");
    Ok(())
}
