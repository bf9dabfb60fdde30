//! Durable run-state store for moodwire.
//!
//! One record per analysis run plus an append-only log of collected items.
//! The [`RunStore`] trait is the coordination contract the pipeline stages
//! speak; [`PgRunStore`] is the Postgres implementation and
//! [`MemoryRunStore`] serves tests and offline dry runs.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/moodwire-store/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &moodwire_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("run not found")]
    NotFound,
    #[error("run {run_id} is not in the expected '{expected}' status")]
    InvalidTransition { run_id: Uuid, expected: &'static str },
    #[error("idempotency key '{0}' already belongs to another run")]
    IdempotencyConflict(String),
    #[error("store unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
    #[error("stored run record is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect to a Postgres pool, reading `DATABASE_URL` and default pool settings from env.
///
/// # Errors
///
/// Returns [`StoreError::MissingDatabaseUrl`] if `DATABASE_URL` is unset, or
/// [`StoreError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_env() -> Result<PgPool, StoreError> {
    let database_url = env::var("DATABASE_URL").map_err(|_| StoreError::MissingDatabaseUrl)?;
    connect_pool(&database_url, PoolConfig::default())
        .await
        .map_err(StoreError::from)
}

/// Run all pending migrations against the pool.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`StoreError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), StoreError> {
    ping(pool).await?;
    Ok(())
}

pub mod items;
pub mod memory;
pub mod runs;
pub mod store;
pub mod types;

mod retry;

pub use memory::MemoryRunStore;
pub use store::{PgRunStore, RetryConfig, RunStore};
pub use types::{Item, Run, RunAggregate, RunStatus};
