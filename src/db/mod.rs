use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConnectionConfig;

pub mod bootstrap;
pub mod migrations;

/// Upper bound on open connections; acquirers queue once it is reached.
const MAX_CONNECTIONS: u32 = 100;

/// Idle connections the pool keeps warm.
const MIN_CONNECTIONS: u32 = 10;

/// Connections are recycled after this long regardless of activity.
const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database bootstrap failed: {0}")]
    Bootstrap(#[source] sqlx::Error),

    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("schema migration failed for {entity}: {source}")]
    Migration {
        entity: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("database not initialized")]
    NotInitialized,

    #[error("database already initialized")]
    AlreadyInitialized,

    #[error("database health check failed: {0}")]
    Unhealthy(#[source] sqlx::Error),

    #[error("failed to close database: {0}")]
    Close(#[source] sqlx::Error),
}

/// Manages the lifetime of the service's PostgreSQL connection pool:
/// creation of the target database, pool establishment, schema migration,
/// health probing, and release at shutdown.
///
/// The pool handle is either absent or fully usable - `init` only stores
/// it after the liveness probe and migrations have succeeded.
#[derive(Debug)]
pub struct Database {
    config: ConnectionConfig,
    pool: Option<PgPool>,
    closed: bool,
}

impl Database {
    /// Creates an unconnected manager; call `init` to bring it up.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: None,
            closed: false,
        }
    }

    /// Brings the database to ready: ensures the target database exists,
    /// opens the bounded connection pool, verifies liveness, and applies
    /// schema migrations, strictly in that order.
    ///
    /// Each step's precondition is the previous step's postcondition, so
    /// the sequence short-circuits on the first failure and leaves the
    /// manager uninitialized. Calling `init` on a manager that is already
    /// ready, or was closed, is an error.
    pub async fn init(&mut self) -> Result<(), DbError> {
        if self.pool.is_some() || self.closed {
            return Err(DbError::AlreadyInitialized);
        }

        bootstrap::ensure_database_exists(&self.config).await?;

        let pool = self.connect_pool().await?;

        if let Err(e) = migrations::run(&pool).await {
            pool.close().await;
            return Err(e);
        }

        self.pool = Some(pool);
        Ok(())
    }

    async fn connect_pool(&self) -> Result<PgPool, DbError> {
        let options = self.config.connect_options().map_err(DbError::Connection)?;

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_CONNECTIONS)
            .max_lifetime(MAX_LIFETIME)
            .connect_with(options)
            .await
            .map_err(DbError::Connection)?;

        // Fail now rather than on the first request.
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(DbError::Connection)?;

        tracing::info!(
            database = %self.config.database,
            max_connections = MAX_CONNECTIONS,
            "database connected"
        );

        Ok(pool)
    }

    /// The live pool handle. Only valid between a successful `init` and
    /// `close`; handlers receive clones of this handle, never ownership.
    pub fn pool(&self) -> Result<&PgPool, DbError> {
        self.pool.as_ref().ok_or(DbError::NotInitialized)
    }

    /// Probes the pool for liveness without any other side effect.
    pub async fn health(&self) -> Result<(), DbError> {
        let pool = self.pool()?;

        sqlx::query("SELECT 1")
            .fetch_one(pool)
            .await
            .map(|_| ())
            .map_err(DbError::Unhealthy)
    }

    /// Releases the pool and all of its connections. A no-op on a manager
    /// that was never initialized or is already closed, so duplicate
    /// shutdown triggers are harmless.
    pub async fn close(&mut self) -> Result<(), DbError> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            tracing::info!("database connection closed");
        }
        self.closed = true;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    // Port 1 is never a Postgres server, so connection attempts fail fast
    // instead of hanging.
    fn unreachable_config() -> ConnectionConfig {
        ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "postgres".to_string(),
            password: Secret::new("postgres".to_string()),
            database: "roster_test".to_string(),
            admin_database: "postgres".to_string(),
            sslmode: "disable".to_string(),
        }
    }

    // A manager in the ready state without any network traffic: the pool
    // is lazy and points at a dead address.
    fn ready_database() -> Database {
        let config = unreachable_config();
        let options = config.connect_options().unwrap();
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy_with(options);

        Database {
            config,
            pool: Some(pool),
            closed: false,
        }
    }

    fn live_config() -> ConnectionConfig {
        ConnectionConfig {
            host: std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: 5432,
            user: std::env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: Secret::new(
                std::env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
            ),
            database: "roster_test".to_string(),
            admin_database: "postgres".to_string(),
            sslmode: "disable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_health_before_init_is_not_initialized() {
        let database = Database::new(unreachable_config());

        assert!(matches!(
            database.health().await,
            Err(DbError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_pool_before_init_is_not_initialized() {
        let database = Database::new(unreachable_config());

        assert!(matches!(database.pool(), Err(DbError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_close_without_init_is_a_noop() {
        let mut database = Database::new(unreachable_config());

        assert!(database.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_init_after_close_is_rejected() {
        let mut database = Database::new(unreachable_config());
        database.close().await.unwrap();

        assert!(matches!(
            database.init().await,
            Err(DbError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_init_on_ready_manager_is_rejected() {
        let mut database = ready_database();

        assert!(matches!(
            database.init().await,
            Err(DbError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_double_close_releases_once() {
        let mut database = ready_database();
        let pool = database.pool().unwrap().clone();

        assert!(database.close().await.is_ok());
        assert!(pool.is_closed());
        assert!(database.close().await.is_ok());

        // The handle stays gone after the second call.
        assert!(matches!(database.pool(), Err(DbError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_health_after_close_is_not_initialized() {
        let mut database = ready_database();
        database.close().await.unwrap();

        assert!(matches!(
            database.health().await,
            Err(DbError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_health_probe_failure_is_unhealthy() {
        let database = ready_database();

        assert!(matches!(database.health().await, Err(DbError::Unhealthy(_))));
    }

    #[test]
    fn test_migration_errors_name_the_entity() {
        let err = DbError::Migration {
            entity: "users",
            source: sqlx::Error::RowNotFound,
        };

        assert!(err.to_string().contains("users"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_saturated_pool_queues_acquirers() {
        let config = live_config();
        bootstrap::ensure_database_exists(&config)
            .await
            .expect("bootstrap failed");

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(config.connect_options().unwrap())
            .await
            .expect("pool failed");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                sqlx::query("SELECT pg_sleep(0.05)").execute(&pool).await
            }));
        }

        for task in tasks {
            task.await.expect("task panicked").expect("query failed");
        }

        // Acquirers queued instead of pushing the pool past its bound.
        assert!(pool.size() <= 2);

        pool.close().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_init_health_close_roundtrip() {
        let mut database = Database::new(live_config());
        database.init().await.expect("init failed");
        database.health().await.expect("health check failed");

        let pool = database.pool().expect("pool missing");
        assert_eq!(pool.options().get_max_connections(), MAX_CONNECTIONS);
        assert_eq!(pool.options().get_min_connections(), MIN_CONNECTIONS);
        assert_eq!(pool.options().get_max_lifetime(), Some(MAX_LIFETIME));

        // A second manager against the now-existing database must come up
        // cleanly: bootstrap finds the database and migrations are no-ops.
        let mut second = Database::new(live_config());
        second.init().await.expect("repeat init failed");
        second.close().await.unwrap();

        database.close().await.unwrap();
    }
}
