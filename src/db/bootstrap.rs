use sqlx::{Connection, Executor, PgConnection};

use crate::config::ConnectionConfig;
use crate::db::DbError;

/// Ensures the target database exists, creating it through the
/// administrative database when missing.
///
/// Safe to run on every startup: once the database exists this is a
/// read-only catalog check.
pub async fn ensure_database_exists(config: &ConnectionConfig) -> Result<(), DbError> {
    let options = config.admin_connect_options().map_err(DbError::Bootstrap)?;

    // Short-lived, non-pooled connection; dropped (and with it the server
    // slot) on every early return below.
    let mut conn = PgConnection::connect_with(&options)
        .await
        .map_err(DbError::Bootstrap)?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1)",
    )
    .bind(&config.database)
    .fetch_one(&mut conn)
    .await
    .map_err(DbError::Bootstrap)?;

    if exists {
        tracing::debug!(database = %config.database, "database already exists");
    } else {
        tracing::info!(database = %config.database, "database does not exist, creating it");

        // CREATE DATABASE takes no bind parameters; quote the identifier.
        conn.execute(format!(r#"CREATE DATABASE "{}""#, config.database).as_str())
            .await
            .map_err(DbError::Bootstrap)?;

        tracing::info!(database = %config.database, "database created");
    }

    conn.close().await.map_err(DbError::Bootstrap)?;

    Ok(())
}
