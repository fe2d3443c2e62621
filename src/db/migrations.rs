use sqlx::PgPool;

use crate::db::DbError;

/// Applies the schema for every persisted entity. Every statement is
/// IF NOT EXISTS, so a rerun against an already-correct schema changes
/// nothing and succeeds.
pub async fn run(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("running schema migrations");

    migrate_users(pool)
        .await
        .map_err(|source| DbError::Migration {
            entity: "users",
            source,
        })?;

    tracing::info!("schema migrations complete");

    Ok(())
}

/// users table: soft-deleted rows keep their slot but fall out of the
/// partial unique indexes, so a username or email becomes reusable the
/// moment its previous owner is deleted.
async fn migrate_users(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ,
            username VARCHAR(50) NOT NULL,
            email VARCHAR(100) NOT NULL,
            password VARCHAR(255) NOT NULL,
            nickname VARCHAR(50),
            avatar VARCHAR(255),
            status SMALLINT NOT NULL DEFAULT 1,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            last_login_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username \
         ON users (username) WHERE deleted_at IS NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email \
         ON users (email) WHERE deleted_at IS NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_deleted_at ON users (deleted_at)")
        .execute(pool)
        .await?;

    Ok(())
}
