// API module - HTTP endpoints

use sqlx::PgPool;

use crate::config::Config;

pub mod health;
pub mod version;

/// Application state shared by all routes
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

// State for router tests: a real Config plus a lazy pool pointed at a dead
// address, so nothing touches the network until a handler probes it.
#[cfg(test)]
pub(crate) fn test_state(version: &str) -> AppState {
    use crate::config::ConnectionConfig;
    use secrecy::Secret;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    let database = ConnectionConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        user: "postgres".to_string(),
        password: Secret::new(String::new()),
        database: "roster".to_string(),
        admin_database: "postgres".to_string(),
        sslmode: "disable".to_string(),
    };

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy_with(database.connect_options().expect("connect options"));

    AppState {
        pool,
        config: Config {
            port: 0,
            version: version.to_string(),
            database,
        },
    }
}
