use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub version: String,
    pub database: ConnectionConfig,
}

/// Connection parameters for the PostgreSQL server, covering both the
/// target database and the administrative database used to create it.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,

    /// Database the service serves requests against.
    pub database: String,

    /// Database guaranteed to exist on the server, used only to check for
    /// and create the target database.
    pub admin_database: String,

    /// libpq-style ssl mode: disable, allow, prefer, require, verify-ca,
    /// verify-full.
    pub sslmode: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            port: config.get("port").unwrap_or(8080),
            version: config
                .get("version")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),

            database: ConnectionConfig {
                host: config
                    .get("db_host")
                    .unwrap_or_else(|_| "localhost".to_string()),
                port: config.get("db_port").unwrap_or(5432),
                user: config
                    .get("db_user")
                    .unwrap_or_else(|_| "postgres".to_string()),
                password: Secret::new(config.get("db_password")?),
                database: config
                    .get("db_name")
                    .unwrap_or_else(|_| "roster".to_string()),
                admin_database: config
                    .get("db_admin_name")
                    .unwrap_or_else(|_| "postgres".to_string()),
                sslmode: config
                    .get("db_sslmode")
                    .unwrap_or_else(|_| "disable".to_string()),
            },
        })
    }
}

impl ConnectionConfig {
    /// Connect options for the target database.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        Ok(self.server_options()?.database(&self.database))
    }

    /// Connect options for the administrative database. Used only for
    /// operations that must happen before the target database exists.
    pub fn admin_connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        Ok(self.server_options()?.database(&self.admin_database))
    }

    fn server_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let ssl_mode: PgSslMode = self.sslmode.parse()?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .ssl_mode(ssl_mode))
    }
}
