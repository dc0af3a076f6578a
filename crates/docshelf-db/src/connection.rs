//! Runtime connection lifecycle.
//!
//! The store connection is established on demand (from a URL at startup or
//! from field-wise settings entered by the user) and can be dropped and
//! re-established while the server runs. Every store operation obtains its
//! [`Database`] through [`ConnectionManager::database`] and fails with
//! [`Error::NotConnected`] while no connection is up.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use tokio::sync::RwLock;
use tracing::{info, warn};

use docshelf_core::defaults::DB_PORT;
use docshelf_core::{Error, Result};

use crate::pool::{create_pool_with_options, PoolConfig};
use crate::Database;

/// Field-wise connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

fn default_port() -> u16 {
    DB_PORT
}

impl ConnectionConfig {
    /// Driver connect options for these settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        options
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("host", &self.host),
            ("database", &self.database),
            ("user", &self.user),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the store connection currently stands.
#[derive(Clone)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(Database),
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected(_) => "connected",
        }
    }
}

/// Owns the single store connection and its state transitions:
/// `Disconnected -> Connecting -> Connected -> Disconnected`.
pub struct ConnectionManager {
    state: RwLock<ConnectionState>,
    pool_config: PoolConfig,
    auto_migrate: bool,
}

impl ConnectionManager {
    pub fn new(pool_config: PoolConfig) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            pool_config,
            auto_migrate: false,
        }
    }

    /// Run pending migrations after every successful connect.
    pub fn with_auto_migrate(mut self, enabled: bool) -> Self {
        self.auto_migrate = enabled;
        self
    }

    /// Connect with field-wise settings.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        config.validate()?;
        self.connect_with(config.connect_options()).await
    }

    /// Connect with a `postgres://` URL.
    pub async fn connect_url(&self, url: &str) -> Result<()> {
        let options: PgConnectOptions = url.parse().map_err(Error::Database)?;
        self.connect_with(options).await
    }

    /// Replace any existing connection with a new one.
    ///
    /// The previous connection is closed first. On failure the manager ends
    /// up `Disconnected`.
    pub async fn connect_with(&self, options: PgConnectOptions) -> Result<()> {
        let previous = {
            let mut state = self.state.write().await;
            if matches!(*state, ConnectionState::Connecting) {
                return Err(Error::InvalidInput(
                    "a connection attempt is already in progress".to_string(),
                ));
            }
            std::mem::replace(&mut *state, ConnectionState::Connecting)
        };
        if let ConnectionState::Connected(old) = previous {
            old.close().await;
        }

        let host = options.get_host().to_string();
        match self.open(options).await {
            Ok(db) => {
                *self.state.write().await = ConnectionState::Connected(db);
                info!(
                    subsystem = "db",
                    component = "connection",
                    op = "connect",
                    host = %host,
                    "Connected to database"
                );
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                warn!(
                    subsystem = "db",
                    component = "connection",
                    op = "connect",
                    host = %host,
                    error = %e,
                    "Database connection failed"
                );
                Err(e)
            }
        }
    }

    async fn open(&self, options: PgConnectOptions) -> Result<Database> {
        let pool = create_pool_with_options(options, self.pool_config.clone()).await?;
        let db = Database::new(pool);
        if let Err(e) = db.ping().await {
            db.close().await;
            return Err(e);
        }
        #[cfg(feature = "migrations")]
        if self.auto_migrate {
            if let Err(e) = db.migrate().await {
                db.close().await;
                return Err(e);
            }
        }
        Ok(db)
    }

    /// Close the connection if one is open. Idempotent.
    pub async fn disconnect(&self) {
        let previous = std::mem::replace(
            &mut *self.state.write().await,
            ConnectionState::Disconnected,
        );
        if let ConnectionState::Connected(db) = previous {
            db.close().await;
            info!(
                subsystem = "db",
                component = "connection",
                op = "disconnect",
                "Disconnected from database"
            );
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected(_))
    }

    /// The live database handle, or [`Error::NotConnected`].
    pub async fn database(&self) -> Result<Database> {
        match &*self.state.read().await {
            ConnectionState::Connected(db) => Ok(db.clone()),
            _ => Err(Error::NotConnected),
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
