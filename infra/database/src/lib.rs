//! # Database Infrastructure
//!
//! Bootstraps the SQLite pool shared by every request and exposes the
//! transaction manager that repositories go through.
//!
//! * [`Database::builder`] opens (or creates) the database file, enables WAL and
//!   foreign keys, waits for the engine with a short backoff and applies the
//!   embedded migrations.
//! * [`DbSession`] is the request-scoped handle that may carry an ambient
//!   transaction. Repositories ask [`Database::connection`] for a [`Connection`]
//!   and never care which of the two they received.
//! * [`Database::run_in_transaction`] opens a transaction or joins the ambient one.
//!
//! ```rust,no_run
//! use keeper_database::{Database, DatabaseError, DbSession};
//!
//! # async fn run() -> Result<(), DatabaseError> {
//! let db = Database::builder().url("sqlite://keeper.db").init().await?;
//! let mut session = DbSession::default();
//! let mut conn = db.connection(&mut session).await?;
//! sqlx::query("SELECT 1").execute(&mut *conn).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod session;
mod transaction;

pub use error::{DatabaseError, DatabaseErrorExt};
pub use session::{Connection, DbSession};
pub use transaction::TxFuture;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const HEALTH_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct DatabaseInner {
    pool: SqlitePool,
    url: String,
}

/// Shared pool handle and transaction manager. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// The underlying pool, for code that needs no session semantics.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Waits for checked-out connections to return and closes the pool.
    pub async fn close(&self) {
        self.inner.pool.close().await;
        info!(url = %self.inner.url, "Database pool closed");
    }
}

#[must_use = "builders do nothing unless you call .init()"]
#[derive(Debug)]
pub struct DatabaseBuilder {
    url: Option<String>,
    max_connections: u32,
    busy_timeout: Duration,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl DatabaseBuilder {
    /// `sqlite://path/to/file.db` or a bare file path.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub const fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// How long a writer waits on a locked database before failing.
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Opens the pool, checks it is reachable and applies pending migrations.
    ///
    /// WAL and foreign keys are connection options rather than migration
    /// statements because SQLite refuses to switch journal mode inside the
    /// transaction every migration runs in.
    ///
    /// # Errors
    /// * [`DatabaseError::Validation`] for a missing or unparsable URL or a zero pool size.
    /// * [`DatabaseError::Connection`] if the database never answers the health check.
    /// * [`DatabaseError::Migration`] if a migration fails.
    #[instrument(skip(self), fields(url = self.url))]
    pub async fn init(self) -> Result<Database, DatabaseError> {
        let url = self.url.ok_or(DatabaseError::Validation {
            message: "database url is required".into(),
            context: None,
        })?;
        if self.max_connections == 0 {
            return Err(DatabaseError::Validation {
                message: "max_connections must be greater than zero".into(),
                context: None,
            });
        }

        let options = connect_options(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .context("Opening connection pool")?;

        wait_until_healthy(&pool, &url).await?;

        sqlx::migrate!("./migrations").run(&pool).await.context("Applying migrations")?;
        info!(%url, max_connections = self.max_connections, "Database ready");

        Ok(Database { inner: Arc::new(DatabaseInner { pool, url }) })
    }
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions, DatabaseError> {
    if url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(url).map_err(|e| DatabaseError::Validation {
            message: e.to_string().into(),
            context: Some(format!("Parsing url {url}").into()),
        })
    } else {
        Ok(SqliteConnectOptions::new().filename(url))
    }
}

async fn wait_until_healthy(pool: &SqlitePool, url: &str) -> Result<(), DatabaseError> {
    let mut delay = Duration::from_millis(250);
    for attempt in 1..=HEALTH_ATTEMPTS {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => return Ok(()),
            Err(e) if attempt == HEALTH_ATTEMPTS => {
                return Err(DatabaseError::Connection {
                    message: e.to_string().into(),
                    context: Some(format!("Unhealthy after {HEALTH_ATTEMPTS} attempts: {url}").into()),
                });
            },
            Err(e) => {
                warn!(attempt, ?delay, error = %e, "Database not ready, retrying...");
                tokio::time::sleep(delay).await;
                delay *= 2;
            },
        }
    }
    Ok(())
}
