//! # Keeper Server
//!
//! HTTP and WebSocket front of the keeper: sign-up and sign-in, the encrypted
//! vault routes, and chunked file transfer, all on `Axum` over SQLite.
//!
//! ## Example
//! ```no_run
//! use keeper_server::Server;
//!
//! # async fn run() -> anyhow::Result<()> {
//! Server::builder().port(8080).build().await?.run().await
//! # }
//! ```

mod auth;
mod routes;
mod state;
mod ws;

pub use state::AppState;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use keeper_cipher::FieldCipher;
use keeper_database::Database;
use keeper_domain::config::{ApiConfig, SslConfig};
use keeper_identity::SessionManager;
use keeper_storage::Storage;
use keeper_transfer::{FileService, TransferEngine};
use keeper_vault::Vault;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// How long in-flight requests and transfers get after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    cfg: ApiConfig,
}

impl ServerBuilder {
    pub fn config(mut self, cfg: ApiConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.server.port = port;
        self
    }

    async fn init_database(&self) -> Result<Database> {
        let db_cfg = &self.cfg.database;
        Database::builder()
            .url(&db_cfg.url)
            .max_connections(db_cfg.max_connections)
            .busy_timeout(Duration::from_secs(db_cfg.busy_timeout_seconds))
            .init()
            .await
            .context("Failed to open the database")
    }

    /// Opens the database and the file store and wires every slice.
    ///
    /// # Errors
    /// Fails when the SSL files are missing, the database or storage root cannot
    /// be opened, or a key cannot be derived from the configured secret.
    pub async fn build(self) -> Result<Server> {
        if let Some(ssl) = &self.cfg.server.ssl {
            check_tls_files(ssl)?;
        }
        let security = &self.cfg.security;
        if security.uses_default_secret() {
            warn!("SECURITY: the default master secret is in use; set security.secret before storing real data");
        }

        let db = self.init_database().await?;
        let storage = Storage::builder()
            .root(&self.cfg.storage.data_dir)
            .codec_pool_size(self.cfg.storage.codec_pool_size)
            .connect()
            .await
            .context("Failed to open the file store")?;

        let cipher = FieldCipher::builder()
            .derived_key(&security.secret, &security.salt)
            .context("Failed to derive the field key")?
            .build()
            .context("Failed to build the field cipher")?;
        let sessions = SessionManager::builder()
            .database(db.clone())
            .security(security.clone())
            .build()
            .context("Failed to set up sessions")?;

        let state = AppState {
            vault: Vault::new(&db, &cipher),
            transfers: TransferEngine::new(db.clone(), storage.clone()),
            files: FileService::new(db.clone(), storage),
            sessions,
            db,
            config: self.cfg,
        };
        Ok(Server { state })
    }
}

#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The full route table, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        routes::init(self.state.clone())
    }

    /// Serves until Ctrl+C or SIGTERM, then drains for [`SHUTDOWN_GRACE`].
    ///
    /// # Errors
    /// Fails when the address cannot be bound or the TLS files cannot be loaded.
    pub async fn run(self) -> Result<()> {
        let cfg = self.state.config.clone();
        let address = SocketAddr::new(cfg.server.address, cfg.server.port);
        let app = self.router();

        let handle = Handle::<SocketAddr>::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!("Error while waiting for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received, starting graceful shutdown");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        if let Some(ssl_config) = &cfg.server.ssl {
            info!("Starting HTTPS server on https://{address}");
            let tls_config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(&ssl_config.cert, &ssl_config.key)
                    .await
                    .context("Failed to load SSL/TLS certificates")?;

            axum_server::bind_rustls(address, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        } else {
            info!("Starting HTTP server on http://{address}");
            axum_server::bind(address)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }

        self.state.db.close().await;
        info!("Server shutdown complete");
        Ok(())
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }
}

/// Certificate and key must exist. A key readable by group or others is
/// served anyway but reported.
fn check_tls_files(ssl: &SslConfig) -> Result<()> {
    for (what, path) in [("certificate", &ssl.cert), ("private key", &ssl.key)] {
        if !path.is_file() {
            anyhow::bail!("TLS {what} not found at {}", path.display());
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = ssl.key.metadata().context("Reading TLS key metadata")?.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(key = %ssl.key.display(), mode = %format!("{mode:o}"), "TLS private key is accessible to other users");
        }
    }
    Ok(())
}

/// Waits for SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }
    Ok(())
}
