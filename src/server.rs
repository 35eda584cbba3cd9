//! HTTP server: wires configuration into the login and token review
//! surfaces and serves them until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

use crate::config::{Config, TokenStoreBackend};
use crate::identity::GoogleIdentity;
use crate::login::{LoginCoordinator, login_routes};
use crate::token::{FileTokenStore, InMemoryTokenStore, TokenService, TokenStore};
use crate::webhook::{GroupDirectory, TokenReviewer, webhook_routes};
use crate::{Error, Result};

/// Liveness probe path
pub const HEALTH_PATH: &str = "/healthz";

/// The auth server
pub struct Server {
    addr: SocketAddr,
    login: Arc<LoginCoordinator>,
    reviewer: Arc<TokenReviewer>,
}

impl Server {
    /// Build every component from `config`.
    ///
    /// # Errors
    ///
    /// Fails on missing OAuth settings, an unreadable groups file, or a
    /// token directory that cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        config.validate_server()?;

        let addr = SocketAddr::new(
            config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            config.server.port,
        );

        let store: Arc<dyn TokenStore> = match config.token_store.backend {
            TokenStoreBackend::Memory => Arc::new(InMemoryTokenStore::new()),
            TokenStoreBackend::File => {
                let dir = &config.token_store.directory;
                Arc::new(FileTokenStore::new(dir.clone()).map_err(|e| {
                    Error::Config(format!("Token directory {}: {e}", dir.display()))
                })?)
            }
        };
        info!(backend = ?config.token_store.backend, "Token store ready");

        let tokens = Arc::new(TokenService::new(store, config.oauth.allowed_domain.clone()));
        let groups = Arc::new(GroupDirectory::from_file(&config.groups_file.0)?);
        let identity = Arc::new(GoogleIdentity::new(reqwest::Client::new(), config.oauth));

        Ok(Self {
            addr,
            login: Arc::new(LoginCoordinator::new(
                identity,
                Arc::clone(&tokens),
                config.server.public_url,
            )),
            reviewer: Arc::new(TokenReviewer::new(tokens, groups)),
        })
    }

    /// Address the server will bind
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let app = router(self.login, self.reviewer);

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| Error::ListenerBindFailed {
                addr: self.addr.to_string(),
                source,
            })?;
        info!(addr = %self.addr, "kauth listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("kauth stopped");
        Ok(())
    }
}

/// Full HTTP surface: login, token review and health.
pub fn router(login: Arc<LoginCoordinator>, reviewer: Arc<TokenReviewer>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .merge(login_routes(login))
        .merge(webhook_routes(reviewer))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
