//! Loopback callback listener
//!
//! A single-use HTTP server on `127.0.0.1` that receives the credentials
//! the auth server hands back after a browser login. Only the first
//! delivery is accepted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Path the auth server redirects the browser to
pub const CALLBACK_PATH: &str = "/authed";

/// Credentials delivered by the auth server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Opaque bearer token
    pub token: String,
    /// Identity the token was issued to
    pub email: String,
}

/// Callback query parameters
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Opaque bearer token
    pub token: Option<String>,
    /// Identity the token was issued to
    pub email: Option<String>,
}

type Delivery = Arc<Mutex<Option<oneshot::Sender<Result<Credentials>>>>>;

/// A bound callback listener waiting for its single delivery
pub struct CallbackServer {
    addr: SocketAddr,
    rx: oneshot::Receiver<Result<Credentials>>,
    server: JoinHandle<()>,
}

/// Bind `127.0.0.1:port` and start serving the callback route.
///
/// Port 0 picks a free port; see [`CallbackServer::callback_url`].
pub async fn start_callback_server(port: u16) -> Result<CallbackServer> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::ListenerBindFailed {
            addr: addr.to_string(),
            source,
        })?;
    let addr = listener.local_addr()?;

    let (tx, rx) = oneshot::channel();
    let delivery: Delivery = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(delivery);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "Callback server stopped");
        }
    });

    info!(url = %format!("http://{addr}{CALLBACK_PATH}"), "Callback listener ready");
    Ok(CallbackServer { addr, rx, server })
}

impl CallbackServer {
    /// Bound address
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL the auth server should redirect to
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.addr)
    }

    /// Wait for the delivery, then shut the listener down.
    ///
    /// With no `timeout` this waits indefinitely.
    pub async fn wait_for_callback(self, timeout: Option<Duration>) -> Result<Credentials> {
        let Self { rx, server, .. } = self;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    server.abort();
                    return Err(Error::CallbackTimeout(limit));
                }
            },
            None => rx.await,
        };

        server.abort();
        received.map_err(|_| Error::Internal("Callback channel closed unexpectedly".to_string()))?
    }
}

async fn handle_callback(
    State(delivery): State<Delivery>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    debug!(email = ?params.email, has_token = params.token.is_some(), "Received login callback");

    let Some(tx) = delivery.lock().await.take() else {
        return (
            StatusCode::CONFLICT,
            Html(error_page("This login has already completed.")),
        );
    };

    match (params.token, params.email) {
        (Some(token), Some(email)) if !token.is_empty() && !email.is_empty() => {
            let _ = tx.send(Ok(Credentials { token, email }));
            (StatusCode::OK, Html(success_page()))
        }
        _ => {
            let _ = tx.send(Err(Error::Callback(
                "callback is missing the token or email parameter".to_string(),
            )));
            (
                StatusCode::BAD_REQUEST,
                Html(error_page("The login response did not include credentials.")),
            )
        }
    }
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>kauth</title></head>
<body>
    <h1>Finished authentication.</h1>
    <p>You can close this browser.</p>
    <script>setTimeout(() => window.close(), 3000);</script>
</body>
</html>"#
        .to_string()
}

fn error_page(description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>kauth</title></head>
<body>
    <h1>Authentication failed</h1>
    <p>{description}</p>
</body>
</html>"#
    )
}
