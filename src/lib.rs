//! kauth
//!
//! Bridges a Google OAuth2 login to Kubernetes authentication.
//!
//! - **Server** (`kauth serve`): runs the browser login (`/auth/start`,
//!   `/auth/complete`), issues opaque 12-hour bearer tokens to identities in
//!   the allowed domain, and answers the API server's `TokenReview` webhook
//!   (`/kubernetes/validate-token`) with the identity and its groups.
//! - **Client** (`kauth login`): opens the browser, receives the token on a
//!   loopback listener and writes it into `~/.kube/config`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod identity;
pub mod kubeconfig;
pub mod login;
pub mod server;
pub mod token;
pub mod webhook;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` of `"json"` selects
/// structured output; anything else is human-readable text. Both go to
/// stderr so stdout carries only command output.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?,
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?,
    }

    Ok(())
}
