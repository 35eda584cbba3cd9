//! Command-line login flow
//!
//! Opens the browser at the auth server's start endpoint, waits on a
//! loopback listener for the issued credentials, and merges them into the
//! local kubeconfig.

mod callback;

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::kubeconfig::KubeConfig;
use crate::login::START_PATH;
use crate::{Error, Result};

pub use callback::{CALLBACK_PATH, CallbackServer, Credentials, start_callback_server};

/// Default loopback port for the callback listener
pub const DEFAULT_LOCAL_PORT: u16 = 8976;

/// Opens URLs for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`.
    fn open(&self, url: &Url) -> Result<()>;
}

/// The platform's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        open::that(url.as_str()).map_err(|e| Error::BrowserLaunchFailed(e.to_string()))
    }
}

/// Inputs of a login run
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Base URL of the auth server
    pub auth_url: Url,
    /// Cluster the credentials are for
    pub cluster: String,
    /// Loopback port for the callback listener
    pub local_port: u16,
    /// kubeconfig to update
    pub kubeconfig: PathBuf,
    /// Give up waiting for the browser after this long
    pub timeout: Option<Duration>,
}

/// Outcome of a successful login run
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Identity the token belongs to
    pub email: String,
    /// Context now selected in the kubeconfig
    pub context: String,
}

/// Start URL for a browser login that hands back to `callback_url`.
///
/// Any path on `auth_url` is replaced; other query parameters are kept.
pub fn start_url(auth_url: &Url, callback_url: &str) -> Url {
    let mut url = auth_url.clone();
    url.set_path(START_PATH);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "redirect")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("redirect", callback_url);
    url
}

/// Run one browser login and persist the result.
pub async fn run_login(options: &LoginOptions, browser: &dyn BrowserLauncher) -> Result<LoginOutcome> {
    let server = start_callback_server(options.local_port).await?;
    let url = start_url(&options.auth_url, &server.callback_url());

    info!(url = %url, "Opening browser for login");
    browser.open(&url)?;

    let creds = server.wait_for_callback(options.timeout).await?;
    info!(email = %creds.email, cluster = %options.cluster, "Received credentials");

    let mut config = KubeConfig::load(&options.kubeconfig)?;
    let context = config.merge_credentials(&creds.email, &creds.token, &options.cluster)?;
    config.save(&options.kubeconfig)?;

    Ok(LoginOutcome {
        email: creds.email,
        context,
    })
}
