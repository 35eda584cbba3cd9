//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use crate::flow::DEFAULT_LOCAL_PORT;

/// Google login for Kubernetes: an auth server issuing bearer tokens and a
/// client that stores them in your kubeconfig
#[derive(Parser, Debug)]
#[command(name = "kauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "KAUTH_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "KAUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the auth server (login pages and token review webhook)
    Serve {
        /// Path to configuration file (YAML)
        #[arg(short, long, env = "KAUTH_CONFIG")]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Log in through the browser and save the token to kubeconfig
    Login {
        /// Base URL of the auth server
        #[arg(long, env = "KAUTH_AUTH_URL")]
        auth_url: Url,

        /// Cluster the token is for (defaults to the current context's cluster)
        #[arg(long)]
        cluster: Option<String>,

        /// Loopback port for the login callback
        #[arg(long, default_value_t = DEFAULT_LOCAL_PORT)]
        local_port: u16,

        /// kubeconfig to update (defaults to ~/.kube/config)
        #[arg(long, env = "KUBECONFIG")]
        kubeconfig: Option<PathBuf>,

        /// Give up after this many seconds without a browser response
        #[arg(long)]
        timeout: Option<u64>,
    },
}
