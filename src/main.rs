//! kauth - Google login for Kubernetes

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use url::Url;

use kauth::{
    cli::{Cli, Command},
    config::Config,
    flow::{LoginOptions, SystemBrowser, run_login},
    kubeconfig::{self, KubeConfig},
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Serve { config, host, port } => run_server(config, host, port).await,
        Command::Login {
            auth_url,
            cluster,
            local_port,
            kubeconfig,
            timeout,
        } => run_client(auth_url, cluster, local_port, kubeconfig, timeout).await,
    }
}

async fn run_server(config: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> ExitCode {
    let config = match Config::load(config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        domain = %config.oauth.allowed_domain,
        "Starting kauth server"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run_client(
    auth_url: Url,
    cluster: Option<String>,
    local_port: u16,
    kubeconfig: Option<PathBuf>,
    timeout: Option<u64>,
) -> ExitCode {
    let kubeconfig = match kubeconfig.map_or_else(kubeconfig::default_path, Ok) {
        Ok(path) => path,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let cluster = match cluster {
        Some(c) => c,
        None => match KubeConfig::load(&kubeconfig).map(|c| c.current_cluster().map(str::to_string)) {
            Ok(Some(current)) => current,
            Ok(None) => {
                error!("No --cluster given and {} has no current-context", kubeconfig.display());
                return ExitCode::FAILURE;
            }
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let options = LoginOptions {
        auth_url,
        cluster,
        local_port,
        kubeconfig,
        timeout: timeout.map(Duration::from_secs),
    };

    match run_login(&options, &SystemBrowser).await {
        Ok(outcome) => {
            info!(email = %outcome.email, context = %outcome.context, "Login complete");
            println!("Saved new credentials.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Login failed: {e}");
            ExitCode::FAILURE
        }
    }
}
