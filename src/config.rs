//! Configuration management

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Legacy environment variable holding the OAuth client identifier
pub const ENV_OAUTH_CLIENT: &str = "OAUTH2_CLIENT_ID";
/// Legacy environment variable holding the OAuth client secret
pub const ENV_OAUTH_SECRET: &str = "OAUTH2_CLIENT_SECRET";
/// Legacy environment variable holding the allowed authorization domain
pub const ENV_VALID_DOMAIN: &str = "VALID_DOMAIN";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Identity provider configuration
    pub oauth: OAuthConfig,
    /// Email to groups lookup document (YAML mapping of email -> [group])
    pub groups_file: GroupsFile,
    /// Token persistence
    pub token_store: TokenStoreConfig,
}

/// Path of the group membership document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupsFile(pub PathBuf);

impl Default for GroupsFile {
    fn default() -> Self {
        Self(PathBuf::from("groups.yaml"))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL. When unset the OAuth redirect URL is
    /// derived from the request's `Host` header.
    pub public_url: Option<Url>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: None,
        }
    }
}

/// Identity provider (OAuth2 authorization-code flow) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// OAuth client identifier
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Only identities whose provider domain claim equals this value may log in
    pub allowed_domain: String,
    /// Consent page endpoint
    pub auth_url: Url,
    /// Authorization-code exchange endpoint
    pub token_url: Url,
    /// Profile endpoint
    pub userinfo_url: Url,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            allowed_domain: String::new(),
            auth_url: fixed_url("https://accounts.google.com/o/oauth2/auth"),
            token_url: fixed_url("https://oauth2.googleapis.com/token"),
            userinfo_url: fixed_url("https://www.googleapis.com/oauth2/v3/userinfo"),
        }
    }
}

fn fixed_url(s: &str) -> Url {
    Url::parse(s).expect("built-in endpoint URL is valid")
}

/// Which token store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreBackend {
    /// Process-local map, lost on restart
    Memory,
    /// One JSON document per token under `directory`
    #[default]
    File,
}

/// Token store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenStoreConfig {
    /// Backend kind
    pub backend: TokenStoreBackend,
    /// Directory for the file backend
    pub directory: PathBuf,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            backend: TokenStoreBackend::File,
            directory: PathBuf::from("tokens"),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional YAML file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
        }

        let config: Self = Self::figment(path)
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        if config.env_files.is_empty() {
            return Ok(config);
        }

        // Env files may supply the variables below, so extract again once they are set
        config.load_env_files();
        Self::figment(path)
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(p) = path {
            figment = figment.merge(Yaml::file(p));
        }

        // Prefixed variables first, the bare legacy names win
        figment
            .merge(Env::prefixed("KAUTH_").split("__"))
            .merge(Env::raw().filter_map(|key| {
                let key = key.as_str();
                if key.eq_ignore_ascii_case(ENV_OAUTH_CLIENT) {
                    Some("oauth.client_id".into())
                } else if key.eq_ignore_ascii_case(ENV_OAUTH_SECRET) {
                    Some("oauth.client_secret".into())
                } else if key.eq_ignore_ascii_case(ENV_VALID_DOMAIN) {
                    Some("oauth.allowed_domain".into())
                } else {
                    None
                }
            }))
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Check that everything the server needs to run the login flow is present
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing setting.
    pub fn validate_server(&self) -> Result<()> {
        let missing = [
            (self.oauth.client_id.is_empty(), ENV_OAUTH_CLIENT),
            (self.oauth.client_secret.is_empty(), ENV_OAUTH_SECRET),
            (self.oauth.allowed_domain.is_empty(), ENV_VALID_DOMAIN),
        ];
        if let Some((_, name)) = missing.iter().find(|(empty, _)| *empty) {
            return Err(Error::Config(format!("{name} must be set")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_google_endpoints() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.oauth.token_url.as_str(), "https://oauth2.googleapis.com/token");
        assert_eq!(config.groups_file.0, PathBuf::from("groups.yaml"));
        assert_eq!(config.token_store.backend, TokenStoreBackend::File);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r#"
server:
  port: 9000
  public_url: "https://auth.example.com"
oauth:
  client_id: "client"
  client_secret: "secret"
  allowed_domain: "co.com"
token_store:
  backend: memory
groups_file: /etc/kauth/groups.yaml
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.server.public_url.unwrap().as_str(),
            "https://auth.example.com/"
        );
        assert_eq!(config.oauth.allowed_domain, "co.com");
        assert_eq!(config.token_store.backend, TokenStoreBackend::Memory);
        assert_eq!(config.groups_file.0, PathBuf::from("/etc/kauth/groups.yaml"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kauth.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "server:\n  port: 7001\noauth:\n  client_id: from-file").unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 7001);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/kauth.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_server_names_missing_setting() {
        let mut config = Config::default();
        config.oauth.client_id = "id".to_string();
        config.oauth.client_secret = "secret".to_string();

        let err = config.validate_server().unwrap_err();
        assert!(err.to_string().contains(ENV_VALID_DOMAIN));

        config.oauth.allowed_domain = "co.com".to_string();
        assert!(config.validate_server().is_ok());
    }
}
