//! Kubernetes client configuration (`~/.kube/config`) model and merge.
//!
//! The document is read whole, merged in memory and written back whole;
//! there are no partial updates. Fields this crate does not model are kept
//! through a load/save cycle.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::{Error, Result};

type Extra = BTreeMap<String, serde_yaml::Value>;

/// A kubeconfig document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeConfig {
    /// Document API version
    #[serde(rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Document kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Name of the active context
    #[serde(rename = "current-context", skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    /// Credentials, one per identity
    #[serde(deserialize_with = "null_as_empty")]
    pub users: Vec<NamedUser>,
    /// Cluster endpoints
    #[serde(deserialize_with = "null_as_empty")]
    pub clusters: Vec<NamedCluster>,
    /// Cluster and user pairings
    #[serde(deserialize_with = "null_as_empty")]
    pub contexts: Vec<NamedContext>,
    /// Everything else (`preferences`, `extensions`, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Config".to_string()),
            current_context: None,
            users: Vec::new(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            extra: Extra::new(),
        }
    }
}

/// `users[]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    /// Identity name (the login email)
    pub name: String,
    /// Credential
    #[serde(default)]
    pub user: UserCredential,
}

/// Credential of a user entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCredential {
    /// Bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Other credential fields (client certificates, exec plugins, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

/// `clusters[]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Cluster name
    pub name: String,
    /// Endpoint details
    #[serde(default)]
    pub cluster: Cluster,
}

/// Cluster endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// API server URL
    #[serde(default)]
    pub server: String,
    /// Base64 CA bundle
    #[serde(
        rename = "certificate-authority-data",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
    /// Other cluster fields
    #[serde(flatten)]
    pub extra: Extra,
}

/// `contexts[]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Context name
    pub name: String,
    /// Pairing
    pub context: ContextRef,
}

/// Cluster and user pairing of a context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextRef {
    /// Referenced cluster name
    #[serde(default)]
    pub cluster: String,
    /// Referenced user name
    #[serde(default)]
    pub user: String,
    /// Other context fields (`namespace`, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl KubeConfig {
    /// Parse a kubeconfig document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Read the document at `path`. A missing file yields an empty document.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml(&contents).map_err(|e| Error::config_io(path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No kubeconfig yet, starting empty");
                Ok(Self::default())
            }
            Err(e) => Err(Error::config_io(path, e)),
        }
    }

    /// Replace the document at `path` with this one.
    ///
    /// Written to a sibling temporary file first and renamed over the
    /// target, so readers see either the old or the new document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self).map_err(|e| Error::config_io(path, e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::config_io(path, e))?;
        }

        let tmp = temp_path(path);
        std::fs::write(&tmp, contents).map_err(|e| Error::config_io(&tmp, e))?;
        restrict_permissions(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::config_io(path, e));
        }
        Ok(())
    }

    /// Set the token of user `identity`, appending the user if absent.
    pub fn update_user(&mut self, identity: &str, token: &str) {
        if let Some(existing) = self.users.iter_mut().find(|u| u.name == identity) {
            existing.user.token = Some(token.to_string());
            return;
        }
        self.users.push(NamedUser {
            name: identity.to_string(),
            user: UserCredential {
                token: Some(token.to_string()),
                extra: Extra::new(),
            },
        });
    }

    /// Point the context for `cluster` at user `identity`.
    ///
    /// An existing context referencing `cluster` is updated in place;
    /// otherwise a context named `cluster` is appended. Fails without
    /// changing anything when that name is already taken by a context for
    /// some other cluster, since kubeconfig context names must be unique.
    pub fn update_context_user(&mut self, identity: &str, cluster: &str) -> Result<&NamedContext> {
        if let Some(i) = self.contexts.iter().position(|c| c.context.cluster == cluster) {
            self.contexts[i].context.user = identity.to_string();
            return Ok(&self.contexts[i]);
        }

        if let Some(taken) = self.contexts.iter().find(|c| c.name == cluster) {
            return Err(Error::ContextConflict {
                context: taken.name.clone(),
                cluster: taken.context.cluster.clone(),
                requested: cluster.to_string(),
            });
        }

        self.contexts.push(NamedContext {
            name: cluster.to_string(),
            context: ContextRef {
                cluster: cluster.to_string(),
                user: identity.to_string(),
                extra: Extra::new(),
            },
        });
        Ok(&self.contexts[self.contexts.len() - 1])
    }

    /// Store `token` for `identity`, pair it with `cluster` and make that
    /// context current. Returns the context name.
    pub fn merge_credentials(&mut self, identity: &str, token: &str, cluster: &str) -> Result<String> {
        let name = self.update_context_user(identity, cluster)?.name.clone();
        self.update_user(identity, token);
        self.current_context = Some(name.clone());
        Ok(name)
    }

    /// Cluster referenced by the current context.
    ///
    /// Falls back to the current-context name itself when no context of
    /// that name exists.
    #[must_use]
    pub fn current_cluster(&self) -> Option<&str> {
        let current = self.current_context.as_deref()?;
        let cluster = self
            .contexts
            .iter()
            .find(|c| c.name == current)
            .map(|c| c.context.cluster.as_str())
            .filter(|c| !c.is_empty());
        Some(cluster.unwrap_or(current))
    }
}

/// Default kubeconfig location, `~/.kube/config`.
pub fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Internal("Cannot determine home directory".to_string()))?;
    Ok(home.join(".kube").join("config"))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| Error::config_io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
