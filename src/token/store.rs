//! Persistence for issued tokens.
//!
//! The [`TokenStore`] trait abstracts over storage backends:
//!
//! - [`InMemoryTokenStore`]: a `DashMap`, for tests and throwaway servers.
//! - [`FileTokenStore`]: one JSON document per token in a directory. Each
//!   write goes to a temporary file that is renamed into place, so readers
//!   never observe a half-written token.
//!
//! Both are keyed by the token id. `put` overwrites an existing entry with
//! the same id, which makes re-storing a token idempotent. Nothing is ever
//! evicted; expiry is checked by callers at validation time.

use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::model::{Token, log_prefix};

/// Errors raised by a token store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend IO failure.
    #[error("token store IO error: {0}")]
    Io(#[from] io::Error),

    /// A stored document could not be encoded or decoded.
    #[error("token store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Trait abstracting the token storage backend.
///
/// Implementations must be `Send + Sync` because the store is shared by
/// every concurrently running request handler. Atomicity of individual
/// `put`/`get` calls is the backend's responsibility.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Insert or overwrite the token stored under `token.id`.
    async fn put(&self, token: &Token) -> Result<(), StoreError>;

    /// Look up a token by id. `Ok(None)` means no such token was ever stored.
    async fn get(&self, id: &str) -> Result<Option<Token>, StoreError>;
}

/// In-memory token store backed by a `DashMap`.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<String, Token>,
}

impl InMemoryTokenStore {
    /// Create an empty token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.get(id).map(|entry| entry.value().clone()))
    }
}

/// Durable token store: one JSON file per token.
///
/// File names are the hex SHA-256 of the token id. Ids arrive from
/// untrusted webhook requests, so they are never used as path components
/// directly.
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    /// Open (creating if needed) a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Root directory of this store.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn token_path(&self, id: &str) -> PathBuf {
        let digest = Sha256::digest(id.as_bytes());
        self.base_dir.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn put(&self, token: &Token) -> Result<(), StoreError> {
        let path = self.token_path(&token.id);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let body = serde_json::to_vec(token)?;

        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(token = %token.log_id(), path = %path.display(), "Stored token");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Token>, StoreError> {
        let path = self.token_path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(token = %log_prefix(id), "Token not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
