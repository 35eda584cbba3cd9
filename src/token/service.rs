//! Token lifecycle: minting, persistence and expiry checks.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{TOKEN_TTL, Token};
use super::store::{StoreError, TokenStore};
use crate::identity::Profile;
use crate::login::AuthError;

/// Creates, stores and retrieves issued tokens.
///
/// Holds the domain restriction so that no identifier is ever minted for a
/// profile outside the allowed domain.
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    allowed_domain: String,
}

impl TokenService {
    /// Create a service over `store` admitting only `allowed_domain`.
    pub fn new(store: Arc<dyn TokenStore>, allowed_domain: impl Into<String>) -> Self {
        Self {
            store,
            allowed_domain: allowed_domain.into(),
        }
    }

    /// The configured allowed authorization domain.
    #[must_use]
    pub fn allowed_domain(&self) -> &str {
        &self.allowed_domain
    }

    /// Whether the profile's domain claim matches the allowed domain exactly.
    #[must_use]
    pub fn is_authorized(&self, profile: &Profile) -> bool {
        profile.domain == self.allowed_domain
    }

    /// Mint a token for `profile`.
    ///
    /// The id is a random (v4) UUID; the token expires [`TOKEN_TTL`] after
    /// issue. Nothing is persisted here.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidDomain`] when the profile is outside the allowed domain.
    pub fn create(&self, profile: &Profile) -> Result<Token, AuthError> {
        if !self.is_authorized(profile) {
            warn!(
                email = %profile.email,
                domain = %profile.domain,
                allowed = %self.allowed_domain,
                "Refusing token for identity outside allowed domain"
            );
            return Err(AuthError::InvalidDomain(profile.domain.clone()));
        }

        let issued = Utc::now();
        Ok(Token {
            id: Uuid::new_v4().to_string(),
            expiry: issued + TOKEN_TTL,
            issued,
            email: profile.email.clone(),
            subject_id: profile.subject.clone(),
        })
    }

    /// Persist `token`; storing the same id twice overwrites.
    pub async fn store(&self, token: &Token) -> Result<(), StoreError> {
        self.store.put(token).await
    }

    /// Fetch a token by id. Expired tokens are returned as-is.
    pub async fn get(&self, id: &str) -> Result<Option<Token>, StoreError> {
        let token = self.store.get(id).await?;
        debug!(found = token.is_some(), "Token lookup");
        Ok(token)
    }

    /// `now > token.expiry`, evaluated at call time.
    #[must_use]
    pub fn is_expired(&self, token: &Token) -> bool {
        token.is_expired()
    }
}
