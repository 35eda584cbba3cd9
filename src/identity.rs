//! Identity provider integration: OAuth2 authorization-code exchange and
//! profile fetch.
//!
//! [`IdentityProvider`] is the seam used by the login coordinator;
//! [`GoogleIdentity`] talks to Google's OAuth2 endpoints (or any endpoints
//! configured in [`OAuthConfig`] that follow the same contract).
//!
//! The `redirect_uri` passed to [`IdentityProvider::exchange`] must be
//! byte-for-byte the one that was embedded in the consent URL, otherwise
//! the provider rejects the code.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::OAuthConfig;
use crate::login::AuthError;

/// Scopes requested on the consent page.
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Verified profile returned by the identity provider.
///
/// Lives only for the duration of a login completion; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    /// Email address
    pub email: String,
    /// Whether the provider has verified the email
    #[serde(default)]
    pub email_verified: bool,
    /// Organizational (hosted) domain claim; empty for consumer accounts
    #[serde(default, rename = "hd")]
    pub domain: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Given name
    #[serde(default)]
    pub given_name: String,
    /// Family name
    #[serde(default)]
    pub family_name: String,
    /// Locale tag
    #[serde(default)]
    pub locale: String,
    /// Stable subject identifier
    #[serde(rename = "sub")]
    pub subject: String,
    /// Avatar URL
    #[serde(default)]
    pub picture: String,
}

/// The provider side of the authorization-code flow.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Consent page URL for a flow that will complete at `redirect_uri`.
    fn consent_url(&self, redirect_uri: &str, state: &str) -> Url;

    /// Exchange `code` for an access credential and fetch the user's profile.
    ///
    /// # Errors
    ///
    /// [`AuthError::ExchangeFailed`] if the code is rejected or the provider is
    /// unreachable; [`AuthError::ProfileFetchFailed`] if the profile request
    /// fails or returns malformed data.
    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<Profile, AuthError>;
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Google OAuth2 identity provider
pub struct GoogleIdentity {
    http_client: Client,
    config: OAuthConfig,
}

impl GoogleIdentity {
    /// Create a provider from configuration
    #[must_use]
    pub fn new(http_client: Client, config: OAuthConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Exchange an authorization code for an access token
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("client_secret", self.config.client_secret.as_str());

        let response = self
            .http_client
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed(format!("HTTP {status} - {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("unreadable token response: {e}")))?;

        debug!(
            token_type = token.token_type.as_deref().unwrap_or("Bearer"),
            expires_in = token.expires_in,
            "Authorization code exchanged"
        );
        Ok(token.access_token)
    }

    /// Fetch the profile of the user owning `access_token`
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AuthError> {
        let response = self
            .http_client
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(format!("profile request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ProfileFetchFailed(format!("HTTP {status} - {body}")));
        }

        response
            .json::<Profile>()
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(format!("malformed profile: {e}")))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoogleIdentity {
    fn consent_url(&self, redirect_uri: &str, state: &str) -> Url {
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("state", state);
        url
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<Profile, AuthError> {
        let access_token = self.exchange_code(code, redirect_uri).await?;
        let profile = self.fetch_profile(&access_token).await?;
        info!(email = %profile.email, domain = %profile.domain, "Fetched identity profile");
        Ok(profile)
    }
}
