//! Browser login flow: the server-side legs of the authorization-code flow.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/auth/start[?redirect=<url>]` | Redirect to the provider's consent page |
//! | `GET` | `/auth/complete?code=<code>&state=<state>` | Exchange the code, issue a token |
//!
//! # Flow
//!
//! ```text
//! Start -> AwaitingProviderCallback -> CodeReceived -> Exchanged
//!       -> ProfileFetched -> DomainChecked -> TokenIssued -> Delivered
//! ```
//!
//! Any stage may end in a terminal [`AuthError`]. On delivery the token is
//! either appended (as `token` and `email`) to the return URL captured at
//! `start`, or written as the JSON response body.

pub mod cookie;
mod error;

use std::fmt;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, Uri, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::identity::IdentityProvider;
use crate::token::{Token, TokenService};

pub use error::AuthError;

/// Path of the login-initiation endpoint.
pub const START_PATH: &str = "/auth/start";
/// Path the provider redirects back to.
pub const COMPLETE_PATH: &str = "/auth/complete";

/// Position in the login flow, recorded on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Login initiation request received
    Start,
    /// Redirected to the provider, waiting for its callback
    AwaitingProviderCallback,
    /// Provider called back with an authorization code
    CodeReceived,
    /// Code exchanged for an access credential
    Exchanged,
    /// Profile fetched from the provider
    ProfileFetched,
    /// Profile domain matched the allowed domain
    DomainChecked,
    /// Token minted and stored
    TokenIssued,
    /// Token handed back to the caller
    Delivered,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Query parameters of `/auth/start`
#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    /// Where to send the caller once a token has been issued
    pub redirect: Option<String>,
}

/// Query parameters of `/auth/complete`
#[derive(Debug, Default, Deserialize)]
pub struct CompleteParams {
    /// Authorization code
    pub code: Option<String>,
    /// CSRF marker echoed by the provider
    pub state: Option<String>,
    /// Provider error code (user denied consent, etc.)
    pub error: Option<String>,
    /// Provider error description
    pub error_description: Option<String>,
}

/// Orchestrates `/auth/start` and `/auth/complete`.
pub struct LoginCoordinator {
    identity: Arc<dyn IdentityProvider>,
    tokens: Arc<TokenService>,
    public_url: Option<Url>,
}

impl LoginCoordinator {
    /// Create a coordinator.
    ///
    /// `public_url`, when set, replaces the request's scheme and host when
    /// building the provider redirect URL.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        tokens: Arc<TokenService>,
        public_url: Option<Url>,
    ) -> Self {
        Self {
            identity,
            tokens,
            public_url,
        }
    }

    /// The completion URL registered with the provider for this request.
    ///
    /// Must produce the same string for the `start` and `complete` requests
    /// of one flow, or the provider will reject the code exchange.
    pub fn redirect_url(&self, uri: &Uri, headers: &HeaderMap) -> Result<String, AuthError> {
        if let Some(ref base) = self.public_url {
            return Ok(format!(
                "{}{COMPLETE_PATH}",
                base.as_str().trim_end_matches('/')
            ));
        }

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .ok_or_else(|| AuthError::RedirectBuildFailed("request has no Host".to_string()))?;
        let scheme = uri.scheme_str().unwrap_or("http");

        Ok(format!("{scheme}://{host}{COMPLETE_PATH}"))
    }

    /// Handle a login-initiation request: redirect to the consent page.
    pub fn start(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        params: StartParams,
    ) -> Result<Response, AuthError> {
        debug!(stage = %LoginStage::Start, redirect = ?params.redirect, "Login requested");
        let redirect_uri = self.redirect_url(uri, headers)?;
        let state = new_state();
        let consent = self.identity.consent_url(&redirect_uri, &state);

        let mut response = Redirect::temporary(consent.as_str()).into_response();
        let set_cookies = response.headers_mut();
        set_cookies.append(header::SET_COOKIE, cookie::set(cookie::STATE_COOKIE, &state));
        match params.redirect.filter(|r| !r.is_empty()) {
            Some(ref redirect) => {
                set_cookies.append(header::SET_COOKIE, cookie::set(cookie::REDIRECT_COOKIE, redirect));
            }
            // A return URL left over from an earlier flow must not steer this one.
            None => {
                set_cookies.append(header::SET_COOKIE, cookie::clear(cookie::REDIRECT_COOKIE));
            }
        }

        debug!(redirect_uri = %redirect_uri, stage = %LoginStage::AwaitingProviderCallback, "Redirecting to consent page");
        Ok(response)
    }

    /// Handle the provider callback: exchange, authorize, issue and deliver.
    pub async fn complete(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        params: CompleteParams,
    ) -> Result<Response, AuthError> {
        let mut stage = LoginStage::AwaitingProviderCallback;
        let result = self.run_completion(uri, headers, params, &mut stage).await;
        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(stage = %stage, error = %e, "Login failed");
                Err(e)
            }
        }
    }

    async fn run_completion(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        params: CompleteParams,
        stage: &mut LoginStage,
    ) -> Result<Response, AuthError> {
        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            return Err(AuthError::ExchangeFailed(format!(
                "provider returned {error}: {description}"
            )));
        }

        verify_state(headers, params.state.as_deref())?;

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::ExchangeFailed("missing authorization code".to_string()))?;
        *stage = LoginStage::CodeReceived;

        let redirect_uri = self.redirect_url(uri, headers)?;
        let profile = self
            .identity
            .exchange(&code, &redirect_uri)
            .await
            .inspect_err(|e| {
                if matches!(e, AuthError::ProfileFetchFailed(_)) {
                    *stage = LoginStage::Exchanged;
                }
            })?;
        *stage = LoginStage::ProfileFetched;

        let token = match self.tokens.create(&profile) {
            Ok(t) => t,
            Err(e) => {
                audit::emit(&AuditEvent::denied(&profile.email, e.to_string()));
                return Err(e);
            }
        };
        *stage = LoginStage::DomainChecked;

        self.tokens
            .store(&token)
            .await
            .map_err(|e| AuthError::StorageFailed(e.to_string()))?;
        *stage = LoginStage::TokenIssued;
        audit::emit(&AuditEvent::issued(&token));

        let response = deliver(headers, &token)?;
        *stage = LoginStage::Delivered;
        info!(email = %token.email, token = %token.log_id(), "Login complete");
        Ok(response)
    }
}

/// Return the token to the caller, via the captured return URL if any.
fn deliver(headers: &HeaderMap, token: &Token) -> Result<Response, AuthError> {
    let captured = cookie::get(headers, cookie::REDIRECT_COOKIE)
        .map_err(AuthError::RedirectBuildFailed)?;

    let Some(captured) = captured else {
        let mut response = Json(token).into_response();
        response
            .headers_mut()
            .append(header::SET_COOKIE, cookie::clear(cookie::STATE_COOKIE));
        return Ok(response);
    };

    let target = append_credentials(&captured, token)?;
    let mut response = Redirect::temporary(target.as_str()).into_response();
    let set_cookies = response.headers_mut();
    set_cookies.append(header::SET_COOKIE, cookie::clear(cookie::REDIRECT_COOKIE));
    set_cookies.append(header::SET_COOKIE, cookie::clear(cookie::STATE_COOKIE));
    Ok(response)
}

/// `return_url` with `token` and `email` set, replacing any existing values.
fn append_credentials(return_url: &str, token: &Token) -> Result<Url, AuthError> {
    let mut url = Url::parse(return_url)
        .map_err(|e| AuthError::RedirectBuildFailed(format!("{return_url:?}: {e}")))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token" && k != "email")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("email", &token.email)
        .append_pair("token", &token.id);
    Ok(url)
}

/// Compare the echoed CSRF marker with this browser's cookie.
fn verify_state(headers: &HeaderMap, echoed: Option<&str>) -> Result<(), AuthError> {
    let expected = cookie::get(headers, cookie::STATE_COOKIE)
        .ok()
        .flatten()
        .ok_or(AuthError::StateMismatch("no login in progress for this browser"))?;
    let echoed = echoed.ok_or(AuthError::StateMismatch("provider did not return state"))?;

    if bool::from(expected.as_bytes().ct_eq(echoed.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::StateMismatch("state does not match"))
    }
}

/// Fresh 128-bit CSRF marker.
fn new_state() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Build the login routes.
pub fn login_routes(login: Arc<LoginCoordinator>) -> Router {
    Router::new()
        .route(START_PATH, get(start))
        .route(COMPLETE_PATH, get(complete))
        .with_state(login)
}

/// `GET /auth/start`
async fn start(
    State(login): State<Arc<LoginCoordinator>>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<StartParams>,
) -> Result<Response, AuthError> {
    login.start(&uri, &headers, params)
}

/// `GET /auth/complete`
async fn complete(
    State(login): State<Arc<LoginCoordinator>>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<CompleteParams>,
) -> Result<Response, AuthError> {
    login.complete(&uri, &headers, params).await
}
