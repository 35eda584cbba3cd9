//! Kubernetes TokenReview webhook.
//!
//! The API server posts a `TokenReview` carrying the bearer token a client
//! presented; we answer with the identity the token was issued to.
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | body is not a TokenReview | `400` | plain-text reason, no review |
//! | token unknown, unreadable or expired | `401` | `status.authenticated = false` |
//! | token valid | `200` | `status.authenticated = true` + user |
//!
//! The negative body is identical for unknown and expired tokens.

mod groups;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::{self, AuditEvent};
use crate::token::{TokenService, log_prefix};

pub use groups::{DEFAULT_GROUP, GroupDirectory};

/// Path the API server is configured to call.
pub const VALIDATE_PATH: &str = "/kubernetes/validate-token";
/// `apiVersion` used when the request does not ask for `v1`.
pub const API_VERSION_V1BETA1: &str = "authentication.k8s.io/v1beta1";
/// `apiVersion` echoed for `v1` requests.
pub const API_VERSION_V1: &str = "authentication.k8s.io/v1";
/// `kind` of every review document.
pub const KIND: &str = "TokenReview";

/// Incoming review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenReviewRequest {
    /// Request API version
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    /// Always `TokenReview`
    #[serde(default)]
    pub kind: String,
    /// What to review
    pub spec: TokenReviewSpec,
}

/// Review spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenReviewSpec {
    /// Bearer token presented to the API server
    pub token: String,
}

/// Review response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenReviewResponse {
    /// Response API version
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `TokenReview`
    pub kind: String,
    /// Decision
    pub status: TokenReviewStatus,
}

/// Review decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenReviewStatus {
    /// Whether the token authenticated
    pub authenticated: bool,
    /// Identity, present only when authenticated
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<KubernetesUser>,
}

/// Identity reported to Kubernetes; recomputed on every review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesUser {
    /// Token email
    pub username: String,
    /// Provider subject id
    pub uid: String,
    /// Group memberships
    pub groups: Vec<String>,
    /// Always empty
    pub extra: HashMap<String, Vec<String>>,
}

impl TokenReviewResponse {
    /// Positive review for `user`.
    #[must_use]
    pub fn authenticated(api_version: &str, user: KubernetesUser) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: KIND.to_string(),
            status: TokenReviewStatus {
                authenticated: true,
                user: Some(user),
            },
        }
    }

    /// Negative review.
    #[must_use]
    pub fn denied(api_version: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: KIND.to_string(),
            status: TokenReviewStatus {
                authenticated: false,
                user: None,
            },
        }
    }
}

/// Why a review did not authenticate.
#[derive(Debug, thiserror::Error)]
pub enum ReviewFailure {
    /// Body could not be decoded as a TokenReview
    #[error("couldn't decode request: {0}")]
    MalformedRequest(String),
    /// No such token (or the store could not be read)
    #[error("token not found")]
    TokenNotFound,
    /// Token exists but is past its expiry
    #[error("token expired")]
    TokenExpired,
}

impl ReviewFailure {
    /// HTTP status for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::TokenNotFound | Self::TokenExpired => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Validates bearer tokens on behalf of the Kubernetes API server.
pub struct TokenReviewer {
    tokens: Arc<TokenService>,
    groups: Arc<GroupDirectory>,
}

impl TokenReviewer {
    /// Create a reviewer over the given token service and group directory.
    pub fn new(tokens: Arc<TokenService>, groups: Arc<GroupDirectory>) -> Self {
        Self { tokens, groups }
    }

    /// Resolve `token` to a Kubernetes identity.
    pub async fn authenticate(&self, token: &str) -> Result<KubernetesUser, ReviewFailure> {
        let prefix = log_prefix(token);

        let found = match self.tokens.get(token).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                audit::emit(&AuditEvent::rejected(prefix, "unknown token"));
                return Err(ReviewFailure::TokenNotFound);
            }
            Err(e) => {
                warn!(error = %e, token = %prefix, "Token lookup failed");
                audit::emit(&AuditEvent::rejected(prefix, format!("lookup failed: {e}")));
                return Err(ReviewFailure::TokenNotFound);
            }
        };

        if self.tokens.is_expired(&found) {
            audit::emit(&AuditEvent::rejected(prefix, "expired"));
            return Err(ReviewFailure::TokenExpired);
        }

        let groups = self.groups.lookup(&found.email);
        audit::emit(&AuditEvent::reviewed(&found, &groups));

        Ok(KubernetesUser {
            username: found.email,
            uid: found.subject_id,
            groups,
            extra: HashMap::new(),
        })
    }

    /// Review a raw request body, producing the HTTP response.
    pub async fn review(&self, body: &[u8]) -> Response {
        let request: TokenReviewRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                let failure = ReviewFailure::MalformedRequest(e.to_string());
                debug!(error = %failure, "Rejecting malformed review");
                return (failure.status(), failure.to_string()).into_response();
            }
        };

        let api_version = response_api_version(&request.api_version);
        match self.authenticate(&request.spec.token).await {
            Ok(user) => (
                StatusCode::OK,
                Json(TokenReviewResponse::authenticated(api_version, user)),
            )
                .into_response(),
            Err(failure) => (
                failure.status(),
                Json(TokenReviewResponse::denied(api_version)),
            )
                .into_response(),
        }
    }
}

/// Echo `v1` back to `v1` callers; everyone else gets `v1beta1`.
fn response_api_version(requested: &str) -> &'static str {
    if requested == API_VERSION_V1 {
        API_VERSION_V1
    } else {
        API_VERSION_V1BETA1
    }
}

/// Build the webhook route.
pub fn webhook_routes(reviewer: Arc<TokenReviewer>) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(validate_token))
        .with_state(reviewer)
}

/// `POST /kubernetes/validate-token`
async fn validate_token(State(reviewer): State<Arc<TokenReviewer>>, body: Bytes) -> Response {
    reviewer.review(&body).await
}
