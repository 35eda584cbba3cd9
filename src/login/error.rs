//! Login flow failures and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Terminal failure of a server-side login attempt.
///
/// Authorization failures map to `401`; everything else is a server fault
/// and maps to `500`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The authorization code could not be exchanged.
    #[error("couldn't retrieve oauth token: {0}")]
    ExchangeFailed(String),

    /// The profile request failed or returned malformed data.
    #[error("couldn't retrieve user data: {0}")]
    ProfileFetchFailed(String),

    /// The identity's domain is not the allowed domain.
    #[error("error creating token: invalid email domain {0:?}")]
    InvalidDomain(String),

    /// The CSRF marker returned by the provider does not match this browser's flow.
    #[error("login state mismatch: {0}")]
    StateMismatch(&'static str),

    /// The token could not be persisted.
    #[error("error storing token: {0}")]
    StorageFailed(String),

    /// The captured return URL (or our own callback URL) could not be built.
    #[error("error generating redirect: {0}")]
    RedirectBuildFailed(String),
}

impl AuthError {
    /// HTTP status for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidDomain(_) | Self::StateMismatch(_) => StatusCode::UNAUTHORIZED,
            Self::ExchangeFailed(_)
            | Self::ProfileFetchFailed(_)
            | Self::StorageFailed(_)
            | Self::RedirectBuildFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
