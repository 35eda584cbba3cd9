//! The issued credential.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime of every issued token.
pub const TOKEN_TTL: Duration = Duration::hours(12);

/// An opaque bearer token issued after a successful login.
///
/// Serialized as `{id, expires, issued, user, userId}`, which is both the
/// body returned by `/auth/complete` when no return URL was captured and
/// the document persisted by the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque unique identifier; this is the bearer value.
    pub id: String,
    /// Expiry instant (`issued + TOKEN_TTL`).
    #[serde(rename = "expires")]
    pub expiry: DateTime<Utc>,
    /// Issue instant.
    pub issued: DateTime<Utc>,
    /// Subject email address.
    #[serde(rename = "user")]
    pub email: String,
    /// Stable provider-assigned subject identifier.
    #[serde(rename = "userId")]
    pub subject_id: String,
}

impl Token {
    /// Returns `true` once `now` is strictly past the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }

    /// [`is_expired_at`](Self::is_expired_at) evaluated against the wall clock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Short prefix of the id, safe to put in logs.
    #[must_use]
    pub fn log_id(&self) -> &str {
        log_prefix(&self.id)
    }
}

/// First eight characters of a token id (or the whole id if shorter).
pub(crate) fn log_prefix(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}
