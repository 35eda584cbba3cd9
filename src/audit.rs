//! Audit logging for token lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with a JSON `audit` field,
//! making the trail queryable by any log aggregator.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `token.issued` | A login completed and a token was stored |
//! | `login.denied` | A login completed for an identity outside the allowed domain |
//! | `token.reviewed` | The webhook authenticated a token |
//! | `token.rejected` | The webhook refused a token (unknown, expired or lookup error) |
//!
//! Token ids appear only as an eight-character prefix.

use serde::Serialize;

use crate::token::Token;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"token.issued"`).
    pub event: &'static str,
    /// Subject email, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Provider subject id, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Prefix of the affected token id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Groups granted by a successful review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Human-readable reason for denial events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    /// Construct a `token.issued` event.
    #[must_use]
    pub fn issued(token: &Token) -> Self {
        Self {
            event: "token.issued",
            email: Some(token.email.clone()),
            subject: Some(token.subject_id.clone()),
            token: Some(token.log_id().to_string()),
            groups: None,
            reason: None,
        }
    }

    /// Construct a `login.denied` event.
    #[must_use]
    pub fn denied(email: &str, reason: impl Into<String>) -> Self {
        Self {
            event: "login.denied",
            email: Some(email.to_string()),
            subject: None,
            token: None,
            groups: None,
            reason: Some(reason.into()),
        }
    }

    /// Construct a `token.reviewed` event.
    #[must_use]
    pub fn reviewed(token: &Token, groups: &[String]) -> Self {
        Self {
            event: "token.reviewed",
            email: Some(token.email.clone()),
            subject: Some(token.subject_id.clone()),
            token: Some(token.log_id().to_string()),
            groups: Some(groups.to_vec()),
            reason: None,
        }
    }

    /// Construct a `token.rejected` event.
    #[must_use]
    pub fn rejected(token_prefix: &str, reason: impl Into<String>) -> Self {
        Self {
            event: "token.rejected",
            email: None,
            subject: None,
            token: Some(token_prefix.to_string()),
            groups: None,
            reason: Some(reason.into()),
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "kauth audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
