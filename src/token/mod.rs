//! Issued bearer tokens: model, persistence and lifecycle.
//!
//! A [`Token`] is minted by [`TokenService::create`] once a login completes
//! for an identity in the allowed domain. Tokens are immutable after
//! creation and are never deleted: expiry is enforced lazily, at the moment
//! a token is presented for validation.
//!
//! Persistence is abstracted by the [`TokenStore`] trait so the server can
//! run against the in-memory map (tests, single-replica dev setups) or the
//! durable file backend.

mod model;
mod service;
mod store;

pub use model::{TOKEN_TTL, Token};
pub(crate) use model::log_prefix;
pub use service::TokenService;
pub use store::{FileTokenStore, InMemoryTokenStore, StoreError, TokenStore};
