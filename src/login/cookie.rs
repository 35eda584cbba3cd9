//! Minimal cookie helpers for the two short-lived login cookies.
//!
//! Values are base64url encoded so arbitrary return URLs survive the
//! cookie grammar unchanged.

use axum::http::{HeaderMap, HeaderValue, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

/// Cookie carrying the caller-supplied return URL between `start` and `complete`.
pub const REDIRECT_COOKIE: &str = "redirect";
/// Cookie carrying the per-flow CSRF marker.
pub const STATE_COOKIE: &str = "oauth_state";
/// Lifetime of both cookies, in seconds.
pub const COOKIE_MAX_AGE: u32 = 300;

/// `Set-Cookie` value storing `value` under `name`.
pub fn set(name: &str, value: &str) -> HeaderValue {
    let encoded = URL_SAFE_NO_PAD.encode(value.as_bytes());
    header_value(&format!(
        "{name}={encoded}; Path=/; Max-Age={COOKIE_MAX_AGE}; HttpOnly; SameSite=Lax"
    ))
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn clear(name: &str) -> HeaderValue {
    header_value(&format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"))
}

fn header_value(s: &str) -> HeaderValue {
    // Names are constants and values are base64url, both valid header bytes.
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Read and decode cookie `name` from the request headers.
///
/// Returns `Ok(None)` when the cookie is absent (or empty) and `Err` when it
/// is present but not decodable.
pub fn get(headers: &HeaderMap, name: &str) -> Result<Option<String>, String> {
    let raw = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v);

    let Some(raw) = raw.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|e| format!("cookie {name} is not valid base64: {e}"))?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| format!("cookie {name} is not valid UTF-8: {e}"))
}
