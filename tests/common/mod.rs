//! Shared fixtures: a fake OAuth2 provider on loopback and a fully wired
//! kauth router.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use url::Url;

use kauth::config::OAuthConfig;
use kauth::identity::GoogleIdentity;
use kauth::login::LoginCoordinator;
use kauth::server::router;
use kauth::token::{InMemoryTokenStore, TokenService, TokenStore};
use kauth::webhook::{GroupDirectory, TokenReviewer};

/// Code the fake provider accepts for `a@co.com`.
pub const GOOD_CODE: &str = "good";
/// Code the fake provider accepts for `eve@evil.com`.
pub const OUTSIDER_CODE: &str = "outsider";
/// Code whose access token the profile endpoint refuses.
pub const REVOKED_CODE: &str = "revoked";
/// Code whose profile comes back without a subject.
pub const NO_SUBJECT_CODE: &str = "no-subject";

/// Start the fake provider, returning its OAuth configuration.
pub async fn spawn_provider() -> OAuthConfig {
    let app = Router::new()
        .route("/token", post(token_endpoint))
        .route("/userinfo", get(userinfo_endpoint));
    let addr = serve(app).await;

    OAuthConfig {
        client_id: "client-123".to_string(),
        client_secret: "secret".to_string(),
        allowed_domain: "co.com".to_string(),
        auth_url: Url::parse(&format!("http://{addr}/consent")).unwrap(),
        token_url: Url::parse(&format!("http://{addr}/token")).unwrap(),
        userinfo_url: Url::parse(&format!("http://{addr}/userinfo")).unwrap(),
    }
}

async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("client_secret").map(String::as_str) != Some("secret") {
        return (StatusCode::UNAUTHORIZED, "bad client").into_response();
    }
    let access = match form.get("code").map(String::as_str) {
        Some(GOOD_CODE) => "at-good",
        Some(OUTSIDER_CODE) => "at-outsider",
        Some(REVOKED_CODE) => "at-revoked",
        Some(NO_SUBJECT_CODE) => "at-no-subject",
        _ => return (StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#).into_response(),
    };
    Json(json!({"access_token": access, "token_type": "Bearer", "expires_in": 3599}))
        .into_response()
}

async fn userinfo_endpoint(headers: HeaderMap) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match auth {
        "Bearer at-good" => Json(json!({
            "sub": "42",
            "email": "a@co.com",
            "email_verified": true,
            "hd": "co.com",
            "name": "A"
        }))
        .into_response(),
        "Bearer at-outsider" => Json(json!({
            "sub": "666",
            "email": "eve@evil.com",
            "hd": "evil.com"
        }))
        .into_response(),
        "Bearer at-no-subject" => Json(json!({
            "email": "a@co.com",
            "hd": "co.com"
        }))
        .into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// A kauth router wired to `oauth`, plus its token store.
pub struct Harness {
    pub app: Router,
    pub store: Arc<InMemoryTokenStore>,
}

pub fn harness(oauth: OAuthConfig, groups: &str) -> Harness {
    let store = Arc::new(InMemoryTokenStore::new());
    let dyn_store: Arc<dyn TokenStore> = store.clone();
    let tokens = Arc::new(TokenService::new(dyn_store, oauth.allowed_domain.clone()));
    let identity = Arc::new(GoogleIdentity::new(reqwest::Client::new(), oauth));
    let login = Arc::new(LoginCoordinator::new(identity, Arc::clone(&tokens), None));
    let reviewer = Arc::new(TokenReviewer::new(
        tokens,
        Arc::new(GroupDirectory::from_yaml(groups).unwrap()),
    ));
    Harness {
        app: router(login, reviewer),
        store,
    }
}

/// Serve `app` on a free loopback port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// `name=value` pairs from a response's `Set-Cookie` headers, ready for a
/// `Cookie` request header.
pub fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter(|pair| !pair.ends_with('='))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Applies a response's `Set-Cookie` headers to a browser-style jar:
/// empty values expire the cookie.
pub fn update_jar(jar: &mut BTreeMap<String, String>, headers: &HeaderMap) {
    for pair in headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
    {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        if value.is_empty() {
            jar.remove(name);
        } else {
            jar.insert(name.to_string(), value.to_string());
        }
    }
}

/// `Cookie` request header for everything in `jar`.
pub fn jar_header(jar: &BTreeMap<String, String>) -> String {
    jar.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Query parameter `name` of `url`.
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
