//! Server-side login and token review, driven through the router.

mod common;

use std::collections::BTreeMap;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use common::{
    GOOD_CODE, NO_SUBJECT_CODE, OUTSIDER_CODE, REVOKED_CODE, cookie_header, harness, jar_header,
    query_param, spawn_provider, update_jar,
};
use kauth::token::{Token, TokenStore};

const GROUPS: &str = "a@co.com: [admins, devs]\n";
const HOST: &str = "auth.co.com";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, cookies: &str) -> Request<Body> {
    let mut builder = Request::get(uri).header(header::HOST, HOST);
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

fn review(token: &str, api_version: &str) -> Request<Body> {
    let body = json!({
        "apiVersion": api_version,
        "kind": "TokenReview",
        "spec": {"token": token}
    });
    Request::post("/kubernetes/validate-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Runs `/auth/start` then `/auth/complete` with `code`, returning the
/// completion response.
async fn login(app: &axum::Router, redirect: Option<&str>, code: &str) -> axum::response::Response {
    let start_uri = match redirect {
        Some(r) => format!(
            "/auth/start?{}",
            serde_urlencoded::to_string([("redirect", r)]).unwrap()
        ),
        None => "/auth/start".to_string(),
    };
    let started = app.clone().oneshot(get(&start_uri, "")).await.unwrap();
    assert_eq!(started.status(), StatusCode::TEMPORARY_REDIRECT);

    let consent = Url::parse(started.headers()[header::LOCATION].to_str().unwrap()).unwrap();
    assert_eq!(
        query_param(&consent, "redirect_uri").as_deref(),
        Some("http://auth.co.com/auth/complete")
    );
    let state = query_param(&consent, "state").unwrap();
    let cookies = cookie_header(started.headers());

    app.clone()
        .oneshot(get(&format!("/auth/complete?code={code}&state={state}"), &cookies))
        .await
        .unwrap()
}

#[tokio::test]
async fn login_then_review_reports_identity_and_groups() {
    // GIVEN: a server wired to the fake provider
    let h = harness(spawn_provider().await, GROUPS);

    // WHEN: a browser logs in with a return URL
    let completed = login(&h.app, Some("http://127.0.0.1:8976/authed"), GOOD_CODE).await;

    // THEN: it is sent back with token and email appended
    assert_eq!(completed.status(), StatusCode::TEMPORARY_REDIRECT);
    let back = Url::parse(completed.headers()[header::LOCATION].to_str().unwrap()).unwrap();
    assert_eq!(back.path(), "/authed");
    assert_eq!(query_param(&back, "email").as_deref(), Some("a@co.com"));
    let token = query_param(&back, "token").unwrap();
    assert_eq!(h.store.len(), 1);

    // AND: the API server's review of that token succeeds
    let reviewed = h
        .app
        .clone()
        .oneshot(review(&token, "authentication.k8s.io/v1beta1"))
        .await
        .unwrap();
    assert_eq!(reviewed.status(), StatusCode::OK);
    assert_eq!(
        body_json(reviewed).await,
        json!({
            "apiVersion": "authentication.k8s.io/v1beta1",
            "kind": "TokenReview",
            "status": {
                "authenticated": true,
                "user": {
                    "username": "a@co.com",
                    "uid": "42",
                    "groups": ["admins", "devs"],
                    "extra": {}
                }
            }
        })
    );
}

#[tokio::test]
async fn login_without_return_url_answers_with_token_document() {
    let h = harness(spawn_provider().await, GROUPS);

    let completed = login(&h.app, None, GOOD_CODE).await;

    assert_eq!(completed.status(), StatusCode::OK);
    let doc = body_json(completed).await;
    assert_eq!(doc["user"], "a@co.com");
    assert_eq!(doc["userId"], "42");
    let issued: chrono::DateTime<Utc> = serde_json::from_value(doc["issued"].clone()).unwrap();
    let expires: chrono::DateTime<Utc> = serde_json::from_value(doc["expires"].clone()).unwrap();
    assert_eq!(expires - issued, Duration::hours(12));
}

#[tokio::test]
async fn outsider_domain_is_refused_and_nothing_stored() {
    let h = harness(spawn_provider().await, GROUPS);

    let completed = login(&h.app, Some("http://127.0.0.1:8976/authed"), OUTSIDER_CODE).await;

    assert_eq!(completed.status(), StatusCode::UNAUTHORIZED);
    assert!(completed.headers().get(header::LOCATION).is_none());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn rejected_code_is_server_error() {
    let h = harness(spawn_provider().await, GROUPS);

    let completed = login(&h.app, None, "stolen").await;

    assert_eq!(completed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn refused_profile_fetch_is_server_error() {
    let h = harness(spawn_provider().await, GROUPS);

    let completed = login(&h.app, None, REVOKED_CODE).await;

    assert_eq!(completed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn profile_without_subject_is_server_error() {
    let h = harness(spawn_provider().await, GROUPS);

    let completed = login(&h.app, None, NO_SUBJECT_CODE).await;

    assert_eq!(completed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn restarted_login_without_return_url_answers_with_token_document() {
    // GIVEN: a browser that started a flow with a return URL and abandoned it
    let h = harness(spawn_provider().await, GROUPS);
    let mut jar = BTreeMap::new();
    let first = h
        .app
        .clone()
        .oneshot(get("/auth/start?redirect=http%3A%2F%2F127.0.0.1%3A8976%2Fauthed", ""))
        .await
        .unwrap();
    update_jar(&mut jar, first.headers());
    assert!(jar.contains_key("redirect"));

    // WHEN: the same browser starts again without one and completes
    let second = h
        .app
        .clone()
        .oneshot(get("/auth/start", &jar_header(&jar)))
        .await
        .unwrap();
    update_jar(&mut jar, second.headers());
    let consent = Url::parse(second.headers()[header::LOCATION].to_str().unwrap()).unwrap();
    let state = query_param(&consent, "state").unwrap();
    let completed = h
        .app
        .clone()
        .oneshot(get(
            &format!("/auth/complete?code={GOOD_CODE}&state={state}"),
            &jar_header(&jar),
        ))
        .await
        .unwrap();

    // THEN: the token comes back as the response body, not to the old URL
    assert!(!jar.contains_key("redirect"));
    assert_eq!(completed.status(), StatusCode::OK);
    assert!(completed.headers().get(header::LOCATION).is_none());
    assert_eq!(body_json(completed).await["user"], "a@co.com");
}

#[tokio::test]
async fn complete_without_state_cookie_is_refused() {
    let h = harness(spawn_provider().await, GROUPS);

    let response = h
        .app
        .clone()
        .oneshot(get("/auth/complete?code=good&state=guess", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn unknown_token_review_is_negative() {
    let h = harness(spawn_provider().await, GROUPS);

    let response = h
        .app
        .clone()
        .oneshot(review("nope", "authentication.k8s.io/v1beta1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({
            "apiVersion": "authentication.k8s.io/v1beta1",
            "kind": "TokenReview",
            "status": {"authenticated": false}
        })
    );
}

#[tokio::test]
async fn expired_token_review_is_negative() {
    let h = harness(spawn_provider().await, GROUPS);
    let issued = Utc::now() - Duration::hours(13);
    h.store
        .put(&Token {
            id: "stale".to_string(),
            expiry: issued + Duration::hours(12),
            issued,
            email: "a@co.com".to_string(),
            subject_id: "42".to_string(),
        })
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(review("stale", "authentication.k8s.io/v1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["apiVersion"], "authentication.k8s.io/v1");
    assert_eq!(body["status"]["authenticated"], false);
}

#[tokio::test]
async fn garbage_review_body_is_bad_request() {
    let h = harness(spawn_provider().await, GROUPS);

    let response = h
        .app
        .clone()
        .oneshot(
            Request::post("/kubernetes/validate-token")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_probe() {
    let h = harness(spawn_provider().await, GROUPS);

    let response = h.app.oneshot(get("/healthz", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
