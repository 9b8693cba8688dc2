//! Router tests that need no running server.
//!
//! Run with: cargo test -p stockroom-integration-tests

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use stockroom_integration_tests::{ADMIN_EMAIL, FakeAuthProvider, InMemoryRowStore, test_config};
use stockroom_web::{AppState, routes};
use tower::ServiceExt;

fn app() -> axum::Router {
    let state = AppState::with_backends(
        test_config(ADMIN_EMAIL),
        Arc::new(FakeAuthProvider::default()),
        Arc::new(InMemoryRowStore::default()),
    );
    routes::app(state)
}

#[tokio::test]
async fn test_health() {
    let resp = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_login_page_renders() {
    let resp = app()
        .oneshot(Request::get("/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("action=\"/auth/login\""));
}

#[tokio::test]
async fn test_failed_login_creates_no_session() {
    let resp = app()
        .oneshot(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=nobody%40example.com&password=x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // A failed sign-in writes nothing, so no session is created
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let resp = app()
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
