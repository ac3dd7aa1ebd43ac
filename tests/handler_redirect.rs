mod common;

use axum::{Router, routing::get};
use axum_test::TestServer;
use sqlx::PgPool;
use std::sync::Arc;

use common::MockConnectInfoLayer;
use penshort::api::handlers::redirect::redirect_handler;
use penshort::domain::entities::RedirectType;

#[sqlx::test]
async fn test_redirect_success(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let owner = common::create_test_user(&pool).await;
    common::create_test_link(&pool, owner, "redirect1", "https://example.com/target").await;

    let response = server.get("/redirect1").await;

    assert_eq!(response.status_code(), 302);
    assert_eq!(response.header("location"), "https://example.com/target");
}

#[sqlx::test]
async fn test_redirect_permanent_link_returns_301(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let owner = common::create_test_user(&pool).await;
    let link = common::create_permanent_link(&pool, owner, "perm1", "https://example.com/perm").await;
    assert_eq!(link.redirect_type, RedirectType::Permanent);

    let response = server.get("/perm1").await;

    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header("location"), "https://example.com/perm");
}

#[sqlx::test]
async fn test_redirect_not_found(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let response = server.get("/notfound").await;

    response.assert_status_not_found();
}

#[sqlx::test]
async fn test_redirect_expired_link(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let owner = common::create_test_user(&pool).await;
    common::create_expired_link(&pool, owner, "gone", "https://example.com").await;

    let response = server.get("/gone").await;

    assert_eq!(response.status_code(), 410);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["code"], "LINK_EXPIRED");
    assert!(body["error"].is_string());
    assert!(body.get("message").is_none(), "redirect edge must use the flat body, not the nested envelope");
}

#[sqlx::test]
async fn test_redirect_not_found_body_is_flat(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let response = server.get("/notfound").await;

    response.assert_status_not_found();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["code"], "LINK_NOT_FOUND");
    assert!(body["error"].is_string());
    assert!(body.get("message").is_none());
}

#[sqlx::test]
async fn test_redirect_deleted_link_is_not_found(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let owner = common::create_test_user(&pool).await;
    common::create_deleted_link(&pool, owner, "wasthere", "https://example.com").await;

    let response = server.get("/wasthere").await;

    response.assert_status_not_found();
}

#[sqlx::test]
async fn test_redirect_sets_security_headers(pool: PgPool) {
    let state = Arc::new(common::create_test_state(pool.clone()).await);
    let app = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .layer(MockConnectInfoLayer)
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let owner = common::create_test_user(&pool).await;
    common::create_test_link(&pool, owner, "headers1", "https://example.com").await;

    let response = server.get("/headers1").await;

    assert_eq!(response.header("x-content-type-options"), "nosniff");
    assert_eq!(response.header("x-frame-options"), "DENY");
    assert_eq!(response.header("cache-control"), "private, max-age=0");
}
