use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Extension, Router,
};
use tower::ServiceExt;

use shared_models::auth::User;
use shared_utils::extractor::auth_middleware;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn protected_app(config: &TestConfig) -> Router {
    let config = config.to_arc();
    Router::new()
        .route("/whoami", get(|Extension(user): Extension<User>| async move { user.role.to_string() }))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
}

#[tokio::test]
async fn test_missing_header_is_unauthorized() {
    let app = protected_app(&TestConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "unauthorized");
}

#[tokio::test]
async fn test_valid_token_reaches_handler_with_user() {
    let config = TestConfig::default();
    let app = protected_app(&config);
    let user = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"admin");
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let app = protected_app(&TestConfig::default());
    let token = JwtTestUtils::create_invalid_signature_token(&TestUser::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
