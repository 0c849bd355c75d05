use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use consultation_cell::router::consultation_routes;
use shared_utils::test_utils::TestContext;

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_create_then_lookup_by_code() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;

    let response = consultation_routes(ctx.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", format!("Bearer {}", ctx.token_for(&doctor)))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "patientId": patient.id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let code = created["consultationCode"].as_str().unwrap().to_string();
    assert!(code.starts_with("DM"));

    let response = consultation_routes(ctx.state.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/code/{}", code))
                .header("Authorization", format!("Bearer {}", ctx.token_for(&patient)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], created["id"]);
}

#[tokio::test]
async fn test_patient_cannot_open_direct_consultation() {
    let ctx = TestContext::default();
    let patient = ctx.patient().await;

    let response = consultation_routes(ctx.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", format!("Bearer {}", ctx.token_for(&patient)))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "patientId": patient.id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "forbidden");
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let ctx = TestContext::default();
    let patient = ctx.patient().await;

    let response = consultation_routes(ctx.state.clone())
        .oneshot(
            Request::builder()
                .uri("/code/QH0710ABC")
                .header("Authorization", format!("Bearer {}", ctx.token_for(&patient)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
