use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::router::{appointment_routes, doctor_day_routes, reschedule_routes};
use shared_models::scheduling::DayOfWeek;
use shared_utils::test_utils::{next_weekday, TestContext, TestUser};

fn create_test_app(ctx: &TestContext) -> Router {
    appointment_routes(ctx.state.clone())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn send(app: Router, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token));
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

fn booking_body(patient: &TestUser, doctor: &TestUser, day: DayOfWeek, time: &str) -> Value {
    json!({
        "patientId": patient.id,
        "doctorId": doctor.id,
        "requestedDate": next_weekday(day).to_string(),
        "requestedTime": time,
        "reason": "Annual checkup",
    })
}

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let ctx = TestContext::default();

    let response = create_test_app(&ctx)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_flow_over_http() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    let other = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let patient_token = ctx.token_for(&patient);
    let doctor_token = ctx.token_for(&doctor);

    let (status, created) = send(
        create_test_app(&ctx),
        "POST",
        "/",
        &patient_token,
        Some(booking_body(&patient, &doctor, DayOfWeek::Monday, "10:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["priority"], "NORMAL");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, conflict) = send(
        create_test_app(&ctx),
        "POST",
        "/",
        &ctx.token_for(&other),
        Some(booking_body(&other, &doctor, DayOfWeek::Monday, "10:15")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "slot_conflict");

    let (status, unavailable) = send(
        create_test_app(&ctx),
        "POST",
        "/",
        &ctx.token_for(&other),
        Some(booking_body(&other, &doctor, DayOfWeek::Tuesday, "10:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(unavailable["code"], "slot_unavailable");

    let (status, confirmed) = send(
        create_test_app(&ctx),
        "PATCH",
        &format!("/{}/status", id),
        &doctor_token,
        Some(json!({ "status": "CONFIRMED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["appointment"]["status"], "CONFIRMED");
    assert!(confirmed["consultation"]["consultationCode"]
        .as_str()
        .unwrap()
        .starts_with("QH"));

    let (status, listed) = send(create_test_app(&ctx), "GET", "/?page=1&limit=5", &patient_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["pagination"]["total"], 1);
    assert_eq!(listed["appointments"][0]["id"], id.as_str());

    let (status, fetched) = send(create_test_app(&ctx), "GET", &format!("/{}", id), &doctor_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_status_update_validation() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;

    let (_, created) = send(
        create_test_app(&ctx),
        "POST",
        "/",
        &ctx.token_for(&patient),
        Some(booking_body(&patient, &doctor, DayOfWeek::Monday, "10:00")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        create_test_app(&ctx),
        "PATCH",
        &format!("/{}/status", id),
        &ctx.token_for(&doctor),
        Some(json!({ "status": "ON_HOLD" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = send(
        create_test_app(&ctx),
        "PATCH",
        &format!("/{}/status", id),
        &ctx.token_for(&patient),
        Some(json!({ "status": "CONFIRMED" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = send(
        create_test_app(&ctx),
        "GET",
        "/not-a-uuid",
        &ctx.token_for(&patient),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_reschedule_flow_over_http() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let patient_token = ctx.token_for(&patient);
    let doctor_token = ctx.token_for(&doctor);

    let (_, created) = send(
        create_test_app(&ctx),
        "POST",
        "/",
        &patient_token,
        Some(booking_body(&patient, &doctor, DayOfWeek::Monday, "10:00")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    let proposal = json!({
        "newDate": "2031-01-06",
        "newTime": "11:00",
        "reason": "Work trip",
    });

    let (status, body) = send(
        create_test_app(&ctx),
        "POST",
        &format!("/{}/reschedule", id),
        &patient_token,
        Some(proposal.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(body["error"], "Can only reschedule confirmed appointments");

    send(
        create_test_app(&ctx),
        "PATCH",
        &format!("/{}/status", id),
        &doctor_token,
        Some(json!({ "status": "CONFIRMED" })),
    )
    .await;

    let (status, requested) = send(
        create_test_app(&ctx),
        "POST",
        &format!("/{}/reschedule", id),
        &patient_token,
        Some(proposal),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(requested["status"], "PENDING");
    let reschedule_id = requested["id"].as_str().unwrap().to_string();

    let (status, history) = send(
        create_test_app(&ctx),
        "GET",
        &format!("/{}/reschedule", id),
        &doctor_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["rescheduleRequests"].as_array().unwrap().len(), 1);

    let (status, resolved) = send(
        reschedule_routes(ctx.state.clone()),
        "PATCH",
        &format!("/{}", reschedule_id),
        &doctor_token,
        Some(json!({ "status": "APPROVED", "notes": "Works for me" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["rescheduleRequest"]["status"], "APPROVED");
    assert_eq!(resolved["appointment"]["status"], "RESCHEDULED");
    assert_eq!(resolved["appointment"]["requestedDate"], "2031-01-06");
    assert_eq!(resolved["appointment"]["requestedTime"], "11:00");
}

#[tokio::test]
async fn test_cancel_and_day_sweep_over_http() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Wednesday, "09:00", "17:00").await;
    let patient_token = ctx.token_for(&patient);
    let doctor_token = ctx.token_for(&doctor);

    let (_, first) = send(
        create_test_app(&ctx),
        "POST",
        "/",
        &patient_token,
        Some(booking_body(&patient, &doctor, DayOfWeek::Wednesday, "09:00")),
    )
    .await;
    send(
        create_test_app(&ctx),
        "POST",
        "/",
        &patient_token,
        Some(booking_body(&patient, &doctor, DayOfWeek::Wednesday, "15:00")),
    )
    .await;

    let (status, cancelled) = send(
        create_test_app(&ctx),
        "POST",
        &format!("/{}/cancel", first["id"].as_str().unwrap()),
        &patient_token,
        Some(json!({ "reason": "Double booked elsewhere" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["cancellationReason"], "Double booked elsewhere");

    let (status, body) = send(
        doctor_day_routes(ctx.state.clone()),
        "POST",
        "/me/availability/reschedule-day",
        &patient_token,
        Some(json!({ "dayOfWeek": "Wednesday", "reason": "Day off" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, swept) = send(
        doctor_day_routes(ctx.state.clone()),
        "POST",
        "/me/availability/reschedule-day",
        &doctor_token,
        Some(json!({ "dayOfWeek": "Wednesday", "reason": "Day off" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swept["rescheduledCount"], 1);
}
