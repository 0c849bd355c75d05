use axum::{routing::get, Router};

use appointment_cell::router::{appointment_routes, doctor_day_routes, reschedule_routes};
use consultation_cell::router::consultation_routes;
use doctor_cell::router::doctor_routes;
use shared_utils::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/reschedule", reschedule_routes(state.clone()))
        .nest(
            "/doctors",
            doctor_routes(state.clone()).merge(doctor_day_routes(state.clone())),
        )
        .nest("/consultations", consultation_routes(state))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use shared_models::scheduling::DayOfWeek;
    use shared_utils::test_utils::{next_weekday, TestContext};

    use super::*;

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_reports_running() {
        let ctx = TestContext::default();

        let response = create_router(ctx.state.clone())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cells_are_mounted_under_their_prefixes() {
        let ctx = TestContext::default();
        let doctor = ctx.doctor().await;
        let patient = ctx.patient().await;
        ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;

        let response = create_router(ctx.state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/doctors/{}/availability", doctor.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = create_router(ctx.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/appointments")
                    .header("Authorization", format!("Bearer {}", ctx.token_for(&patient)))
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({
                            "patientId": patient.id,
                            "doctorId": doctor.id,
                            "requestedDate": next_weekday(DayOfWeek::Monday).to_string(),
                            "requestedTime": "10:00",
                            "reason": "Checkup",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = create_router(ctx.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/doctors/me/availability/reschedule-day")
                    .header("Authorization", format!("Bearer {}", ctx.token_for(&doctor)))
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({ "dayOfWeek": "Monday", "reason": "Training" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["rescheduledCount"], 1);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let ctx = TestContext::default();

        for (method, uri) in [
            ("GET", "/appointments"),
            ("GET", "/doctors/me/availability"),
            ("PATCH", "/reschedule/00000000-0000-0000-0000-000000000000"),
            ("GET", "/consultations/code/QH0110AB"),
        ] {
            let response = create_router(ctx.state.clone())
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }
}
