use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn appointment_routes(state: AppState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route(
            "/",
            post(handlers::create_appointment).get(handlers::list_appointments),
        )
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route(
            "/{appointment_id}/reschedule",
            post(handlers::request_reschedule).get(handlers::list_reschedules),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn reschedule_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/{reschedule_id}", patch(handlers::resolve_reschedule))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

/// Doctor-side bulk operations, mounted next to `doctor_cell::router::doctor_routes`.
pub fn doctor_day_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/me/availability/reschedule-day", post(handlers::reschedule_day))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
