use axum::{
    middleware,
    routing::get,
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn doctor_routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/{doctor_id}/availability", get(handlers::get_doctor_availability_public));

    let protected_routes = Router::new()
        .route(
            "/me/availability",
            get(handlers::get_my_availability).put(handlers::set_my_availability),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
