use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn consultation_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_direct_consultation))
        .route("/code/{code}", get(handlers::get_consultation_by_code))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
