use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{Actor, User};
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::SetWeeklyAvailabilityRequest;
use crate::services::availability::AvailabilityService;

fn require_doctor(user: &User) -> Result<Actor, AppError> {
    let actor = user.actor()?;
    if !actor.is_doctor() {
        return Err(AppError::Forbidden("Only doctors can manage availability".to_string()));
    }
    Ok(actor)
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_availability_public(
    State(state): State<AppState>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = Uuid::parse_str(&doctor_id)
        .map_err(|_| AppError::ValidationError("doctorId must be a UUID".to_string()))?;

    let service = AvailabilityService::new(&state);
    let availability = service.public_weekly(doctor_id).await?;

    Ok(Json(json!({
        "doctorId": doctor_id,
        "availability": availability,
    })))
}

// ==============================================================================
// DOCTOR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_my_availability(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = require_doctor(&user)?;

    let service = AvailabilityService::new(&state);
    let availability = service.get_weekly_availability(actor.id).await?;

    Ok(Json(json!({
        "doctorId": actor.id,
        "availability": availability,
    })))
}

#[axum::debug_handler]
pub async fn set_my_availability(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<SetWeeklyAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_doctor(&user)?;

    let service = AvailabilityService::new(&state);
    let updated = service.set_weekly_availability(&actor, request).await?;
    let availability = service.get_weekly_availability(actor.id).await?;

    Ok(Json(json!({
        "updated": updated.len(),
        "availability": availability,
    })))
}
