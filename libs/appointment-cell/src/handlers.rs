use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::scheduling::AppointmentStatus;
use shared_utils::AppState;

use crate::models::{
    AppointmentListQuery, CancelAppointmentRequest, CreateAppointmentRequest,
    CreateRescheduleRequest, RescheduleDayRequest, ResolveRescheduleRequest, UpdateStatusRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::reschedule::RescheduleCoordinator;

fn parse_path_id(value: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value)
        .map_err(|_| AppError::ValidationError(format!("{} must be a UUID", field)))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = user.actor()?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service.create_request(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;

    let service = AppointmentLifecycleService::new(&state);
    let list = service.list(&actor, query).await?;

    Ok(Json(json!(list)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;
    let appointment_id = parse_path_id(&appointment_id, "appointmentId")?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service.get(appointment_id, &actor).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;
    let appointment_id = parse_path_id(&appointment_id, "appointmentId")?;
    let status = request
        .status
        .parse::<AppointmentStatus>()
        .map_err(AppError::ValidationError)?;

    let service = AppointmentLifecycleService::new(&state);
    let outcome = service
        .update_status(appointment_id, status, &actor, request.notes)
        .await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;
    let appointment_id = parse_path_id(&appointment_id, "appointmentId")?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service.cancel(appointment_id, &actor, &request.reason).await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// RESCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_reschedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<CreateRescheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = user.actor()?;
    let appointment_id = parse_path_id(&appointment_id, "appointmentId")?;

    let coordinator = RescheduleCoordinator::new(&state);
    let reschedule = coordinator
        .request_reschedule(appointment_id, &actor, request)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(reschedule))))
}

#[axum::debug_handler]
pub async fn list_reschedules(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;
    let appointment_id = parse_path_id(&appointment_id, "appointmentId")?;

    let coordinator = RescheduleCoordinator::new(&state);
    let reschedules = coordinator.list_for_appointment(appointment_id, &actor).await?;

    Ok(Json(json!({
        "appointmentId": appointment_id,
        "rescheduleRequests": reschedules,
    })))
}

#[axum::debug_handler]
pub async fn resolve_reschedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(reschedule_id): Path<String>,
    Json(request): Json<ResolveRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;
    let reschedule_id = parse_path_id(&reschedule_id, "rescheduleId")?;

    let coordinator = RescheduleCoordinator::new(&state);
    let (reschedule, appointment) = coordinator
        .resolve_reschedule(reschedule_id, &actor, request)
        .await?;

    Ok(Json(json!({
        "rescheduleRequest": reschedule,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn reschedule_day(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleDayRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;

    let coordinator = RescheduleCoordinator::new(&state);
    let count = coordinator.reschedule_day(&actor, request).await?;

    Ok(Json(json!({
        "rescheduledCount": count,
    })))
}
