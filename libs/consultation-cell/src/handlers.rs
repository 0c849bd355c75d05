use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::CreateDirectConsultationRequest;
use crate::services::factory::ConsultationFactory;

#[axum::debug_handler]
pub async fn create_direct_consultation(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDirectConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = user.actor()?;
    let patient_id = Uuid::parse_str(&request.patient_id)
        .map_err(|_| AppError::ValidationError("patientId must be a UUID".to_string()))?;

    let factory = ConsultationFactory::new(&state);
    let consultation = factory.create_direct(&actor, patient_id, request.notes).await?;

    Ok((StatusCode::CREATED, Json(json!(consultation))))
}

#[axum::debug_handler]
pub async fn get_consultation_by_code(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let actor = user.actor()?;

    let factory = ConsultationFactory::new(&state);
    let consultation = factory.find_by_code(&code, &actor).await?;

    Ok(Json(json!(consultation)))
}
