use serde::{Deserialize, Serialize};

use consultation_cell::models::ConsultationError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::{AppointmentRequest, AppointmentStatus, Consultation, Priority};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Raw booking body. Ids, date and time arrive as strings and are validated
/// by the lifecycle service so every failure maps to a validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub requested_date: String,
    pub requested_time: String,
    pub reason: String,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRescheduleRequest {
    pub new_date: String,
    pub new_time: String,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRescheduleRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleDayRequest {
    pub day_of_week: String,
    pub reason: String,
    pub new_date: Option<String>,
    pub new_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentList {
    pub appointments: Vec<AppointmentRequest>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateOutcome {
    pub appointment: AppointmentRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation: Option<Consultation>,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("{0}")]
    SlotUnavailable(String),

    #[error("{0}")]
    SlotConflict(String),

    #[error(transparent)]
    Consultation(#[from] ConsultationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            AppointmentError::InvalidState(msg) => AppError::InvalidState(msg),
            e @ AppointmentError::InvalidTransition { .. } => AppError::InvalidState(e.to_string()),
            AppointmentError::SlotUnavailable(msg) => AppError::conflict("slot_unavailable", msg),
            AppointmentError::SlotConflict(msg) => AppError::conflict("slot_conflict", msg),
            AppointmentError::Consultation(e) => e.into(),
            AppointmentError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
