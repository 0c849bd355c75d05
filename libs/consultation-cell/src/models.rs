use serde::{Deserialize, Serialize};

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::{AppointmentRequest, Consultation};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectConsultationRequest {
    pub patient_id: String,
    pub notes: Option<String>,
}

/// Result of confirming an appointment into a consultation.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub appointment: AppointmentRequest,
    pub consultation: Consultation,
    /// False when the appointment already had a consultation.
    pub created: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsultationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("No unique consultation code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ConsultationError> for AppError {
    fn from(err: ConsultationError) -> Self {
        match err {
            ConsultationError::Validation(msg) => AppError::ValidationError(msg),
            ConsultationError::Forbidden(msg) => AppError::Forbidden(msg),
            ConsultationError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            e @ ConsultationError::CodeSpaceExhausted { .. } => AppError::Internal(e.to_string()),
            ConsultationError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
