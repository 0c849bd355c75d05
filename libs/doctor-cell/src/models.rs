use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::{
    AppointmentRequest, AppointmentStatus, DayOfWeek, DoctorAvailabilityEntry,
};

// ==============================================================================
// WEEKLY VIEW
// ==============================================================================

/// An upcoming active appointment shown next to the weekday it falls on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub requested_date: NaiveDate,
    pub requested_time: String,
    pub status: AppointmentStatus,
}

impl From<&AppointmentRequest> for UpcomingAppointment {
    fn from(appointment: &AppointmentRequest) -> Self {
        Self {
            id: appointment.id,
            patient_id: appointment.patient_id,
            requested_date: appointment.requested_date,
            requested_time: appointment.requested_time.clone(),
            status: appointment.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAvailabilityDay {
    #[serde(flatten)]
    pub entry: DoctorAvailabilityEntry,
    pub has_upcoming_appointments: bool,
    pub upcoming_appointments: Vec<UpcomingAppointment>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityEntryInput {
    pub day_of_week: String,
    pub enabled: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWeeklyAvailabilityRequest {
    pub entries: Vec<AvailabilityEntryInput>,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayConflict {
    pub day_of_week: DayOfWeek,
    pub appointment_count: usize,
}

/// Why a weekly update was refused: disabling days that still carry
/// upcoming bookings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityConflictReport {
    pub conflicts: Vec<String>,
    pub requires_reschedule: bool,
    pub days: Vec<DayConflict>,
}

impl AvailabilityConflictReport {
    pub fn from_days(days: Vec<DayConflict>) -> Self {
        let conflicts = days
            .iter()
            .map(|d| format!("{} has {} existing appointment(s)", d.day_of_week, d.appointment_count))
            .collect();

        Self {
            conflicts,
            requires_reschedule: true,
            days,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Cannot disable days with existing appointments")]
    Conflict(AvailabilityConflictReport),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Forbidden(msg) => AppError::Forbidden(msg),
            AvailabilityError::Validation(msg) => AppError::ValidationError(msg),
            AvailabilityError::Conflict(report) => AppError::Conflict {
                code: "availability_conflict",
                message: "Cannot disable days with existing appointments".to_string(),
                conflicts: report.conflicts,
                requires_reschedule: report.requires_reschedule,
            },
            AvailabilityError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
