use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use consultation_cell::ConsultationFactory;
use shared_database::{AppointmentFilter, SchedulingStore};
use shared_models::auth::{Actor, Role};
use shared_models::scheduling::{AppointmentRequest, AppointmentStatus};
use shared_utils::{AppState, DoctorLockRegistry, EventSink, SchedulingEvent};

use crate::models::{
    AppointmentError, AppointmentList, AppointmentListQuery, CreateAppointmentRequest, Pagination,
    StatusUpdateOutcome,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::conflict::parse_slot_time;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Statuses reachable from `from`. PENDING -> RESCHEDULED is only used by the
/// doctor's day sweep.
pub fn valid_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
    use AppointmentStatus::*;

    match from {
        Pending => &[Confirmed, Cancelled, Rescheduled],
        Confirmed => &[Rescheduled, Completed, Cancelled],
        Rescheduled => &[Confirmed, Rescheduled, Cancelled],
        Completed | Cancelled => &[],
    }
}

pub fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if valid_transitions(from).contains(&to) {
        debug!("Status transition validated: {} -> {}", from, to);
        Ok(())
    } else {
        warn!("Invalid status transition attempted: {} -> {}", from, to);
        Err(AppointmentError::InvalidTransition { from, to })
    }
}

/// Calendar date from `YYYY-MM-DD` or an RFC 3339 timestamp (taken in UTC).
pub fn parse_requested_date(value: &str) -> Result<NaiveDate, AppointmentError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| AppointmentError::Validation(format!("Invalid date: {}", value)))
}

pub fn validate_slot_time(value: &str) -> Result<String, AppointmentError> {
    parse_slot_time(value)
        .map(|_| value.to_string())
        .ok_or_else(|| AppointmentError::Validation(format!("Invalid time (expected HH:MM): {}", value)))
}

pub fn require_text(value: &str, field: &str) -> Result<String, AppointmentError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppointmentError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Appends a note on its own line; existing notes are never replaced.
pub fn append_notes(existing: Option<String>, addition: Option<String>) -> Option<String> {
    let addition = addition.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    match (existing, addition) {
        (Some(current), Some(new)) if !current.is_empty() => Some(format!("{}\n{}", current, new)),
        (_, Some(new)) => Some(new),
        (current, None) => current,
    }
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppointmentError::Validation(format!("{} must be a UUID", field)))
}

pub struct AppointmentLifecycleService {
    store: Arc<dyn SchedulingStore>,
    locks: Arc<DoctorLockRegistry>,
    events: Arc<dyn EventSink>,
    booking: AppointmentBookingService,
    consultations: ConsultationFactory,
}

impl AppointmentLifecycleService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            locks: state.locks.clone(),
            events: state.events.clone(),
            booking: AppointmentBookingService::new(state),
            consultations: ConsultationFactory::new(state),
        }
    }

    /// Validates a patient's booking and admits it as PENDING.
    #[instrument(skip(self, request), fields(patient_id = %actor.id))]
    pub async fn create_request(
        &self,
        actor: &Actor,
        request: CreateAppointmentRequest,
    ) -> Result<AppointmentRequest, AppointmentError> {
        let patient_id = parse_id(&request.patient_id, "patientId")?;
        let doctor_id = parse_id(&request.doctor_id, "doctorId")?;

        if actor.role != Role::Patient || actor.id != patient_id {
            return Err(AppointmentError::Forbidden(
                "Patients can only request appointments for themselves".to_string(),
            ));
        }

        match self.store.get_profile(doctor_id).await? {
            Some(profile) if profile.role == Role::Doctor => {}
            _ => return Err(AppointmentError::NotFound("Doctor".to_string())),
        }

        let requested_date = parse_requested_date(&request.requested_date)?;
        let requested_time = validate_slot_time(&request.requested_time)?;
        let reason = require_text(&request.reason, "reason")?;

        let now = Utc::now();
        let appointment = AppointmentRequest {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            requested_date,
            requested_time,
            reason,
            priority: request.priority.unwrap_or_default(),
            notes: append_notes(None, request.notes),
            cancellation_reason: None,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let created = self.booking.reserve_slot(appointment).await?;

        info!("Appointment {} requested for {} {}", created.id, created.requested_date, created.requested_time);
        self.events
            .publish(SchedulingEvent::AppointmentRequested {
                appointment_id: created.id,
                patient_id: created.patient_id,
                doctor_id: created.doctor_id,
                requested_date: created.requested_date,
                requested_time: created.requested_time.clone(),
            })
            .await;

        Ok(created)
    }

    /// Doctor decision on an appointment. Confirming creates the
    /// consultation in the same store call.
    #[instrument(skip(self, notes), fields(actor_id = %actor.id))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<StatusUpdateOutcome, AppointmentError> {
        let appointment = self.load(appointment_id).await?;

        if actor.id != appointment.doctor_id {
            return Err(AppointmentError::Forbidden(
                "Only the assigned doctor can update appointment status".to_string(),
            ));
        }
        if new_status == AppointmentStatus::Rescheduled {
            return Err(AppointmentError::Validation(
                "Use the reschedule workflow to reschedule appointments".to_string(),
            ));
        }

        let _guard = self.locks.lock(appointment.doctor_id).await;
        let current = self.load(appointment_id).await?;

        if current.status == new_status && !current.status.is_terminal() {
            debug!("Appointment {} already {}", appointment_id, new_status);
            let consultation = if new_status == AppointmentStatus::Confirmed {
                self.store.find_consultation_by_appointment(appointment_id).await?
            } else {
                None
            };
            return Ok(StatusUpdateOutcome {
                appointment: current,
                consultation,
            });
        }

        validate_transition(current.status, new_status)?;

        let previous = current.status;
        let mut updated = current;
        updated.status = new_status;
        updated.notes = append_notes(updated.notes, notes);
        updated.updated_at = Utc::now();

        let outcome = if new_status == AppointmentStatus::Confirmed {
            let materialized = self.consultations.materialize(updated).await?;
            StatusUpdateOutcome {
                appointment: materialized.appointment,
                consultation: Some(materialized.consultation),
            }
        } else {
            StatusUpdateOutcome {
                appointment: self.store.update_appointment(updated).await?,
                consultation: None,
            }
        };

        info!("Appointment {} moved {} -> {}", appointment_id, previous, new_status);
        self.events
            .publish(SchedulingEvent::StatusChanged {
                appointment_id,
                from: previous,
                to: new_status,
                changed_by: actor.id,
            })
            .await;

        Ok(outcome)
    }

    /// Either participant may cancel a non-terminal appointment. The reason
    /// is kept in `cancellation_reason`; notes are untouched.
    #[instrument(skip(self, reason), fields(actor_id = %actor.id))]
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
        reason: &str,
    ) -> Result<AppointmentRequest, AppointmentError> {
        let appointment = self.load(appointment_id).await?;

        if !appointment.involves(actor.id) {
            return Err(AppointmentError::Forbidden(
                "Only the patient or doctor on this appointment can cancel it".to_string(),
            ));
        }
        let reason = require_text(reason, "reason")?;

        let _guard = self.locks.lock(appointment.doctor_id).await;
        let mut current = self.load(appointment_id).await?;

        validate_transition(current.status, AppointmentStatus::Cancelled)?;

        current.status = AppointmentStatus::Cancelled;
        current.cancellation_reason = Some(reason.clone());
        current.updated_at = Utc::now();

        let cancelled = self.store.update_appointment(current).await?;

        info!("Appointment {} cancelled by {}", appointment_id, actor.id);
        self.events
            .publish(SchedulingEvent::AppointmentCancelled {
                appointment_id,
                cancelled_by: actor.id,
                reason,
            })
            .await;

        Ok(cancelled)
    }

    pub async fn get(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
    ) -> Result<AppointmentRequest, AppointmentError> {
        let appointment = self.load(appointment_id).await?;

        if !appointment.involves(actor.id) && !actor.is_admin() {
            return Err(AppointmentError::Forbidden(
                "Not authorized to view this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    /// Role-scoped listing: patients see their own, doctors their calendar,
    /// admins everything.
    pub async fn list(
        &self,
        actor: &Actor,
        query: AppointmentListQuery,
    ) -> Result<AppointmentList, AppointmentError> {
        let mut filter = match actor.role {
            Role::Patient => AppointmentFilter::for_patient(actor.id),
            Role::Doctor => AppointmentFilter::for_doctor(actor.id),
            Role::Admin => AppointmentFilter::default(),
            Role::Unknown => {
                return Err(AppointmentError::Forbidden(
                    "No scheduling role on this account".to_string(),
                ))
            }
        };

        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            let status = status
                .parse::<AppointmentStatus>()
                .map_err(AppointmentError::Validation)?;
            filter = filter.with_status(status);
        }

        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = ((page - 1) as usize).saturating_mul(limit as usize);
        let filter = filter.page(offset, limit as usize);

        let result = self.store.list_appointments(&filter).await?;
        let pages = result.total.div_ceil(limit as u64);

        Ok(AppointmentList {
            appointments: result.items,
            pagination: Pagination {
                page,
                limit,
                total: result.total,
                pages,
            },
        })
    }

    async fn load(&self, appointment_id: Uuid) -> Result<AppointmentRequest, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Appointment".to_string()))
    }
}
