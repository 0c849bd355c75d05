use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use doctor_cell::services::availability::upcoming_window;
use shared_config::{BulkReschedulePolicy, SchedulingRules};
use shared_database::{AppointmentFilter, SchedulingStore};
use shared_models::auth::Actor;
use shared_models::scheduling::{
    AppointmentRequest, AppointmentStatus, DayOfWeek, ParticipantRole, RescheduleRequest,
    RescheduleSource, RescheduleStatus,
};
use shared_utils::{AppState, DoctorLockRegistry, EventSink, SchedulingEvent};

use crate::models::{
    AppointmentError, CreateRescheduleRequest, RescheduleDayRequest, ResolveRescheduleRequest,
};
use crate::services::lifecycle::{
    append_notes, parse_requested_date, require_text, validate_slot_time, validate_transition,
};

pub struct RescheduleCoordinator {
    store: Arc<dyn SchedulingStore>,
    locks: Arc<DoctorLockRegistry>,
    events: Arc<dyn EventSink>,
    rules: SchedulingRules,
}

impl RescheduleCoordinator {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            locks: state.locks.clone(),
            events: state.events.clone(),
            rules: state.config.scheduling.clone(),
        }
    }

    /// Records a PENDING proposal to move a CONFIRMED appointment. The
    /// appointment itself is unchanged until the proposal is approved.
    #[instrument(skip(self, request), fields(actor_id = %actor.id))]
    pub async fn request_reschedule(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
        request: CreateRescheduleRequest,
    ) -> Result<RescheduleRequest, AppointmentError> {
        let appointment = self.load_appointment(appointment_id).await?;

        let role = appointment.role_of(actor.id).ok_or_else(|| {
            AppointmentError::Forbidden("Not a participant of this appointment".to_string())
        })?;

        if appointment.status != AppointmentStatus::Confirmed {
            return Err(AppointmentError::InvalidState(
                "Can only reschedule confirmed appointments".to_string(),
            ));
        }

        let new_date = parse_requested_date(&request.new_date)?;
        let new_time = validate_slot_time(&request.new_time)?;
        let reason = require_text(&request.reason, "reason")?;

        let proposal = RescheduleRequest {
            id: Uuid::new_v4(),
            appointment_id,
            requested_by: actor.id,
            requested_by_role: role,
            current_date: appointment.requested_date,
            current_time: appointment.requested_time.clone(),
            new_date,
            new_time,
            reason,
            notes: append_notes(None, request.notes),
            proposed_by: RescheduleSource::Single,
            status: RescheduleStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };

        let created = self.store.insert_reschedule(proposal).await?;

        info!("Reschedule {} proposed for appointment {}", created.id, appointment_id);
        self.events
            .publish(SchedulingEvent::RescheduleRequested {
                reschedule_id: created.id,
                appointment_id,
                requested_by: actor.id,
            })
            .await;

        Ok(created)
    }

    /// Approves or rejects a PENDING proposal. Approval moves the appointment
    /// to the proposed date and time and marks it RESCHEDULED, written
    /// together with the resolved proposal.
    #[instrument(skip(self, request), fields(actor_id = %actor.id))]
    pub async fn resolve_reschedule(
        &self,
        reschedule_id: Uuid,
        actor: &Actor,
        request: ResolveRescheduleRequest,
    ) -> Result<(RescheduleRequest, AppointmentRequest), AppointmentError> {
        let decision = match request.status.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => RescheduleStatus::Approved,
            "REJECTED" => RescheduleStatus::Rejected,
            other => {
                return Err(AppointmentError::Validation(format!(
                    "status must be APPROVED or REJECTED, got {}",
                    other
                )))
            }
        };

        let proposal = self.load_reschedule(reschedule_id).await?;
        let appointment = self.load_appointment(proposal.appointment_id).await?;

        if !appointment.involves(actor.id) {
            return Err(AppointmentError::Forbidden(
                "Not a participant of this appointment".to_string(),
            ));
        }

        let _guard = self.locks.lock(appointment.doctor_id).await;
        let mut proposal = self.load_reschedule(reschedule_id).await?;
        let appointment = self.load_appointment(proposal.appointment_id).await?;

        if proposal.status != RescheduleStatus::Pending {
            return Err(AppointmentError::InvalidState(
                "Reschedule request has already been resolved".to_string(),
            ));
        }
        if appointment.status.is_terminal() {
            return Err(AppointmentError::InvalidState(format!(
                "Appointment is {} and can no longer be rescheduled",
                appointment.status
            )));
        }

        let now = Utc::now();
        proposal.status = decision;
        proposal.notes = append_notes(proposal.notes, request.notes);
        proposal.resolved_at = Some(now);

        let moved = if decision == RescheduleStatus::Approved {
            validate_transition(appointment.status, AppointmentStatus::Rescheduled)?;
            let mut moved = appointment.clone();
            moved.requested_date = proposal.new_date;
            moved.requested_time = proposal.new_time.clone();
            moved.status = AppointmentStatus::Rescheduled;
            moved.updated_at = now;
            Some(moved)
        } else {
            None
        };

        let (resolved, written) = self.store.resolve_reschedule(proposal, moved).await?;
        let appointment = written.unwrap_or(appointment);

        info!("Reschedule {} resolved as {:?}", reschedule_id, resolved.status);
        self.events
            .publish(SchedulingEvent::RescheduleResolved {
                reschedule_id,
                appointment_id: appointment.id,
                status: resolved.status,
                resolved_by: actor.id,
            })
            .await;

        Ok((resolved, appointment))
    }

    /// Doctor-initiated sweep of every upcoming active appointment on one
    /// weekday. Returns how many appointments received a proposal.
    #[instrument(skip(self, request), fields(doctor_id = %actor.id, day = %request.day_of_week))]
    pub async fn reschedule_day(
        &self,
        actor: &Actor,
        request: RescheduleDayRequest,
    ) -> Result<usize, AppointmentError> {
        if !actor.is_doctor() {
            return Err(AppointmentError::Forbidden(
                "Only doctors can reschedule a day".to_string(),
            ));
        }

        let day = DayOfWeek::from_name(&request.day_of_week).ok_or_else(|| {
            AppointmentError::Validation(format!("Unknown dayOfWeek: {}", request.day_of_week))
        })?;
        let reason = require_text(&request.reason, "reason")?;
        let new_date = request.new_date.as_deref().map(parse_requested_date).transpose()?;
        let new_time = request.new_time.as_deref().map(validate_slot_time).transpose()?;

        let doctor_id = actor.id;
        let _guard = self.locks.lock(doctor_id).await;

        let (from, to) = upcoming_window(&self.rules);
        let filter = AppointmentFilter::for_doctor(doctor_id).active().between(from, to);
        let affected: Vec<AppointmentRequest> = self
            .store
            .list_appointments(&filter)
            .await?
            .items
            .into_iter()
            .filter(|a| DayOfWeek::of(a.requested_date) == day)
            .collect();

        if affected.is_empty() {
            info!("No upcoming appointments on {} to reschedule", day);
            return Ok(0);
        }

        let now = Utc::now();
        let proposals: Vec<RescheduleRequest> = affected
            .iter()
            .map(|a| RescheduleRequest {
                id: Uuid::new_v4(),
                appointment_id: a.id,
                requested_by: doctor_id,
                requested_by_role: ParticipantRole::Doctor,
                current_date: a.requested_date,
                current_time: a.requested_time.clone(),
                new_date: new_date.unwrap_or(a.requested_date),
                new_time: new_time.clone().unwrap_or_else(|| a.requested_time.clone()),
                reason: reason.clone(),
                notes: None,
                proposed_by: RescheduleSource::DaySweep,
                status: RescheduleStatus::Pending,
                created_at: now,
                resolved_at: None,
            })
            .collect();

        let moved: Vec<AppointmentRequest> = match self.rules.bulk_policy {
            BulkReschedulePolicy::Unilateral => affected
                .iter()
                .map(|a| {
                    validate_transition(a.status, AppointmentStatus::Rescheduled)?;
                    let mut moved = a.clone();
                    moved.status = AppointmentStatus::Rescheduled;
                    moved.updated_at = now;
                    Ok(moved)
                })
                .collect::<Result<_, AppointmentError>>()?,
            BulkReschedulePolicy::PatientApproval => Vec::new(),
        };

        let count = self.store.apply_day_sweep(proposals, moved).await?;
        warn!("Swept {} appointment(s) off {} for doctor {}", count, day, doctor_id);

        self.events
            .publish(SchedulingEvent::DaySwept {
                doctor_id,
                day_of_week: day,
                appointment_ids: affected.iter().map(|a| a.id).collect(),
                patient_ids: affected.iter().map(|a| a.patient_id).collect(),
            })
            .await;

        Ok(count)
    }

    /// Newest first. Participants and admins only.
    pub async fn list_for_appointment(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<RescheduleRequest>, AppointmentError> {
        let appointment = self.load_appointment(appointment_id).await?;

        if !appointment.involves(actor.id) && !actor.is_admin() {
            return Err(AppointmentError::Forbidden(
                "Not authorized to view this appointment".to_string(),
            ));
        }

        Ok(self.store.list_reschedules(appointment_id).await?)
    }

    async fn load_appointment(&self, id: Uuid) -> Result<AppointmentRequest, AppointmentError> {
        self.store
            .get_appointment(id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Appointment".to_string()))
    }

    async fn load_reschedule(&self, id: Uuid) -> Result<RescheduleRequest, AppointmentError> {
        self.store
            .get_reschedule(id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Reschedule request".to_string()))
    }
}
