use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_database::{SchedulingStore, StoreError};
use shared_models::auth::{Actor, Role};
use shared_models::scheduling::{AppointmentRequest, AppointmentStatus, Consultation};
use shared_utils::{AppState, EventSink, SchedulingEvent};

use crate::models::{ConsultationError, Materialized};
use crate::services::code::{self, CodePrefix};

pub struct ConsultationFactory {
    store: Arc<dyn SchedulingStore>,
    events: Arc<dyn EventSink>,
    max_attempts: u32,
}

impl ConsultationFactory {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            events: state.events.clone(),
            max_attempts: state.config.scheduling.code_max_attempts.max(1),
        }
    }

    /// Persists a CONFIRMED appointment together with its consultation.
    ///
    /// An appointment that already has a consultation keeps it; only the
    /// appointment row is written in that case.
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id))]
    pub async fn materialize(
        &self,
        appointment: AppointmentRequest,
    ) -> Result<Materialized, ConsultationError> {
        if appointment.status != AppointmentStatus::Confirmed {
            return Err(ConsultationError::Validation(
                "Only confirmed appointments become consultations".to_string(),
            ));
        }

        if let Some(existing) = self.store.find_consultation_by_appointment(appointment.id).await? {
            info!("Appointment {} already has consultation {}", appointment.id, existing.id);
            let appointment = self.store.update_appointment(appointment).await?;
            return Ok(Materialized {
                appointment,
                consultation: existing,
                created: false,
            });
        }

        let context = code::appointment_context(appointment.requested_date, &appointment.requested_time);
        let start_time = Utc.from_utc_datetime(&appointment.requested_date.and_time(chrono::NaiveTime::MIN));

        for candidate in code::candidates(CodePrefix::Appointment, context, self.max_attempts) {
            let consultation = Consultation {
                id: Uuid::new_v4(),
                doctor_id: appointment.doctor_id,
                patient_id: appointment.patient_id,
                appointment_request_id: Some(appointment.id),
                start_time,
                end_time: None,
                consultation_code: candidate,
                notes: None,
                diagnosis: None,
                treatment: None,
                follow_up_date: None,
                created_at: Utc::now(),
            };

            match self
                .store
                .confirm_with_consultation(appointment.clone(), consultation)
                .await
            {
                Ok((appointment, consultation)) => {
                    self.announce(&consultation).await;
                    return Ok(Materialized {
                        appointment,
                        consultation,
                        created: true,
                    });
                }
                Err(StoreError::DuplicateCode(code)) => {
                    warn!("Consultation code {} already taken, retrying", code);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ConsultationError::CodeSpaceExhausted {
            attempts: self.max_attempts.saturating_mul(2),
        })
    }

    /// Opens a consultation without an appointment (`DM` codes).
    #[instrument(skip(self, notes), fields(doctor_id = %actor.id))]
    pub async fn create_direct(
        &self,
        actor: &Actor,
        patient_id: Uuid,
        notes: Option<String>,
    ) -> Result<Consultation, ConsultationError> {
        if !actor.is_doctor() {
            return Err(ConsultationError::Forbidden(
                "Only doctors can start consultations".to_string(),
            ));
        }

        match self.store.get_profile(patient_id).await? {
            Some(profile) if profile.role == Role::Patient => {}
            _ => return Err(ConsultationError::NotFound("Patient".to_string())),
        }

        let context = code::direct_context(&actor.id, &patient_id);
        let now = Utc::now();

        for candidate in code::candidates(CodePrefix::Direct, context, self.max_attempts) {
            let consultation = Consultation {
                id: Uuid::new_v4(),
                doctor_id: actor.id,
                patient_id,
                appointment_request_id: None,
                start_time: now,
                end_time: None,
                consultation_code: candidate,
                notes: notes.clone(),
                diagnosis: None,
                treatment: None,
                follow_up_date: None,
                created_at: now,
            };

            match self.store.insert_consultation(consultation).await {
                Ok(consultation) => {
                    self.announce(&consultation).await;
                    return Ok(consultation);
                }
                Err(StoreError::DuplicateCode(code)) => {
                    warn!("Consultation code {} already taken, retrying", code);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ConsultationError::CodeSpaceExhausted {
            attempts: self.max_attempts.saturating_mul(2),
        })
    }

    /// Join lookup. Only the consultation's doctor, its patient or an admin
    /// may resolve a code.
    pub async fn find_by_code(
        &self,
        code: &str,
        actor: &Actor,
    ) -> Result<Consultation, ConsultationError> {
        if !code::is_valid_code(code) {
            return Err(ConsultationError::Validation(format!(
                "Invalid consultation code: {}",
                code
            )));
        }

        let consultation = self
            .store
            .find_consultation_by_code(code)
            .await?
            .ok_or_else(|| ConsultationError::NotFound("Consultation".to_string()))?;

        let participant = actor.id == consultation.doctor_id || actor.id == consultation.patient_id;
        if !participant && !actor.is_admin() {
            return Err(ConsultationError::Forbidden(
                "Not a participant of this consultation".to_string(),
            ));
        }

        Ok(consultation)
    }

    async fn announce(&self, consultation: &Consultation) {
        info!(
            "Created consultation {} with code {}",
            consultation.id, consultation.consultation_code
        );
        self.events
            .publish(SchedulingEvent::ConsultationCreated {
                consultation_id: consultation.id,
                appointment_id: consultation.appointment_request_id,
                consultation_code: consultation.consultation_code.clone(),
            })
            .await;
    }
}
