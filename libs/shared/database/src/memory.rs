use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::scheduling::{
    AppointmentRequest, Consultation, DayOfWeek, DoctorAvailabilityEntry, RescheduleRequest,
    UserProfile,
};

use crate::store::{
    AppointmentFilter, AppointmentPage, SchedulingStore, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, UserProfile>,
    availability: HashMap<(Uuid, DayOfWeek), DoctorAvailabilityEntry>,
    appointments: HashMap<Uuid, AppointmentRequest>,
    reschedules: HashMap<Uuid, RescheduleRequest>,
    consultations: HashMap<Uuid, Consultation>,
}

impl Tables {
    fn code_taken(&self, code: &str) -> bool {
        self.consultations.values().any(|c| c.consultation_code == code)
    }

    fn check_new_consultation(&self, consultation: &Consultation) -> StoreResult<()> {
        if self.code_taken(&consultation.consultation_code) {
            return Err(StoreError::DuplicateCode(consultation.consultation_code.clone()));
        }
        if let Some(appointment_id) = consultation.appointment_request_id {
            let linked = self
                .consultations
                .values()
                .any(|c| c.appointment_request_id == Some(appointment_id));
            if linked {
                return Err(StoreError::Conflict(format!(
                    "appointment {} already has a consultation",
                    appointment_id
                )));
            }
        }
        Ok(())
    }

    fn require_appointment(&self, id: Uuid) -> StoreResult<()> {
        if self.appointments.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("Appointment {}", id)))
        }
    }
}

/// Process-local store. Every call holds the table lock for its whole
/// duration, which makes the multi-record calls atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_profile(&self, profile: UserProfile) {
        self.tables.write().await.profiles.insert(profile.id, profile);
    }
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn list_availability(&self, doctor_id: Uuid) -> StoreResult<Vec<DoctorAvailabilityEntry>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .availability
            .values()
            .filter(|entry| entry.doctor_id == doctor_id)
            .cloned()
            .collect();
        rows.sort_by_key(|entry| entry.day_of_week.index());
        Ok(rows)
    }

    async fn get_availability(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> StoreResult<Option<DoctorAvailabilityEntry>> {
        Ok(self.tables.read().await.availability.get(&(doctor_id, day)).cloned())
    }

    async fn upsert_availability(
        &self,
        doctor_id: Uuid,
        entries: Vec<DoctorAvailabilityEntry>,
    ) -> StoreResult<Vec<DoctorAvailabilityEntry>> {
        let mut tables = self.tables.write().await;
        let mut written = Vec::with_capacity(entries.len());

        for mut entry in entries {
            entry.doctor_id = doctor_id;
            tables
                .availability
                .insert((doctor_id, entry.day_of_week), entry.clone());
            written.push(entry);
        }

        debug!("Upserted {} availability rows for doctor {}", written.len(), doctor_id);
        Ok(written)
    }

    async fn insert_appointment(&self, appointment: AppointmentRequest) -> StoreResult<AppointmentRequest> {
        let mut tables = self.tables.write().await;
        if tables.appointments.contains_key(&appointment.id) {
            return Err(StoreError::Conflict(format!("appointment {} exists", appointment.id)));
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<AppointmentRequest>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<AppointmentPage> {
        let tables = self.tables.read().await;
        let mut matching: Vec<_> = tables
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.requested_date
                .cmp(&b.requested_date)
                .then_with(|| a.requested_time.cmp(&b.requested_time))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(AppointmentPage { items, total })
    }

    async fn update_appointment(&self, appointment: AppointmentRequest) -> StoreResult<AppointmentRequest> {
        let mut tables = self.tables.write().await;
        tables.require_appointment(appointment.id)?;
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn insert_reschedule(&self, request: RescheduleRequest) -> StoreResult<RescheduleRequest> {
        let mut tables = self.tables.write().await;
        tables.require_appointment(request.appointment_id)?;
        tables.reschedules.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_reschedule(&self, id: Uuid) -> StoreResult<Option<RescheduleRequest>> {
        Ok(self.tables.read().await.reschedules.get(&id).cloned())
    }

    async fn list_reschedules(&self, appointment_id: Uuid) -> StoreResult<Vec<RescheduleRequest>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .reschedules
            .values()
            .filter(|r| r.appointment_id == appointment_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn resolve_reschedule(
        &self,
        request: RescheduleRequest,
        appointment: Option<AppointmentRequest>,
    ) -> StoreResult<(RescheduleRequest, Option<AppointmentRequest>)> {
        let mut tables = self.tables.write().await;

        if !tables.reschedules.contains_key(&request.id) {
            return Err(StoreError::NotFound(format!("Reschedule request {}", request.id)));
        }
        if let Some(appointment) = &appointment {
            tables.require_appointment(appointment.id)?;
        }

        tables.reschedules.insert(request.id, request.clone());
        if let Some(appointment) = &appointment {
            tables.appointments.insert(appointment.id, appointment.clone());
        }

        Ok((request, appointment))
    }

    async fn apply_day_sweep(
        &self,
        proposals: Vec<RescheduleRequest>,
        appointments: Vec<AppointmentRequest>,
    ) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;

        // Validate everything before the first write.
        for proposal in &proposals {
            tables.require_appointment(proposal.appointment_id)?;
        }
        for appointment in &appointments {
            tables.require_appointment(appointment.id)?;
        }

        let count = proposals.len();
        for proposal in proposals {
            tables.reschedules.insert(proposal.id, proposal);
        }
        for appointment in appointments {
            tables.appointments.insert(appointment.id, appointment);
        }

        Ok(count)
    }

    async fn confirm_with_consultation(
        &self,
        appointment: AppointmentRequest,
        consultation: Consultation,
    ) -> StoreResult<(AppointmentRequest, Consultation)> {
        let mut tables = self.tables.write().await;

        tables.require_appointment(appointment.id)?;
        tables.check_new_consultation(&consultation)?;

        tables.appointments.insert(appointment.id, appointment.clone());
        tables.consultations.insert(consultation.id, consultation.clone());

        Ok((appointment, consultation))
    }

    async fn insert_consultation(&self, consultation: Consultation) -> StoreResult<Consultation> {
        let mut tables = self.tables.write().await;
        tables.check_new_consultation(&consultation)?;
        tables.consultations.insert(consultation.id, consultation.clone());
        Ok(consultation)
    }

    async fn find_consultation_by_appointment(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Consultation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .consultations
            .values()
            .find(|c| c.appointment_request_id == Some(appointment_id))
            .cloned())
    }

    async fn find_consultation_by_code(&self, code: &str) -> StoreResult<Option<Consultation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .consultations
            .values()
            .find(|c| c.consultation_code == code)
            .cloned())
    }
}
