use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_models::scheduling::{
    AppointmentRequest, AppointmentStatus, Consultation, DayOfWeek, DoctorAvailabilityEntry,
    RescheduleRequest, UserProfile,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Consultation code already in use: {0}")]
    DuplicateCode(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row selection for appointment queries. `to_date` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub statuses: Vec<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl AppointmentFilter {
    pub fn for_doctor(doctor_id: Uuid) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            ..Default::default()
        }
    }

    pub fn for_patient(patient_id: Uuid) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Default::default()
        }
    }

    pub fn active(mut self) -> Self {
        self.statuses = vec![AppointmentStatus::Pending, AppointmentStatus::Confirmed];
        self
    }

    pub fn with_status(mut self, status: AppointmentStatus) -> Self {
        self.statuses = vec![status];
        self
    }

    pub fn between(mut self, from: NaiveDate, to_exclusive: NaiveDate) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to_exclusive);
        self
    }

    pub fn on(self, date: NaiveDate) -> Self {
        let next = date.succ_opt().unwrap_or(date);
        self.between(date, next)
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, appointment: &AppointmentRequest) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && (self.statuses.is_empty() || self.statuses.contains(&appointment.status))
            && self.from_date.map_or(true, |d| appointment.requested_date >= d)
            && self.to_date.map_or(true, |d| appointment.requested_date < d)
    }
}

#[derive(Debug, Clone)]
pub struct AppointmentPage {
    pub items: Vec<AppointmentRequest>,
    pub total: u64,
}

/// Persistence boundary for the scheduling engine.
///
/// Methods documented as atomic must apply all of their writes or none.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>>;

    /// Stored rows only, ordered Monday to Sunday.
    async fn list_availability(&self, doctor_id: Uuid) -> StoreResult<Vec<DoctorAvailabilityEntry>>;

    async fn get_availability(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> StoreResult<Option<DoctorAvailabilityEntry>>;

    /// Atomic upsert keyed on (doctor, weekday).
    async fn upsert_availability(
        &self,
        doctor_id: Uuid,
        entries: Vec<DoctorAvailabilityEntry>,
    ) -> StoreResult<Vec<DoctorAvailabilityEntry>>;

    async fn insert_appointment(&self, appointment: AppointmentRequest) -> StoreResult<AppointmentRequest>;

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<AppointmentRequest>>;

    /// Ordered by date then time, ascending.
    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<AppointmentPage>;

    async fn update_appointment(&self, appointment: AppointmentRequest) -> StoreResult<AppointmentRequest>;

    async fn insert_reschedule(&self, request: RescheduleRequest) -> StoreResult<RescheduleRequest>;

    async fn get_reschedule(&self, id: Uuid) -> StoreResult<Option<RescheduleRequest>>;

    /// Newest first.
    async fn list_reschedules(&self, appointment_id: Uuid) -> StoreResult<Vec<RescheduleRequest>>;

    /// Atomic: writes the resolved request and, when approved, the moved appointment.
    async fn resolve_reschedule(
        &self,
        request: RescheduleRequest,
        appointment: Option<AppointmentRequest>,
    ) -> StoreResult<(RescheduleRequest, Option<AppointmentRequest>)>;

    /// Atomic: inserts every proposal and writes every appointment.
    async fn apply_day_sweep(
        &self,
        proposals: Vec<RescheduleRequest>,
        appointments: Vec<AppointmentRequest>,
    ) -> StoreResult<usize>;

    /// Atomic: writes the confirmed appointment and inserts its consultation.
    /// Fails with `DuplicateCode` when the code is taken, leaving the
    /// appointment untouched.
    async fn confirm_with_consultation(
        &self,
        appointment: AppointmentRequest,
        consultation: Consultation,
    ) -> StoreResult<(AppointmentRequest, Consultation)>;

    async fn insert_consultation(&self, consultation: Consultation) -> StoreResult<Consultation>;

    async fn find_consultation_by_appointment(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Consultation>>;

    async fn find_consultation_by_code(&self, code: &str) -> StoreResult<Option<Consultation>>;
}
