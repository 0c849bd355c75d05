use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Role;
use shared_models::scheduling::{
    hhmm, AppointmentRequest, AppointmentStatus, Consultation, DayOfWeek, DoctorAvailabilityEntry,
    ParticipantRole, Priority, RescheduleRequest, RescheduleSource, RescheduleStatus, UserProfile,
};

use crate::store::{
    AppointmentFilter, AppointmentPage, SchedulingStore, StoreError, StoreResult,
};
use crate::supabase::{SupabaseApiError, SupabaseClient};

const RETURN_REPRESENTATION: (&str, &str) = ("prefer", "return=representation");
const UPSERT_REPRESENTATION: (&str, &str) =
    ("prefer", "resolution=merge-duplicates,return=representation");

// ==============================================================================
// ROW SHAPES (snake_case columns)
// ==============================================================================

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: Uuid,
    role: Option<String>,
    full_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AvailabilityRow {
    doctor_id: Uuid,
    day_of_week: DayOfWeek,
    enabled: bool,
    #[serde(with = "hhmm")]
    start_time: NaiveTime,
    #[serde(with = "hhmm")]
    end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<AvailabilityRow> for DoctorAvailabilityEntry {
    fn from(row: AvailabilityRow) -> Self {
        Self {
            doctor_id: row.doctor_id,
            day_of_week: row.day_of_week,
            enabled: row.enabled,
            start_time: row.start_time,
            end_time: row.end_time,
            updated_at: row.updated_at,
        }
    }
}

impl From<DoctorAvailabilityEntry> for AvailabilityRow {
    fn from(entry: DoctorAvailabilityEntry) -> Self {
        Self {
            doctor_id: entry.doctor_id,
            day_of_week: entry.day_of_week,
            enabled: entry.enabled,
            start_time: entry.start_time,
            end_time: entry.end_time,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    requested_date: NaiveDate,
    requested_time: String,
    reason: String,
    priority: Priority,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    status: AppointmentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AppointmentRow> for AppointmentRequest {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            requested_date: row.requested_date,
            requested_time: row.requested_time,
            reason: row.reason,
            priority: row.priority,
            notes: row.notes,
            cancellation_reason: row.cancellation_reason,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<AppointmentRequest> for AppointmentRow {
    fn from(a: AppointmentRequest) -> Self {
        Self {
            id: a.id,
            patient_id: a.patient_id,
            doctor_id: a.doctor_id,
            requested_date: a.requested_date,
            requested_time: a.requested_time,
            reason: a.reason,
            priority: a.priority,
            notes: a.notes,
            cancellation_reason: a.cancellation_reason,
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RescheduleRow {
    id: Uuid,
    appointment_id: Uuid,
    requested_by: Uuid,
    requested_by_role: ParticipantRole,
    previous_date: NaiveDate,
    previous_time: String,
    new_date: NaiveDate,
    new_time: String,
    reason: String,
    notes: Option<String>,
    proposed_by: RescheduleSource,
    status: RescheduleStatus,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<RescheduleRow> for RescheduleRequest {
    fn from(row: RescheduleRow) -> Self {
        Self {
            id: row.id,
            appointment_id: row.appointment_id,
            requested_by: row.requested_by,
            requested_by_role: row.requested_by_role,
            current_date: row.previous_date,
            current_time: row.previous_time,
            new_date: row.new_date,
            new_time: row.new_time,
            reason: row.reason,
            notes: row.notes,
            proposed_by: row.proposed_by,
            status: row.status,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        }
    }
}

impl From<RescheduleRequest> for RescheduleRow {
    fn from(r: RescheduleRequest) -> Self {
        Self {
            id: r.id,
            appointment_id: r.appointment_id,
            requested_by: r.requested_by,
            requested_by_role: r.requested_by_role,
            previous_date: r.current_date,
            previous_time: r.current_time,
            new_date: r.new_date,
            new_time: r.new_time,
            reason: r.reason,
            notes: r.notes,
            proposed_by: r.proposed_by,
            status: r.status,
            created_at: r.created_at,
            resolved_at: r.resolved_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConsultationRow {
    id: Uuid,
    doctor_id: Uuid,
    patient_id: Uuid,
    appointment_request_id: Option<Uuid>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    consultation_code: String,
    notes: Option<String>,
    diagnosis: Option<String>,
    treatment: Option<String>,
    follow_up_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<ConsultationRow> for Consultation {
    fn from(row: ConsultationRow) -> Self {
        Self {
            id: row.id,
            doctor_id: row.doctor_id,
            patient_id: row.patient_id,
            appointment_request_id: row.appointment_request_id,
            start_time: row.start_time,
            end_time: row.end_time,
            consultation_code: row.consultation_code,
            notes: row.notes,
            diagnosis: row.diagnosis,
            treatment: row.treatment,
            follow_up_date: row.follow_up_date,
            created_at: row.created_at,
        }
    }
}

impl From<Consultation> for ConsultationRow {
    fn from(c: Consultation) -> Self {
        Self {
            id: c.id,
            doctor_id: c.doctor_id,
            patient_id: c.patient_id,
            appointment_request_id: c.appointment_request_id,
            start_time: c.start_time,
            end_time: c.end_time,
            consultation_code: c.consultation_code,
            notes: c.notes,
            diagnosis: c.diagnosis,
            treatment: c.treatment,
            follow_up_date: c.follow_up_date,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolveOutcome {
    request: RescheduleRow,
    appointment: Option<AppointmentRow>,
}

#[derive(Debug, Deserialize)]
struct ConfirmOutcome {
    appointment: AppointmentRow,
    consultation: ConsultationRow,
}

// ==============================================================================
// STORE
// ==============================================================================

/// `SchedulingStore` over Supabase PostgREST. Multi-record writes go through
/// the Postgres functions in `supabase/migrations`.
pub struct SupabaseStore {
    client: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: SupabaseClient::new(config),
        }
    }

    async fn select<T: serde::de::DeserializeOwned>(&self, path: &str) -> StoreResult<Vec<T>> {
        self.client
            .request::<Vec<T>>(Method::GET, path, None)
            .await
            .map_err(|e| classify(e, None))
    }

    async fn write_one<R>(&self, method: Method, path: &str, body: Value, what: &str) -> StoreResult<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let rows: Vec<R> = self
            .client
            .request_with_headers(method, path, Some(body), &[RETURN_REPRESENTATION])
            .await
            .map_err(|e| classify(e, None))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(what.to_string()))
    }
}

/// Maps a PostgREST failure onto the store taxonomy. `code` is the
/// consultation code being written, if any.
fn classify(err: anyhow::Error, code: Option<&str>) -> StoreError {
    if let Some(api) = err.downcast_ref::<SupabaseApiError>() {
        if api.is_unique_violation() && api.mentions("consultation_code") {
            return StoreError::DuplicateCode(code.unwrap_or_default().to_string());
        }
        if api.is_unique_violation() || api.status == reqwest::StatusCode::CONFLICT {
            return StoreError::Conflict(api.message.clone());
        }
        if api.code.as_deref() == Some("P0002") {
            return StoreError::NotFound(api.message.clone());
        }
    }
    StoreError::Backend(err.to_string())
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn status_list(statuses: &[AppointmentStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn appointment_query(filter: &AppointmentFilter) -> String {
    let mut query = vec!["select=*".to_string()];

    if let Some(id) = filter.patient_id {
        query.push(format!("patient_id=eq.{}", id));
    }
    if let Some(id) = filter.doctor_id {
        query.push(format!("doctor_id=eq.{}", id));
    }
    if !filter.statuses.is_empty() {
        query.push(format!("status=in.({})", status_list(&filter.statuses)));
    }
    if let Some(from) = filter.from_date {
        query.push(format!("requested_date=gte.{}", from));
    }
    if let Some(to) = filter.to_date {
        query.push(format!("requested_date=lt.{}", to));
    }

    query.push("order=requested_date.asc,requested_time.asc,created_at.asc".to_string());
    if filter.offset > 0 {
        query.push(format!("offset={}", filter.offset));
    }
    if let Some(limit) = filter.limit {
        query.push(format!("limit={}", limit));
    }

    format!("/rest/v1/appointment_requests?{}", query.join("&"))
}

#[async_trait]
impl SchedulingStore for SupabaseStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        let path = format!("/rest/v1/profiles?id=eq.{}&select=id,role,full_name", user_id);
        let rows: Vec<ProfileRow> = self.select(&path).await?;

        Ok(rows.into_iter().next().map(|row| UserProfile {
            id: row.id,
            role: row.role.as_deref().map(Role::from_claim).unwrap_or(Role::Unknown),
            full_name: row.full_name,
        }))
    }

    async fn list_availability(&self, doctor_id: Uuid) -> StoreResult<Vec<DoctorAvailabilityEntry>> {
        let path = format!("/rest/v1/doctor_availability?doctor_id=eq.{}", doctor_id);
        let rows: Vec<AvailabilityRow> = self.select(&path).await?;

        let mut entries: Vec<DoctorAvailabilityEntry> = rows.into_iter().map(Into::into).collect();
        entries.sort_by_key(|e| e.day_of_week.index());
        Ok(entries)
    }

    async fn get_availability(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> StoreResult<Option<DoctorAvailabilityEntry>> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}",
            doctor_id,
            day.name()
        );
        let rows: Vec<AvailabilityRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn upsert_availability(
        &self,
        doctor_id: Uuid,
        entries: Vec<DoctorAvailabilityEntry>,
    ) -> StoreResult<Vec<DoctorAvailabilityEntry>> {
        let now = Utc::now();
        let rows: Vec<AvailabilityRow> = entries
            .into_iter()
            .map(|mut entry| {
                entry.doctor_id = doctor_id;
                entry.updated_at = Some(entry.updated_at.unwrap_or(now));
                entry.into()
            })
            .collect();

        // One bulk POST is one statement on the Postgres side.
        let written: Vec<AvailabilityRow> = self
            .client
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_availability?on_conflict=doctor_id,day_of_week",
                Some(to_json(&rows)?),
                &[UPSERT_REPRESENTATION],
            )
            .await
            .map_err(|e| classify(e, None))?;

        debug!("Upserted {} availability rows", written.len());
        Ok(written.into_iter().map(Into::into).collect())
    }

    async fn insert_appointment(&self, appointment: AppointmentRequest) -> StoreResult<AppointmentRequest> {
        let row = AppointmentRow::from(appointment);
        let created: AppointmentRow = self
            .write_one(Method::POST, "/rest/v1/appointment_requests", to_json(&row)?, "Appointment")
            .await?;
        Ok(created.into())
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<AppointmentRequest>> {
        let path = format!("/rest/v1/appointment_requests?id=eq.{}", id);
        let rows: Vec<AppointmentRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<AppointmentPage> {
        let path = appointment_query(filter);
        let (rows, total) = self
            .client
            .request_with_count::<AppointmentRow>(&path)
            .await
            .map_err(|e| classify(e, None))?;

        Ok(AppointmentPage {
            items: rows.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn update_appointment(&self, appointment: AppointmentRequest) -> StoreResult<AppointmentRequest> {
        let path = format!("/rest/v1/appointment_requests?id=eq.{}", appointment.id);
        let what = format!("Appointment {}", appointment.id);
        let row = AppointmentRow::from(appointment);
        let updated: AppointmentRow = self
            .write_one(Method::PATCH, &path, to_json(&row)?, &what)
            .await?;
        Ok(updated.into())
    }

    async fn insert_reschedule(&self, request: RescheduleRequest) -> StoreResult<RescheduleRequest> {
        let row = RescheduleRow::from(request);
        let created: RescheduleRow = self
            .write_one(Method::POST, "/rest/v1/reschedule_requests", to_json(&row)?, "Reschedule request")
            .await?;
        Ok(created.into())
    }

    async fn get_reschedule(&self, id: Uuid) -> StoreResult<Option<RescheduleRequest>> {
        let path = format!("/rest/v1/reschedule_requests?id=eq.{}", id);
        let rows: Vec<RescheduleRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn list_reschedules(&self, appointment_id: Uuid) -> StoreResult<Vec<RescheduleRequest>> {
        let path = format!(
            "/rest/v1/reschedule_requests?appointment_id=eq.{}&order=created_at.desc",
            appointment_id
        );
        let rows: Vec<RescheduleRow> = self.select(&path).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip_all, fields(reschedule_id = %request.id))]
    async fn resolve_reschedule(
        &self,
        request: RescheduleRequest,
        appointment: Option<AppointmentRequest>,
    ) -> StoreResult<(RescheduleRequest, Option<AppointmentRequest>)> {
        let args = json!({
            "p_request": to_json(&RescheduleRow::from(request))?,
            "p_appointment": appointment.map(AppointmentRow::from),
        });

        let outcome: ResolveOutcome = self
            .client
            .rpc("resolve_reschedule_request", args)
            .await
            .map_err(|e| classify(e, None))?;

        Ok((outcome.request.into(), outcome.appointment.map(Into::into)))
    }

    #[instrument(skip_all, fields(proposals = proposals.len(), appointments = appointments.len()))]
    async fn apply_day_sweep(
        &self,
        proposals: Vec<RescheduleRequest>,
        appointments: Vec<AppointmentRequest>,
    ) -> StoreResult<usize> {
        let proposals: Vec<RescheduleRow> = proposals.into_iter().map(Into::into).collect();
        let appointments: Vec<AppointmentRow> = appointments.into_iter().map(Into::into).collect();

        let args = json!({
            "p_proposals": to_json(&proposals)?,
            "p_appointments": to_json(&appointments)?,
        });

        let inserted: i64 = self
            .client
            .rpc("apply_day_sweep", args)
            .await
            .map_err(|e| classify(e, None))?;

        Ok(inserted.max(0) as usize)
    }

    #[instrument(skip_all, fields(appointment_id = %appointment.id, code = %consultation.consultation_code))]
    async fn confirm_with_consultation(
        &self,
        appointment: AppointmentRequest,
        consultation: Consultation,
    ) -> StoreResult<(AppointmentRequest, Consultation)> {
        let code = consultation.consultation_code.clone();
        let args = json!({
            "p_appointment": to_json(&AppointmentRow::from(appointment))?,
            "p_consultation": to_json(&ConsultationRow::from(consultation))?,
        });

        let outcome: ConfirmOutcome = self
            .client
            .rpc("confirm_appointment_with_consultation", args)
            .await
            .map_err(|e| {
                let mapped = classify(e, Some(&code));
                if matches!(mapped, StoreError::DuplicateCode(_)) {
                    warn!("Consultation code collision on {}", code);
                }
                mapped
            })?;

        Ok((outcome.appointment.into(), outcome.consultation.into()))
    }

    async fn insert_consultation(&self, consultation: Consultation) -> StoreResult<Consultation> {
        let code = consultation.consultation_code.clone();
        let row = ConsultationRow::from(consultation);

        let rows: Vec<ConsultationRow> = self
            .client
            .request_with_headers(
                Method::POST,
                "/rest/v1/consultations",
                Some(to_json(&row)?),
                &[RETURN_REPRESENTATION],
            )
            .await
            .map_err(|e| classify(e, Some(&code)))?;

        rows.into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| StoreError::Backend("insert returned no consultation".to_string()))
    }

    async fn find_consultation_by_appointment(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Consultation>> {
        let path = format!("/rest/v1/consultations?appointment_request_id=eq.{}", appointment_id);
        let rows: Vec<ConsultationRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn find_consultation_by_code(&self, code: &str) -> StoreResult<Option<Consultation>> {
        let path = format!(
            "/rest/v1/consultations?consultation_code=eq.{}",
            urlencoding::encode(code)
        );
        let rows: Vec<ConsultationRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }
}
