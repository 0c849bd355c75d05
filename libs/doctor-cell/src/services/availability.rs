use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::SchedulingRules;
use shared_database::{AppointmentFilter, SchedulingStore, StoreError};
use shared_models::auth::Actor;
use shared_models::scheduling::{hhmm, AppointmentRequest, DayOfWeek, DoctorAvailabilityEntry};
use shared_utils::{AppState, DoctorLockRegistry, EventSink, SchedulingEvent};

use crate::models::{
    AvailabilityConflictReport, AvailabilityEntryInput, AvailabilityError, DayConflict,
    SetWeeklyAvailabilityRequest, UpcomingAppointment, WeeklyAvailabilityDay,
};

/// `[today, today + lookahead)`, the window "upcoming" refers to everywhere.
pub fn upcoming_window(rules: &SchedulingRules) -> (NaiveDate, NaiveDate) {
    let today = Utc::now().date_naive();
    (today, today + Duration::days(rules.lookahead_days.max(0)))
}

pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    locks: Arc<DoctorLockRegistry>,
    events: Arc<dyn EventSink>,
    rules: SchedulingRules,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            locks: state.locks.clone(),
            events: state.events.clone(),
            rules: state.config.scheduling.clone(),
        }
    }

    /// Seven entries, Monday to Sunday, each annotated with the doctor's
    /// upcoming active appointments on that weekday.
    #[instrument(skip(self))]
    pub async fn get_weekly_availability(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<WeeklyAvailabilityDay>, AvailabilityError> {
        let week = self.public_weekly(doctor_id).await?;
        let mut by_day = self.upcoming_by_weekday(doctor_id).await?;

        let days = week
            .into_iter()
            .map(|entry| {
                let upcoming: Vec<UpcomingAppointment> = by_day
                    .remove(&entry.day_of_week)
                    .unwrap_or_default()
                    .iter()
                    .map(UpcomingAppointment::from)
                    .collect();

                WeeklyAvailabilityDay {
                    entry,
                    has_upcoming_appointments: !upcoming.is_empty(),
                    upcoming_appointments: upcoming,
                }
            })
            .collect();

        Ok(days)
    }

    /// Seven entries without the appointment annotation. Days with no stored
    /// row are reported disabled with the default 09:00-17:00 window.
    pub async fn public_weekly(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<DoctorAvailabilityEntry>, AvailabilityError> {
        let stored = self.store.list_availability(doctor_id).await?;

        Ok(DayOfWeek::ALL
            .into_iter()
            .map(|day| {
                stored
                    .iter()
                    .find(|entry| entry.day_of_week == day)
                    .cloned()
                    .unwrap_or_else(|| DoctorAvailabilityEntry::unset(doctor_id, day))
            })
            .collect())
    }

    pub async fn entry_for(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> Result<Option<DoctorAvailabilityEntry>, StoreError> {
        self.store.get_availability(doctor_id, day).await
    }

    /// Replaces the calling doctor's weekly calendar. Refuses to disable any
    /// weekday that still has upcoming PENDING or CONFIRMED appointments.
    #[instrument(skip(self, request), fields(doctor_id = %actor.id, entries = request.entries.len()))]
    pub async fn set_weekly_availability(
        &self,
        actor: &Actor,
        request: SetWeeklyAvailabilityRequest,
    ) -> Result<Vec<DoctorAvailabilityEntry>, AvailabilityError> {
        if !actor.is_doctor() {
            return Err(AvailabilityError::Forbidden(
                "Only doctors can manage availability".to_string(),
            ));
        }
        let doctor_id = actor.id;

        // Later entries for the same weekday win.
        let mut requested: BTreeMap<DayOfWeek, AvailabilityEntryInput> = BTreeMap::new();
        for input in request.entries {
            match DayOfWeek::from_name(&input.day_of_week) {
                Some(day) => {
                    requested.insert(day, input);
                }
                None => debug!("Dropping availability entry for unknown day {:?}", input.day_of_week),
            }
        }

        let guard = self.locks.lock(doctor_id).await;

        let stored = self.store.list_availability(doctor_id).await?;
        let now = Utc::now();

        let mut entries = Vec::with_capacity(requested.len());
        for (day, input) in requested {
            let current = stored.iter().find(|e| e.day_of_week == day);
            let start_time = resolve_time(
                input.start_time.as_deref(),
                current.map(|e| e.start_time),
                DoctorAvailabilityEntry::default_start(),
                day,
                "startTime",
            )?;
            let end_time = resolve_time(
                input.end_time.as_deref(),
                current.map(|e| e.end_time),
                DoctorAvailabilityEntry::default_end(),
                day,
                "endTime",
            )?;

            if input.enabled && start_time >= end_time {
                return Err(AvailabilityError::Validation(format!(
                    "startTime must be before endTime for {}",
                    day
                )));
            }

            entries.push(DoctorAvailabilityEntry {
                doctor_id,
                day_of_week: day,
                enabled: input.enabled,
                start_time,
                end_time,
                updated_at: Some(now),
            });
        }

        let disabled: Vec<DayOfWeek> = entries
            .iter()
            .filter(|e| !e.enabled)
            .map(|e| e.day_of_week)
            .collect();

        if !disabled.is_empty() {
            let by_day = self.upcoming_by_weekday(doctor_id).await?;
            let conflicts: Vec<DayConflict> = disabled
                .into_iter()
                .filter_map(|day| {
                    let count = by_day.get(&day).map_or(0, Vec::len);
                    (count > 0).then_some(DayConflict {
                        day_of_week: day,
                        appointment_count: count,
                    })
                })
                .collect();

            if !conflicts.is_empty() {
                let report = AvailabilityConflictReport::from_days(conflicts);
                warn!("Availability update for doctor {} refused: {:?}", doctor_id, report.conflicts);
                return Err(AvailabilityError::Conflict(report));
            }
        }

        if entries.is_empty() {
            return Ok(entries);
        }

        let days = entries.iter().map(|e| e.day_of_week).collect();
        let written = self.store.upsert_availability(doctor_id, entries).await?;
        drop(guard);

        info!("Updated {} availability day(s) for doctor {}", written.len(), doctor_id);
        self.events
            .publish(SchedulingEvent::AvailabilityUpdated { doctor_id, days })
            .await;

        Ok(written)
    }

    async fn upcoming_by_weekday(
        &self,
        doctor_id: Uuid,
    ) -> Result<HashMap<DayOfWeek, Vec<AppointmentRequest>>, StoreError> {
        let (from, to) = upcoming_window(&self.rules);
        let filter = AppointmentFilter::for_doctor(doctor_id).active().between(from, to);
        let page = self.store.list_appointments(&filter).await?;

        let mut by_day: HashMap<DayOfWeek, Vec<AppointmentRequest>> = HashMap::new();
        for appointment in page.items {
            by_day
                .entry(DayOfWeek::of(appointment.requested_date))
                .or_default()
                .push(appointment);
        }
        Ok(by_day)
    }
}

fn resolve_time(
    raw: Option<&str>,
    stored: Option<NaiveTime>,
    fallback: NaiveTime,
    day: DayOfWeek,
    field: &str,
) -> Result<NaiveTime, AvailabilityError> {
    match raw {
        Some(value) => hhmm::parse(value).ok_or_else(|| {
            AvailabilityError::Validation(format!("Invalid {} for {}: {}", field, day, value))
        }),
        None => Ok(stored.unwrap_or(fallback)),
    }
}
