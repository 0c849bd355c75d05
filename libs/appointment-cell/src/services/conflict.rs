use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use doctor_cell::services::availability::AvailabilityService;
use shared_config::SchedulingRules;
use shared_database::{AppointmentFilter, SchedulingStore, StoreError};
use shared_models::scheduling::{AppointmentRequest, DayOfWeek, DoctorAvailabilityEntry};
use shared_utils::AppState;

static SLOT_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid time pattern"));

/// Strict `HH:MM`, 00:00 through 23:59.
pub fn parse_slot_time(value: &str) -> Option<NaiveTime> {
    if !SLOT_TIME.is_match(value) {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Inclusive on both ends.
pub fn window_contains(entry: &DoctorAvailabilityEntry, time: NaiveTime) -> bool {
    entry.start_time <= time && time <= entry.end_time
}

/// True when the two instants are strictly closer than `min_gap_minutes`.
pub fn within_gap(a: NaiveDateTime, b: NaiveDateTime, min_gap_minutes: i64) -> bool {
    (a - b).num_minutes().abs() < min_gap_minutes
}

pub struct ConflictDetector {
    availability: AvailabilityService,
    store: Arc<dyn SchedulingStore>,
    rules: SchedulingRules,
}

impl ConflictDetector {
    pub fn new(state: &AppState) -> Self {
        Self {
            availability: AvailabilityService::new(state),
            store: state.store.clone(),
            rules: state.config.scheduling.clone(),
        }
    }

    /// Whether the doctor's weekly calendar admits the requested slot.
    ///
    /// A time that is not `HH:MM` only checks that the weekday is enabled,
    /// unless strict time format is configured.
    pub async fn is_within_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
    ) -> Result<bool, StoreError> {
        let day = DayOfWeek::of(date);
        let entry = match self.availability.entry_for(doctor_id, day).await? {
            Some(entry) if entry.enabled => entry,
            _ => {
                debug!("Doctor {} has no availability on {}", doctor_id, day);
                return Ok(false);
            }
        };

        match parse_slot_time(time) {
            Some(t) => Ok(window_contains(&entry, t)),
            None if self.rules.strict_time_format => Ok(false),
            None => {
                debug!("Unparseable time {:?}; checking {} is enabled only", time, day);
                Ok(true)
            }
        }
    }

    /// Active appointments on the same calendar day closer than the minimum gap.
    pub async fn conflicting_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
    ) -> Result<Vec<AppointmentRequest>, StoreError> {
        let requested = date.and_time(parse_slot_time(time).unwrap_or(NaiveTime::MIN));
        let filter = AppointmentFilter::for_doctor(doctor_id).active().on(date);
        let same_day = self.store.list_appointments(&filter).await?;

        Ok(same_day
            .items
            .into_iter()
            .filter(|existing| within_gap(requested, existing.scheduled_at(), self.rules.min_gap_minutes))
            .collect())
    }

    pub async fn has_conflict(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
    ) -> Result<bool, StoreError> {
        let conflicts = self.conflicting_appointments(doctor_id, date, time).await?;
        if let Some(first) = conflicts.first() {
            debug!(
                "Requested {} {} collides with appointment {} at {}",
                date, time, first.id, first.requested_time
            );
        }
        Ok(!conflicts.is_empty())
    }
}
