use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

// ==============================================================================
// WEEKDAYS AND TIME-OF-DAY
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }

    /// Exact English weekday name; anything else is not a weekday.
    pub fn from_name(name: &str) -> Option<Self> {
        DayOfWeek::ALL.into_iter().find(|day| day.name() == name)
    }

    /// Locale-independent weekday of a calendar date.
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    /// Monday = 0 ... Sunday = 6, the order rows are stored and returned in.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `HH:MM` on the way out, `HH:MM` or `HH:MM:SS` on the way in.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn format(time: &NaiveTime) -> String {
        time.format("%H:%M").to_string()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {}", raw)))
    }
}

// ==============================================================================
// DOCTOR AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorAvailabilityEntry {
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub enabled: bool,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DoctorAvailabilityEntry {
    pub fn default_start() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn default_end() -> NaiveTime {
        NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    /// The entry reported for a weekday the doctor never configured.
    pub fn unset(doctor_id: Uuid, day_of_week: DayOfWeek) -> Self {
        Self {
            doctor_id,
            day_of_week,
            enabled: false,
            start_time: Self::default_start(),
            end_time: Self::default_end(),
            updated_at: None,
        }
    }
}

// ==============================================================================
// APPOINTMENT REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Active appointments count against availability and conflict checks.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Rescheduled => "RESCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(AppointmentStatus::Pending),
            "CONFIRMED" => Ok(AppointmentStatus::Confirmed),
            "RESCHEDULED" => Ok(AppointmentStatus::Rescheduled),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            "CANCELLED" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub requested_date: NaiveDate,
    /// `HH:MM`, validated at creation.
    pub requested_time: String,
    pub reason: String,
    #[serde(default)]
    pub priority: Priority,
    pub notes: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRequest {
    pub fn requested_time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.requested_time, "%H:%M").ok()
    }

    /// Date plus time of day; a malformed time falls back to midnight.
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.requested_date
            .and_time(self.requested_time_of_day().unwrap_or(NaiveTime::MIN))
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<ParticipantRole> {
        if user_id == self.doctor_id {
            Some(ParticipantRole::Doctor)
        } else if user_id == self.patient_id {
            Some(ParticipantRole::Patient)
        } else {
            None
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.role_of(user_id).is_some()
    }
}

// ==============================================================================
// RESCHEDULE REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Patient,
    Doctor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescheduleStatus {
    Pending,
    Approved,
    Rejected,
}

/// Which workflow produced a reschedule request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescheduleSource {
    Single,
    DaySweep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub requested_by: Uuid,
    pub requested_by_role: ParticipantRole,
    pub current_date: NaiveDate,
    pub current_time: String,
    pub new_date: NaiveDate,
    pub new_time: String,
    pub reason: String,
    pub notes: Option<String>,
    pub proposed_by: RescheduleSource,
    pub status: RescheduleStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// CONSULTATIONS
// ==============================================================================

/// A consultation session and its join credential.
///
/// For appointment-derived consultations `start_time` is the appointment's date
/// at 00:00 UTC. The appointment's `requested_time` is not merged in; consumers
/// that need the slot time read it from the linked appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_request_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub consultation_code: String,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// USER PROFILES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub role: Role,
    pub full_name: Option<String>,
}
