use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use shared_models::scheduling::{AppointmentStatus, DayOfWeek, RescheduleStatus};

/// Facts a notifier or audit trail cares about. Emitted after the store
/// write succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulingEvent {
    AppointmentRequested {
        appointment_id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
        requested_date: NaiveDate,
        requested_time: String,
    },
    StatusChanged {
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        changed_by: Uuid,
    },
    AppointmentCancelled {
        appointment_id: Uuid,
        cancelled_by: Uuid,
        reason: String,
    },
    RescheduleRequested {
        reschedule_id: Uuid,
        appointment_id: Uuid,
        requested_by: Uuid,
    },
    RescheduleResolved {
        reschedule_id: Uuid,
        appointment_id: Uuid,
        status: RescheduleStatus,
        resolved_by: Uuid,
    },
    DaySwept {
        doctor_id: Uuid,
        day_of_week: DayOfWeek,
        appointment_ids: Vec<Uuid>,
        patient_ids: Vec<Uuid>,
    },
    ConsultationCreated {
        consultation_id: Uuid,
        appointment_id: Option<Uuid>,
        consultation_code: String,
    },
    AvailabilityUpdated {
        doctor_id: Uuid,
        days: Vec<DayOfWeek>,
    },
}

impl SchedulingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulingEvent::AppointmentRequested { .. } => "appointment_requested",
            SchedulingEvent::StatusChanged { .. } => "status_changed",
            SchedulingEvent::AppointmentCancelled { .. } => "appointment_cancelled",
            SchedulingEvent::RescheduleRequested { .. } => "reschedule_requested",
            SchedulingEvent::RescheduleResolved { .. } => "reschedule_resolved",
            SchedulingEvent::DaySwept { .. } => "day_swept",
            SchedulingEvent::ConsultationCreated { .. } => "consultation_created",
            SchedulingEvent::AvailabilityUpdated { .. } => "availability_updated",
        }
    }
}

/// Outbound hook for notifications and audit. Implementations must not fail
/// the operation that emitted the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: SchedulingEvent);
}

/// Default sink: one structured log line per event.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: SchedulingEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(event = event.name(), %payload, "scheduling event");
    }
}
