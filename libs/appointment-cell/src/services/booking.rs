use std::sync::Arc;

use tracing::{info, instrument, warn};

use shared_database::SchedulingStore;
use shared_models::scheduling::{AppointmentRequest, AppointmentStatus};
use shared_utils::{AppState, DoctorLockRegistry};

use crate::models::AppointmentError;
use crate::services::conflict::ConflictDetector;

pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    locks: Arc<DoctorLockRegistry>,
    conflicts: ConflictDetector,
}

impl AppointmentBookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            locks: state.locks.clone(),
            conflicts: ConflictDetector::new(state),
        }
    }

    /// Availability check, conflict check and insert under the doctor's lock,
    /// so two requests for the same slot cannot both pass the checks.
    #[instrument(skip(self, appointment), fields(doctor_id = %appointment.doctor_id, date = %appointment.requested_date, time = %appointment.requested_time))]
    pub async fn reserve_slot(
        &self,
        appointment: AppointmentRequest,
    ) -> Result<AppointmentRequest, AppointmentError> {
        if appointment.status != AppointmentStatus::Pending {
            return Err(AppointmentError::Validation(
                "New appointments start as PENDING".to_string(),
            ));
        }

        let _guard = self.locks.lock(appointment.doctor_id).await;

        let available = self
            .conflicts
            .is_within_availability(
                appointment.doctor_id,
                appointment.requested_date,
                &appointment.requested_time,
            )
            .await?;
        if !available {
            warn!("Requested slot is outside the doctor's availability");
            return Err(AppointmentError::SlotUnavailable(
                "Doctor is not available at the requested time".to_string(),
            ));
        }

        let conflicting = self
            .conflicts
            .has_conflict(
                appointment.doctor_id,
                appointment.requested_date,
                &appointment.requested_time,
            )
            .await?;
        if conflicting {
            warn!("Requested slot collides with an existing appointment");
            return Err(AppointmentError::SlotConflict(
                "The requested time conflicts with an existing appointment".to_string(),
            ));
        }

        let created = self.store.insert_appointment(appointment).await?;
        info!("Reserved slot for appointment {}", created.id);
        Ok(created)
    }
}
