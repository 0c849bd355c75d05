use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per doctor. Every check-then-write on a doctor's calendar
/// runs while holding that doctor's guard.
#[derive(Default)]
pub struct DoctorLockRegistry {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl DoctorLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, doctor_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(doctor_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
