use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::{InMemoryStore, SchedulingStore};

use crate::events::{EventSink, TracingEventSink};
use crate::scheduling_lock::DoctorLockRegistry;

/// Everything a cell service needs, cloned into each router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub locks: Arc<DoctorLockRegistry>,
    pub events: Arc<dyn EventSink>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn SchedulingStore>) -> Self {
        Self {
            config,
            store,
            locks: Arc::new(DoctorLockRegistry::new()),
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self::new(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}
