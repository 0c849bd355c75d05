pub mod events;
pub mod extractor;
pub mod jwt;
pub mod scheduling_lock;
pub mod state;
pub mod test_utils;

pub use events::{EventSink, SchedulingEvent, TracingEventSink};
pub use scheduling_lock::DoctorLockRegistry;
pub use state::AppState;
