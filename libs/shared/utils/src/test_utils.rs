use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tokio::sync::Mutex;
use uuid::Uuid;

use shared_config::{AppConfig, SchedulingRules, StoreBackend};
use shared_database::{InMemoryStore, SchedulingStore};
use shared_models::auth::{Actor, Role, User};
use shared_models::scheduling::{DayOfWeek, DoctorAvailabilityEntry, UserProfile};

use crate::events::{EventSink, SchedulingEvent};
use crate::state::AppState;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub scheduling: SchedulingRules,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            scheduling: SchedulingRules::default(),
        }
    }
}

impl TestConfig {
    pub fn with_rules(scheduling: SchedulingRules) -> Self {
        Self {
            scheduling,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            store_backend: StoreBackend::Memory,
            server_port: 3000,
            scheduling: self.scheduling.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).expect("test users carry uuid ids")
    }

    pub fn role(&self) -> Role {
        Role::from_claim(&self.role)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.uuid(), self.role())
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: self.role(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.uuid(),
            role: self.role(),
            full_name: Some(self.email.clone()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Supabase-shaped token: `role` is `authenticated`, the application role
    /// lives in `app_metadata`.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Captures every published event for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SchedulingEvent>>,
}

impl RecordingEventSink {
    pub async fn events(&self) -> Vec<SchedulingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: SchedulingEvent) {
        self.events.lock().await.push(event);
    }
}

/// In-memory wiring with handles on the concrete store and event recorder.
pub struct TestContext {
    pub config: TestConfig,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub events: Arc<RecordingEventSink>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new(TestConfig::default())
    }
}

impl TestContext {
    pub fn new(config: TestConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(RecordingEventSink::default());
        let state = AppState::new(config.to_arc(), store.clone()).with_events(events.clone());

        Self {
            config,
            state,
            store,
            events,
        }
    }

    pub fn with_rules(scheduling: SchedulingRules) -> Self {
        Self::new(TestConfig::with_rules(scheduling))
    }

    pub async fn seed_user(&self, user: &TestUser) {
        self.store.seed_profile(user.profile()).await;
    }

    pub async fn doctor(&self) -> TestUser {
        let user = TestUser::doctor("doctor@example.com");
        self.seed_user(&user).await;
        user
    }

    pub async fn patient(&self) -> TestUser {
        let user = TestUser::patient("patient@example.com");
        self.seed_user(&user).await;
        user
    }

    /// Stores an enabled weekday window for the doctor.
    pub async fn open_day(&self, doctor: &TestUser, day: DayOfWeek, start: &str, end: &str) {
        let entry = DoctorAvailabilityEntry {
            doctor_id: doctor.uuid(),
            day_of_week: day,
            enabled: true,
            start_time: NaiveTime::parse_from_str(start, "%H:%M").expect("HH:MM start"),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").expect("HH:MM end"),
            updated_at: Some(Utc::now()),
        };
        self.store
            .upsert_availability(doctor.uuid(), vec![entry])
            .await
            .expect("seed availability");
    }

    pub fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.config.jwt_secret, Some(24))
    }
}

/// Next calendar date falling on `day`, strictly after today.
pub fn next_weekday(day: DayOfWeek) -> NaiveDate {
    let today = Utc::now().date_naive();
    let target = day.index() as i64;
    let current = today.weekday().num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}
