use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which `SchedulingStore` implementation the API process wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "memory" | "in_memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// What the doctor-side day sweep does to the appointments it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkReschedulePolicy {
    /// Affected appointments move to RESCHEDULED immediately.
    Unilateral,
    /// Proposals are recorded but appointment statuses wait for a resolution.
    PatientApproval,
}

impl FromStr for BulkReschedulePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unilateral" => Ok(BulkReschedulePolicy::Unilateral),
            "patient_approval" | "patient-approval" => Ok(BulkReschedulePolicy::PatientApproval),
            other => Err(format!("unknown bulk reschedule policy: {}", other)),
        }
    }
}

/// Tunables for the scheduling engine.
#[derive(Debug, Clone)]
pub struct SchedulingRules {
    /// Two active bookings closer than this on the same day collide.
    pub min_gap_minutes: i64,
    /// Window used for "upcoming" appointments (availability view, day sweep).
    pub lookahead_days: i64,
    pub bulk_policy: BulkReschedulePolicy,
    /// When false, a malformed time only checks that the weekday is enabled.
    pub strict_time_format: bool,
    /// Attempts per code space before the consultation factory gives up.
    pub code_max_attempts: u32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            min_gap_minutes: 30,
            lookahead_days: 28,
            bulk_policy: BulkReschedulePolicy::Unilateral,
            strict_time_format: false,
            code_max_attempts: 5,
        }
    }
}

impl SchedulingRules {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            min_gap_minutes: parse_env("SCHEDULING_MIN_GAP_MINUTES", defaults.min_gap_minutes),
            lookahead_days: parse_env("SCHEDULING_LOOKAHEAD_DAYS", defaults.lookahead_days),
            bulk_policy: parse_env("BULK_RESCHEDULE_POLICY", defaults.bulk_policy),
            strict_time_format: parse_env("STRICT_TIME_FORMAT", defaults.strict_time_format),
            code_max_attempts: parse_env("CONSULTATION_CODE_MAX_ATTEMPTS", defaults.code_max_attempts)
                .max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub store_backend: StoreBackend,
    pub server_port: u16,
    pub scheduling: SchedulingRules,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            store_backend: parse_env("STORE_BACKEND", StoreBackend::Supabase),
            server_port: parse_env("PORT", 3000),
            scheduling: SchedulingRules::from_env(),
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Application not fully configured - missing Supabase environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid value for {} ({}), using default {:?}", key, e, default);
            default
        }),
        Err(_) => default,
    }
}
