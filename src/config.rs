use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub guard: GuardSettings,
    #[serde(default)]
    pub settlement: SettlementSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Policy knobs for the duplicate-suppression pipeline.
///
/// Window and cooldown widths trade false-positive collisions between two
/// legitimately identical payments against race coverage, so every one of
/// them is configuration rather than a constant.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Minimum interval between two accepted triggers of one UI action.
    pub action_min_interval_ms: u64,
    /// Width W of an idempotency key's time bucket.
    pub dedup_window_ms: i64,
    /// How long a failed in-flight entry keeps blocking its key.
    pub cooldown_secs: i64,
    pub key_prefix: String,
    /// Oldest a freshness token may be at handoff.
    pub freshness_max_age_ms: u64,
    pub max_rebuilds: u32,
    /// Bound on Expired -> Built resubmissions.
    pub max_submit_attempts: u32,
    /// Width T of the boundary's "seen recently" window.
    pub duplicate_window_secs: u64,
    pub duplicate_check_timeout_ms: u64,
    pub duplicate_key_prefix: String,
    pub registry_sweep_interval_secs: u64,
    pub reconciliation_interval_secs: u64,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            action_min_interval_ms: 500,
            dedup_window_ms: 10_000,
            cooldown_secs: 60,
            key_prefix: "idem".to_string(),
            freshness_max_age_ms: 1_000,
            max_rebuilds: 3,
            max_submit_attempts: 3,
            duplicate_window_secs: 30,
            duplicate_check_timeout_ms: 1_500,
            duplicate_key_prefix: "guard".to_string(),
            registry_sweep_interval_secs: 30,
            reconciliation_interval_secs: 60,
        }
    }
}

/// Downstream settlement layer and the boundary's co-signing key.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    pub forward_url: String,
    /// Listing of recent confirmations for the reconciliation sweep. Empty
    /// disables the sweep.
    pub confirmations_url: String,
    pub request_timeout_ms: u64,
    /// Hex-encoded 32-byte ed25519 seed for the boundary co-signer.
    pub cosigner_seed_hex: String,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            forward_url: "http://localhost:8899/v1/transactions".to_string(),
            confirmations_url: String::new(),
            request_timeout_ms: 5_000,
            cosigner_seed_hex: String::new(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
