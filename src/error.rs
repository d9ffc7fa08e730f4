use thiserror::Error;

/// Application error type. Covers infrastructure failures and the payment
/// pipeline's own failure taxonomy.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The same UI action fired again before the previous trigger settled.
    #[error("Action throttled: {0}")]
    ActionThrottled(String),

    /// The boundary could not complete its duplicate check in time.
    #[error("Duplicate check unavailable: {0}")]
    DuplicateCheckUnavailable(String),

    #[error("Stale freshness token: {0}")]
    StaleFreshnessToken(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Signing rejected: {0}")]
    Signing(String),

    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code used in API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Redis(_) => "REDIS_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ActionThrottled(_) => "ACTION_THROTTLED",
            AppError::DuplicateCheckUnavailable(_) => "DUPLICATE_CHECK_UNAVAILABLE",
            AppError::StaleFreshnessToken(_) => "STALE_FRESHNESS_TOKEN",
            AppError::Build(_) => "BUILD_ERROR",
            AppError::Signing(_) => "SIGNING_REJECTED",
            AppError::SignerUnavailable(_) => "SIGNER_UNAVAILABLE",
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true for errors the freshness rebuild loop may react to.
    pub fn is_stale_token(&self) -> bool {
        matches!(self, AppError::StaleFreshnessToken(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
