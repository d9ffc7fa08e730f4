use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::GuardSettings;
use crate::error::{AppError, Result};
use crate::idempotency::IdempotencyKey;
use crate::models::PaymentRequest;

/// Short-lived proof of recency required by the settlement layer.
///
/// Expiry follows an external, monotonically advancing position rather than
/// wall-clock time; a larger `last_valid_position` means a newer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessToken {
    pub value: String,
    pub last_valid_position: u64,
}

impl FreshnessToken {
    pub fn new(value: impl Into<String>, last_valid_position: u64) -> Self {
        Self {
            value: value.into(),
            last_valid_position,
        }
    }

    pub fn is_newer_than(&self, other: &FreshnessToken) -> bool {
        self.last_valid_position > other.last_valid_position
    }
}

/// Authoritative source of freshness tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FreshnessProvider: Send + Sync {
    async fn fetch(&self) -> Result<FreshnessToken>;

    /// Asks the source, not a local timer, whether the token is still usable.
    async fn is_valid(&self, token: &FreshnessToken) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("signing rejected: {0}")]
    Rejected(String),
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::Rejected(msg) => AppError::Signing(msg),
            SigningError::Unavailable(msg) => AppError::SignerUnavailable(msg),
        }
    }
}

/// One party of the signing ceremony: raw bytes in, signed bytes out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    async fn sign(&self, payload: &[u8]) -> std::result::Result<Vec<u8>, SigningError>;
}

/// Canonical bytes handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedPayload {
    pub idempotency_key: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub amount: String,
    pub currency: String,
    pub freshness_token: String,
    pub last_valid_position: u64,
    pub attempt_number: u32,
}

impl UnsignedPayload {
    fn new(key: &IdempotencyKey, payment: &PaymentRequest, token: &FreshnessToken, attempt_number: u32) -> Self {
        Self {
            idempotency_key: key.to_string(),
            sender_id: payment.sender_id.clone(),
            recipient_id: payment.recipient_id.clone(),
            amount: payment.amount.to_string(),
            currency: payment.currency.to_string(),
            freshness_token: token.value.clone(),
            last_valid_position: token.last_valid_position,
            attempt_number,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AppError::Build(format!("Failed to encode payload: {}", e)))
    }
}

/// A single signed attempt. Never reused across rebuilds.
#[derive(Debug, Clone)]
pub struct TransactionAttempt {
    pub freshness_token: FreshnessToken,
    pub token_obtained_at: Instant,
    pub attempt_number: u32,
    pub signature_bytes: Vec<u8>,
    pub payload: UnsignedPayload,
}

impl TransactionAttempt {
    pub fn token_age(&self) -> Duration {
        self.token_obtained_at.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Deliberately a small fraction of the token's real validity window.
    pub max_token_age: Duration,
    pub max_rebuilds: u32,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_token_age: Duration::from_millis(1_000),
            max_rebuilds: 3,
        }
    }
}

impl From<&GuardSettings> for BuilderConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            max_token_age: Duration::from_millis(settings.freshness_max_age_ms),
            max_rebuilds: settings.max_rebuilds,
        }
    }
}

/// Produces signed payloads whose freshness token is fetched as the very last
/// step before signing and re-checked right before handoff.
#[derive(Clone)]
pub struct FreshnessAwareBuilder {
    provider: Arc<dyn FreshnessProvider>,
    signer: Arc<dyn PayloadSigner>,
    config: BuilderConfig,
}

impl FreshnessAwareBuilder {
    pub fn new(provider: Arc<dyn FreshnessProvider>, signer: Arc<dyn PayloadSigner>, config: BuilderConfig) -> Self {
        Self {
            provider,
            signer,
            config,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Builds and signs an attempt, rebuilding from scratch while the token
    /// comes back stale. When `predecessor` is given the new token must be
    /// strictly newer than it.
    pub async fn build_signed(
        &self,
        key: &IdempotencyKey,
        request: &PaymentRequest,
        attempt_number: u32,
        predecessor: Option<&FreshnessToken>,
    ) -> Result<TransactionAttempt> {
        let payment = request.normalized();
        let mut last_stale = None;

        for rebuild in 0..=self.config.max_rebuilds {
            match self.build_once(key, &payment, attempt_number, predecessor).await {
                Ok(attempt) => return Ok(attempt),
                Err(e) if e.is_stale_token() => {
                    tracing::warn!(
                        idempotency_key = %key,
                        attempt_number,
                        rebuild,
                        "Rebuilding payload: {}", e
                    );
                    last_stale = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_stale.unwrap_or_else(|| {
            AppError::StaleFreshnessToken("no fresh token within rebuild budget".to_string())
        }))
    }

    /// Re-validates an attempt at the moment of handoff and rebuilds it if
    /// the token has aged past the threshold or the source rejects it.
    pub async fn refresh_if_stale(
        &self,
        key: &IdempotencyKey,
        request: &PaymentRequest,
        attempt: TransactionAttempt,
        predecessor: Option<&FreshnessToken>,
    ) -> Result<(TransactionAttempt, bool)> {
        match self.check_fresh(&attempt).await {
            Ok(()) => Ok((attempt, false)),
            Err(e) if e.is_stale_token() => {
                tracing::info!(
                    idempotency_key = %key,
                    attempt_number = attempt.attempt_number,
                    token_age_ms = attempt.token_age().as_millis() as u64,
                    "Proactive rebuild before handoff"
                );
                let rebuilt = self
                    .build_signed(key, request, attempt.attempt_number, predecessor)
                    .await?;
                Ok((rebuilt, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Age check first (cheap), then the authoritative validity check.
    pub async fn check_fresh(&self, attempt: &TransactionAttempt) -> Result<()> {
        let age = attempt.token_age();
        if age > self.config.max_token_age {
            return Err(AppError::StaleFreshnessToken(format!(
                "token aged {}ms exceeds {}ms",
                age.as_millis(),
                self.config.max_token_age.as_millis()
            )));
        }

        if !self.provider.is_valid(&attempt.freshness_token).await? {
            return Err(AppError::StaleFreshnessToken(format!(
                "token valid until position {} rejected by provider",
                attempt.freshness_token.last_valid_position
            )));
        }
        Ok(())
    }

    async fn build_once(
        &self,
        key: &IdempotencyKey,
        payment: &PaymentRequest,
        attempt_number: u32,
        predecessor: Option<&FreshnessToken>,
    ) -> Result<TransactionAttempt> {
        let token = self.provider.fetch().await?;
        let token_obtained_at = Instant::now();

        if let Some(previous) = predecessor {
            if !token.is_newer_than(previous) {
                return Err(AppError::StaleFreshnessToken(format!(
                    "token position {} is not newer than previous {}",
                    token.last_valid_position, previous.last_valid_position
                )));
            }
        }

        let payload = UnsignedPayload::new(key, payment, &token, attempt_number);
        let bytes = payload.encode()?;
        let signature_bytes = self.signer.sign(&bytes).await?;

        let attempt = TransactionAttempt {
            freshness_token: token,
            token_obtained_at,
            attempt_number,
            signature_bytes,
            payload,
        };
        self.check_fresh(&attempt).await?;
        Ok(attempt)
    }
}
