use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::GuardSettings;
use crate::error::{AppError, Result};
use crate::models::PaymentRequest;
use crate::observability::{get_metrics, EventSubject, LatencyTimer, PipelineEvent};

/// Shared store behind the boundary's duplicate check.
#[async_trait]
pub trait DuplicateStore: Send + Sync {
    /// Sets `key` to `owner` with a TTL only if it is absent. Returns true
    /// when this call created the key.
    async fn set_if_absent(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only while it still holds `owner`.
    async fn release(&self, key: &str, owner: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct DuplicateGuardConfig {
    /// How long a content hash counts as "seen recently".
    pub window: Duration,
    /// Hard cap on the store round trip.
    pub check_timeout: Duration,
}

impl Default for DuplicateGuardConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            check_timeout: Duration::from_millis(1_500),
        }
    }
}

impl From<&GuardSettings> for DuplicateGuardConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            window: Duration::from_secs(settings.duplicate_window_secs.max(1)),
            check_timeout: Duration::from_millis(settings.duplicate_check_timeout_ms.max(1)),
        }
    }
}

/// Hash over the transfer's semantic content only. Freshness token, attempt
/// number and signatures are excluded so every rebuild of one payment
/// collides with its predecessors.
pub fn content_hash(payment: &PaymentRequest) -> String {
    let normalized = payment.normalized();
    let mut hasher = Sha256::new();
    hasher.update(b"snd:");
    hasher.update(normalized.sender_id.as_bytes());
    hasher.update(b"|rcp:");
    hasher.update(normalized.recipient_id.as_bytes());
    hasher.update(b"|amt:");
    hasher.update(normalized.amount.to_string().as_bytes());
    hasher.update(b"|cur:");
    hasher.update(normalized.currency.code().as_bytes());
    hex::encode(hasher.finalize())
}

/// Proof that this request claimed the content hash. Hand it back through
/// [`RemoteDuplicateGuard::release`] if the payload is definitely not
/// forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardReservation {
    pub content_hash: String,
    pub owner_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Forward(GuardReservation),
    Duplicate { content_hash: String },
}

/// Boundary-side backstop: rejects a second payload with the same content
/// inside the window. Any failure to get an answer in time is a rejection.
#[derive(Clone)]
pub struct RemoteDuplicateGuard {
    store: Arc<dyn DuplicateStore>,
    config: DuplicateGuardConfig,
}

impl RemoteDuplicateGuard {
    pub fn new(store: Arc<dyn DuplicateStore>, config: DuplicateGuardConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DuplicateGuardConfig {
        &self.config
    }

    pub async fn screen(&self, payment: &PaymentRequest) -> Result<GuardDecision> {
        let hash = content_hash(payment);
        let owner_token = Uuid::new_v4().to_string();
        let timer = LatencyTimer::new();

        let checked = tokio::time::timeout(
            self.config.check_timeout,
            self.store.set_if_absent(&hash, &owner_token, self.config.window),
        )
        .await;

        let (state, result) = match checked {
            Err(_) => (
                "timeout",
                Err(AppError::DuplicateCheckUnavailable(format!(
                    "duplicate check exceeded {}ms",
                    self.config.check_timeout.as_millis()
                ))),
            ),
            Ok(Err(e)) => (
                "error",
                Err(AppError::DuplicateCheckUnavailable(format!(
                    "duplicate store failed: {}",
                    e
                ))),
            ),
            Ok(Ok(true)) => (
                "miss",
                Ok(GuardDecision::Forward(GuardReservation {
                    content_hash: hash.clone(),
                    owner_token,
                })),
            ),
            Ok(Ok(false)) => (
                "hit",
                Ok(GuardDecision::Duplicate {
                    content_hash: hash.clone(),
                }),
            ),
        };

        get_metrics().record_duplicate_check(state, timer.elapsed_ms());
        PipelineEvent::new("duplicate_guard", EventSubject::ContentHash(&hash), state).emit();
        if let Err(e) = &result {
            tracing::warn!(content_hash = %hash, "Failing closed: {}", e);
        }
        result
    }

    /// Frees the window early after a definite non-forward. Failure here only
    /// means the window runs out by TTL.
    pub async fn release(&self, reservation: &GuardReservation) {
        let released = tokio::time::timeout(
            self.config.check_timeout,
            self.store
                .release(&reservation.content_hash, &reservation.owner_token),
        )
        .await;

        match released {
            Ok(Ok(true)) => {
                PipelineEvent::new(
                    "duplicate_guard",
                    EventSubject::ContentHash(&reservation.content_hash),
                    "released",
                )
                .emit();
            }
            Ok(Ok(false)) => {
                tracing::debug!(content_hash = %reservation.content_hash, "Reservation already gone");
            }
            Ok(Err(e)) => {
                tracing::warn!(content_hash = %reservation.content_hash, "Failed to release reservation: {}", e);
            }
            Err(_) => {
                tracing::warn!(content_hash = %reservation.content_hash, "Timed out releasing reservation");
            }
        }
    }
}
