use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::GuardSettings;
use crate::error::AppError;
use crate::idempotency::IdempotencyKey;
use crate::models::{PaymentOutcome, PaymentRequest};
use crate::observability::{get_metrics, EventSubject, PipelineEvent};
use crate::submission::builder::{FreshnessAwareBuilder, FreshnessToken, TransactionAttempt};
use crate::submission::classifier::{GatewayError, RejectionClass, RejectionClassifier};
use crate::submission::state_machine::{SubmissionState, SubmissionStateMachine};

/// What leaves the client for the settlement boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSubmission {
    pub idempotency_key: String,
    pub payment: PaymentRequest,
    pub freshness_token: FreshnessToken,
    pub attempt_number: u32,
    pub signed_payload: Vec<u8>,
}

impl SignedSubmission {
    pub fn from_attempt(key: &IdempotencyKey, payment: &PaymentRequest, attempt: &TransactionAttempt) -> Self {
        Self {
            idempotency_key: key.to_string(),
            payment: payment.normalized(),
            freshness_token: attempt.freshness_token.clone(),
            attempt_number: attempt.attempt_number,
            signed_payload: attempt.signature_bytes.clone(),
        }
    }
}

/// Hands a signed payload to the ledger, directly or through the boundary.
/// Returns the ledger signature on acceptance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn submit(&self, submission: &SignedSubmission) -> std::result::Result<String, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Upper bound on attempts, counting the first one.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl From<&GuardSettings> for RetryConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            max_attempts: settings.max_submit_attempts.max(1),
        }
    }
}

/// Drives one logical payment from first build to a terminal outcome.
///
/// Only an expiry rejection loops back to a rebuild; every other failure is
/// terminal. Unclassified failures are never retried because the first
/// attempt may already have been accepted.
#[derive(Clone)]
pub struct SubmissionRetryMachine {
    builder: FreshnessAwareBuilder,
    gateway: Arc<dyn SettlementGateway>,
    classifier: RejectionClassifier,
    config: RetryConfig,
}

impl SubmissionRetryMachine {
    pub fn new(
        builder: FreshnessAwareBuilder,
        gateway: Arc<dyn SettlementGateway>,
        classifier: RejectionClassifier,
        config: RetryConfig,
    ) -> Self {
        Self {
            builder,
            gateway,
            classifier,
            config,
        }
    }

    pub async fn run(&self, key: &IdempotencyKey, request: &PaymentRequest) -> PaymentOutcome {
        let mut track = Tracker::new(key);
        let mut predecessor: Option<FreshnessToken> = None;
        let mut attempt_number = 1;

        loop {
            track.attempt = attempt_number;

            let attempt = match self
                .builder
                .build_signed(key, request, attempt_number, predecessor.as_ref())
                .await
            {
                Ok(attempt) => attempt,
                Err(e) => return track.not_submitted(e),
            };
            track.advance(SubmissionState::Built);

            let attempt = match self
                .builder
                .refresh_if_stale(key, request, attempt, predecessor.as_ref())
                .await
            {
                Ok((attempt, rebuilt)) => {
                    if rebuilt {
                        track.advance(SubmissionState::Built);
                    }
                    attempt
                }
                Err(e) => return track.not_submitted(e),
            };

            let submission = SignedSubmission::from_attempt(key, request, &attempt);
            track.advance(SubmissionState::Submitting);

            let err = match self.gateway.submit(&submission).await {
                Ok(signature) => {
                    track.advance(SubmissionState::Confirmed);
                    get_metrics().record_submit_attempts(attempt_number);
                    return PaymentOutcome::Confirmed {
                        signature,
                        attempts: attempt_number,
                    };
                }
                Err(err) => err,
            };

            let class = self.classifier.classify(&err);
            tracing::info!(
                idempotency_key = %key,
                attempt_number,
                class = ?class,
                "Submission failed: {}", err
            );

            match class {
                RejectionClass::Expired => {
                    track.advance(SubmissionState::Expired);
                    if attempt_number >= self.config.max_attempts {
                        track.advance(SubmissionState::FatalFailure);
                        get_metrics().record_submit_attempts(attempt_number);
                        return PaymentOutcome::FatalFailure {
                            reason: format!(
                                "freshness token expired on all {} attempts",
                                attempt_number
                            ),
                        };
                    }
                    predecessor = Some(attempt.freshness_token);
                    attempt_number += 1;
                }
                RejectionClass::DuplicateRejected => {
                    track.advance(SubmissionState::DuplicateRejected);
                    get_metrics().record_submit_attempts(attempt_number);
                    return PaymentOutcome::DuplicateRejected {
                        reason: err.to_string(),
                    };
                }
                RejectionClass::Fatal => {
                    track.advance(SubmissionState::FatalFailure);
                    get_metrics().record_submit_attempts(attempt_number);
                    return PaymentOutcome::FatalFailure {
                        reason: err.to_string(),
                    };
                }
                RejectionClass::Transient => {
                    track.advance(SubmissionState::TransientFailure);
                    get_metrics().record_submit_attempts(attempt_number);
                    return PaymentOutcome::TransientFailure {
                        reason: err.to_string(),
                    };
                }
            }
        }
    }
}

/// Current state plus the event emitted on every transition.
struct Tracker<'a> {
    key: &'a IdempotencyKey,
    state: SubmissionState,
    started: Instant,
    attempt: u32,
}

impl<'a> Tracker<'a> {
    fn new(key: &'a IdempotencyKey) -> Self {
        Self {
            key,
            state: SubmissionState::Pending,
            started: Instant::now(),
            attempt: 1,
        }
    }

    fn advance(&mut self, to: SubmissionState) {
        match SubmissionStateMachine::transition(self.state, to) {
            Ok(next) => self.state = next,
            Err(e) => {
                tracing::error!(idempotency_key = %self.key, "{}", e);
                self.state = to;
            }
        }

        PipelineEvent::new("retry_machine", EventSubject::IdempotencyKey(self.key.as_str()), to.as_str())
            .with_attempt(self.attempt)
            .with_elapsed(self.started.elapsed())
            .emit();
    }

    /// A failure before handoff: nothing reached the ledger, so the outcome is
    /// known and final.
    fn not_submitted(&mut self, err: AppError) -> PaymentOutcome {
        tracing::warn!(
            idempotency_key = %self.key,
            attempt_number = self.attempt,
            code = err.code(),
            "Attempt abandoned before submission: {}", err
        );
        self.advance(SubmissionState::FatalFailure);
        PaymentOutcome::FatalFailure {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::IdempotencyKeyGenerator;
    use crate::models::Currency;
    use crate::submission::builder::{BuilderConfig, MockFreshnessProvider, MockPayloadSigner};
    use crate::submission::classifier::codes;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn payment() -> PaymentRequest {
        PaymentRequest::new("A", "B", dec!(25), Currency::USD)
    }

    fn key() -> IdempotencyKey {
        IdempotencyKeyGenerator::with_default_config()
            .derive_at(&payment(), Utc::now())
            .current
    }

    fn builder() -> FreshnessAwareBuilder {
        let position = Arc::new(AtomicU64::new(1));
        let mut provider = MockFreshnessProvider::new();
        provider.expect_fetch().returning(move || {
            let p = position.fetch_add(1, Ordering::SeqCst);
            Ok(FreshnessToken::new(format!("tok-{}", p), p))
        });
        provider.expect_is_valid().returning(|_| Ok(true));

        let mut signer = MockPayloadSigner::new();
        signer.expect_sign().returning(|bytes| Ok(bytes.to_vec()));

        FreshnessAwareBuilder::new(Arc::new(provider), Arc::new(signer), BuilderConfig::default())
    }

    fn machine(gateway: MockSettlementGateway) -> SubmissionRetryMachine {
        SubmissionRetryMachine::new(
            builder(),
            Arc::new(gateway),
            RejectionClassifier::with_defaults(),
            RetryConfig { max_attempts: 3 },
        )
    }

    #[tokio::test]
    async fn test_expired_then_confirmed_uses_newer_token() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut gateway = MockSettlementGateway::new();
        gateway.expect_submit().times(2).returning(move |s| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GatewayError::rejected(codes::BLOCKHASH_NOT_FOUND, "expired"));
            }
            assert_eq!(s.attempt_number, 2);
            Ok(format!("sig-{}", s.attempt_number))
        });

        let outcome = machine(gateway).run(&key(), &payment()).await;

        assert_eq!(
            outcome,
            PaymentOutcome::Confirmed {
                signature: "sig-2".to_string(),
                attempts: 2
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_is_terminal_transient() {
        let mut gateway = MockSettlementGateway::new();
        gateway
            .expect_submit()
            .times(1)
            .returning(|_| Err(GatewayError::Timeout));

        let outcome = machine(gateway).run(&key(), &payment()).await;
        assert!(matches!(outcome, PaymentOutcome::TransientFailure { .. }));
    }

    #[tokio::test]
    async fn test_expiry_budget_exhausted_is_fatal() {
        let mut gateway = MockSettlementGateway::new();
        gateway
            .expect_submit()
            .times(3)
            .returning(|_| Err(GatewayError::rejected(codes::TRANSACTION_EXPIRED, "expired")));

        let outcome = machine(gateway).run(&key(), &payment()).await;
        assert!(matches!(outcome, PaymentOutcome::FatalFailure { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_rejection_is_not_retried() {
        let mut gateway = MockSettlementGateway::new();
        gateway
            .expect_submit()
            .times(1)
            .returning(|_| Err(GatewayError::rejected(codes::DUPLICATE_REJECTED, "seen")));

        let outcome = machine(gateway).run(&key(), &payment()).await;
        assert!(matches!(outcome, PaymentOutcome::DuplicateRejected { .. }));
    }

    #[tokio::test]
    async fn test_build_failure_never_submits() {
        let mut provider = MockFreshnessProvider::new();
        provider
            .expect_fetch()
            .returning(|| Err(AppError::Build("provider offline".to_string())));
        let mut signer = MockPayloadSigner::new();
        signer.expect_sign().never();

        let mut gateway = MockSettlementGateway::new();
        gateway.expect_submit().never();

        let machine = SubmissionRetryMachine::new(
            FreshnessAwareBuilder::new(Arc::new(provider), Arc::new(signer), BuilderConfig::default()),
            Arc::new(gateway),
            RejectionClassifier::with_defaults(),
            RetryConfig::default(),
        );

        let outcome = machine.run(&key(), &payment()).await;
        assert!(matches!(outcome, PaymentOutcome::FatalFailure { .. }));
    }
}
