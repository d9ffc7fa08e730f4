use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GuardSettings;
use crate::error::{AppError, Result};
use crate::idempotency::{ActionGuard, InFlightRegistry, Registration, RegistrySweepJob};
use crate::models::{PaymentOutcome, PaymentRequest, SubmissionAttributes, SubmissionStatus};
use crate::observability::{get_metrics, mask_id};
use crate::services::resolver::PostCommitResolver;
use crate::submission::{
    BuilderConfig, FreshnessAwareBuilder, FreshnessProvider, PayloadSigner, RejectionClassifier, RetryConfig,
    SettlementGateway, SubmissionRetryMachine,
};

/// What the caller of [`PaymentService::submit_payment`] gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub idempotency_key: String,
    pub outcome: PaymentOutcome,
    /// Informational: this caller collapsed onto someone else's attempt.
    pub already_in_flight: bool,
}

impl PaymentReceipt {
    pub fn user_message(&self) -> String {
        self.outcome.user_message()
    }
}

/// Client-side pipeline: action guard, in-flight registry, retry machine,
/// post-commit persistence.
#[derive(Clone)]
pub struct PaymentService {
    action_guard: ActionGuard,
    registry: InFlightRegistry,
    machine: SubmissionRetryMachine,
    resolver: PostCommitResolver,
}

impl PaymentService {
    pub fn new(
        action_guard: ActionGuard,
        registry: InFlightRegistry,
        machine: SubmissionRetryMachine,
        resolver: PostCommitResolver,
    ) -> Self {
        Self {
            action_guard,
            registry,
            machine,
            resolver,
        }
    }

    /// Wires the whole client pipeline from one settings section.
    pub fn from_settings(
        settings: &GuardSettings,
        provider: Arc<dyn FreshnessProvider>,
        signer: Arc<dyn PayloadSigner>,
        gateway: Arc<dyn SettlementGateway>,
        resolver: PostCommitResolver,
    ) -> Self {
        let builder = FreshnessAwareBuilder::new(provider, signer, BuilderConfig::from(settings));
        let machine = SubmissionRetryMachine::new(
            builder,
            gateway,
            RejectionClassifier::with_defaults(),
            RetryConfig::from(settings),
        );
        Self::new(
            ActionGuard::from_settings(settings),
            InFlightRegistry::from_settings(settings),
            machine,
            resolver,
        )
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    pub fn action_guard(&self) -> &ActionGuard {
        &self.action_guard
    }

    /// Starts the periodic sweep of expired registry entries and idle actions.
    pub fn spawn_registry_sweep(&self, interval_seconds: u64) -> tokio::task::JoinHandle<()> {
        RegistrySweepJob::new(self.registry.clone(), interval_seconds)
            .with_action_guard(self.action_guard.clone())
            .start()
    }

    pub async fn submit_payment(&self, action_id: &str, request: PaymentRequest) -> Result<PaymentReceipt> {
        request.validate()?;

        let _permit = self
            .action_guard
            .permit(action_id)
            .ok_or_else(|| AppError::ActionThrottled(action_id.to_string()))?;

        let receipt = match self.registry.check_and_register(&request) {
            Registration::InFlight(handle) => {
                let idempotency_key = handle.key().to_string();
                tracing::info!(
                    idempotency_key = %idempotency_key,
                    "Identical payment already in flight, waiting for its outcome"
                );
                PaymentReceipt {
                    outcome: handle.wait().await,
                    idempotency_key,
                    already_in_flight: true,
                }
            }
            Registration::Owner(guard) => {
                let key = guard.key().clone();
                let outcome = self.machine.run(&key, &request).await;

                if let PaymentOutcome::Confirmed { signature, .. } = &outcome {
                    let attributes = SubmissionAttributes::from_payment(&request, SubmissionStatus::Confirmed);
                    if let Err(e) = self.resolver.persist(signature, attributes).await {
                        tracing::error!(
                            idempotency_key = %key,
                            signature = %mask_id(signature),
                            "Confirmed payment not persisted, leaving it to reconciliation: {}", e
                        );
                    }
                }

                if let Err(e) = guard.resolve(outcome.clone()) {
                    tracing::error!(idempotency_key = %key, "Failed to resolve in-flight entry: {}", e);
                }

                PaymentReceipt {
                    idempotency_key: key.to_string(),
                    outcome,
                    already_in_flight: false,
                }
            }
        };

        get_metrics().record_payment_outcome(receipt.outcome.label(), receipt.already_in_flight);
        get_metrics().set_in_flight_entries(self.registry.len());
        Ok(receipt)
    }
}
