use async_trait::async_trait;
use std::sync::Arc;

use crate::boundary::duplicate_guard::{GuardDecision, RemoteDuplicateGuard};
use crate::boundary::forwarder::Forwarder;
use crate::observability::{EventSubject, PipelineEvent};
use crate::submission::{
    codes, GatewayError, PayloadSigner, RejectionClass, RejectionClassifier, SettlementGateway, SignedSubmission,
    SigningError,
};

/// Server-side co-signing boundary: validate, screen for duplicates,
/// co-sign, forward.
///
/// The duplicate reservation is released only when the payload was
/// definitely not forwarded: a signing failure, or a ledger rejection that
/// classifies as expired or fatal. Any other outcome keeps it until its TTL
/// runs out.
pub struct CosigningBoundary {
    guard: RemoteDuplicateGuard,
    cosigner: Arc<dyn PayloadSigner>,
    forwarder: Arc<dyn Forwarder>,
    classifier: RejectionClassifier,
}

impl CosigningBoundary {
    pub fn new(guard: RemoteDuplicateGuard, cosigner: Arc<dyn PayloadSigner>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            guard,
            cosigner,
            forwarder,
            classifier: RejectionClassifier::with_defaults(),
        }
    }

    pub fn with_classifier(mut self, classifier: RejectionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn handle(&self, submission: &SignedSubmission) -> Result<String, GatewayError> {
        if let Err(e) = submission.payment.validate() {
            return Err(GatewayError::rejected(codes::VALIDATION_FAILED, e.to_string()));
        }
        if submission.signed_payload.is_empty() {
            return Err(GatewayError::rejected(codes::MALFORMED_PAYLOAD, "signed payload is empty"));
        }

        let reservation = match self.guard.screen(&submission.payment).await {
            Ok(GuardDecision::Forward(reservation)) => reservation,
            Ok(GuardDecision::Duplicate { content_hash }) => {
                return Err(GatewayError::rejected(
                    codes::DUPLICATE_REJECTED,
                    format!(
                        "identical payment seen recently ({})",
                        content_hash.get(..12).unwrap_or(&content_hash)
                    ),
                ));
            }
            Err(e) => {
                return Err(GatewayError::rejected(codes::DUPLICATE_CHECK_UNAVAILABLE, e.to_string()));
            }
        };

        let cosigned = match self.cosigner.sign(&submission.signed_payload).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.guard.release(&reservation).await;
                return Err(match e {
                    SigningError::Rejected(msg) => GatewayError::rejected(codes::SIGNING_REJECTED, msg),
                    SigningError::Unavailable(msg) => GatewayError::rejected(codes::COSIGNER_UNAVAILABLE, msg),
                });
            }
        };

        match self.forwarder.forward(&cosigned, submission).await {
            Ok(signature) => {
                PipelineEvent::new("boundary", EventSubject::Signature(&signature), "forwarded")
                    .with_attempt(submission.attempt_number)
                    .emit();
                Ok(signature)
            }
            Err(err) => match self.classifier.classify(&err) {
                RejectionClass::Expired | RejectionClass::Fatal => {
                    self.guard.release(&reservation).await;
                    Err(err)
                }
                class => {
                    tracing::warn!(
                        idempotency_key = %submission.idempotency_key,
                        content_hash = %reservation.content_hash,
                        class = ?class,
                        "Forward not definitely refused, keeping duplicate window: {}", err
                    );
                    Err(err)
                }
            },
        }
    }
}

#[async_trait]
impl SettlementGateway for CosigningBoundary {
    async fn submit(&self, submission: &SignedSubmission) -> Result<String, GatewayError> {
        self.handle(submission).await
    }
}
