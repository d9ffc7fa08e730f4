pub mod builder;
pub mod classifier;
pub mod retry;
pub mod state_machine;

pub use builder::{
    BuilderConfig, FreshnessAwareBuilder, FreshnessProvider, FreshnessToken, PayloadSigner, SigningError,
    TransactionAttempt, UnsignedPayload,
};
pub use classifier::{codes, GatewayError, RejectionClass, RejectionClassifier};
pub use retry::{RetryConfig, SettlementGateway, SignedSubmission, SubmissionRetryMachine};
pub use state_machine::{SubmissionState, SubmissionStateMachine};
