pub mod payment_service;
pub mod reconciliation;
pub mod resolver;

pub use payment_service::{PaymentReceipt, PaymentService};
pub use reconciliation::{
    ConfirmationSource, ConfirmedSubmission, HttpConfirmationSource, ReconciliationJob, ReconciliationReport,
};
pub use resolver::{PersistOutcome, PostCommitResolver};
