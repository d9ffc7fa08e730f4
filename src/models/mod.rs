pub mod currency;
pub mod payment;
pub mod submission_record;

pub use currency::{Currency, CurrencyParseError};
pub use payment::{PaymentOutcome, PaymentRequest};
pub use submission_record::{SubmissionAttributes, SubmissionRecord, SubmissionStatus};
