use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Error codes shared between the client pipeline and the boundary.
pub mod codes {
    pub const BLOCKHASH_NOT_FOUND: &str = "BLOCKHASH_NOT_FOUND";
    pub const BLOCK_HEIGHT_EXCEEDED: &str = "BLOCK_HEIGHT_EXCEEDED";
    pub const TRANSACTION_EXPIRED: &str = "TRANSACTION_EXPIRED";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";

    pub const DUPLICATE_REJECTED: &str = "DUPLICATE_REJECTED";
    pub const ALREADY_PROCESSED: &str = "ALREADY_PROCESSED";

    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const INSUFFICIENT_FUNDS: &str = "INSUFFICIENT_FUNDS";
    pub const ACCOUNT_NOT_FOUND: &str = "ACCOUNT_NOT_FOUND";
    pub const MALFORMED_PAYLOAD: &str = "MALFORMED_PAYLOAD";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const SIGNING_REJECTED: &str = "SIGNING_REJECTED";
    pub const COSIGNER_UNAVAILABLE: &str = "COSIGNER_UNAVAILABLE";
    pub const DUPLICATE_CHECK_UNAVAILABLE: &str = "DUPLICATE_CHECK_UNAVAILABLE";
}

/// Failure reported by whatever sits between a signed payload and the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// A definite answer from the other side.
    #[error("rejected with {code}: {message}")]
    Rejected { code: String, message: String },

    /// No answer in time. The payload may or may not have been accepted.
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),
}

impl GatewayError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            GatewayError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionClass {
    /// The freshness token lapsed before inclusion; rebuild and resubmit.
    Expired,
    DuplicateRejected,
    Fatal,
    /// Anything unrecognised. Never retried automatically.
    Transient,
}

/// Maps a gateway failure to a class using a closed table of exact codes and
/// exact messages. Anything not in the table is transient.
#[derive(Debug, Clone)]
pub struct RejectionClassifier {
    codes: HashMap<String, RejectionClass>,
    messages: HashMap<String, RejectionClass>,
}

impl Default for RejectionClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RejectionClassifier {
    pub fn empty() -> Self {
        Self {
            codes: HashMap::new(),
            messages: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut classifier = Self::empty();

        for code in [
            codes::BLOCKHASH_NOT_FOUND,
            codes::BLOCK_HEIGHT_EXCEEDED,
            codes::TRANSACTION_EXPIRED,
            codes::TOKEN_EXPIRED,
        ] {
            classifier = classifier.with_code(code, RejectionClass::Expired);
        }

        for code in [codes::DUPLICATE_REJECTED, codes::ALREADY_PROCESSED] {
            classifier = classifier.with_code(code, RejectionClass::DuplicateRejected);
        }

        for code in [
            codes::VALIDATION_FAILED,
            codes::INSUFFICIENT_FUNDS,
            codes::ACCOUNT_NOT_FOUND,
            codes::MALFORMED_PAYLOAD,
            codes::INVALID_SIGNATURE,
            codes::SIGNING_REJECTED,
            codes::COSIGNER_UNAVAILABLE,
            codes::DUPLICATE_CHECK_UNAVAILABLE,
        ] {
            classifier = classifier.with_code(code, RejectionClass::Fatal);
        }

        classifier
            .with_message("blockhash not found", RejectionClass::Expired)
            .with_message("transaction expired: block height exceeded", RejectionClass::Expired)
            .with_message("this transaction has already been processed", RejectionClass::DuplicateRejected)
            .with_message("insufficient funds", RejectionClass::Fatal)
    }

    pub fn with_code(mut self, code: &str, class: RejectionClass) -> Self {
        self.codes.insert(code.trim().to_ascii_uppercase(), class);
        self
    }

    pub fn with_message(mut self, message: &str, class: RejectionClass) -> Self {
        self.messages.insert(message.trim().to_ascii_lowercase(), class);
        self
    }

    pub fn classify(&self, error: &GatewayError) -> RejectionClass {
        match error {
            GatewayError::Timeout | GatewayError::Connection(_) => RejectionClass::Transient,
            GatewayError::Rejected { code, message } => self
                .codes
                .get(&code.trim().to_ascii_uppercase())
                .or_else(|| self.messages.get(&message.trim().to_ascii_lowercase()))
                .copied()
                .unwrap_or(RejectionClass::Transient),
        }
    }
}
