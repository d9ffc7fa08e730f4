use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use crate::models::{SubmissionRecord, SubmissionStatus};

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn from_errors(errors: &ValidationErrors) -> Vec<Self> {
        errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed {} check", e.code));
                    Self::new(field.to_string(), message)
                })
            })
            .collect()
    }
}

/// Accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub signature: String,
    pub idempotency_key: String,
    pub attempt_number: u32,
    /// False when the record is left to reconciliation.
    pub persisted: bool,
}

/// Durable record as shown in the status view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecordResponse {
    pub signature: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<SubmissionRecord> for SubmissionRecordResponse {
    fn from(record: SubmissionRecord) -> Self {
        Self {
            signature: record.signature,
            sender_id: record.sender_id,
            recipient_id: record.recipient_id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            created_at: record.created_at,
        }
    }
}
