use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Currency;

/// A user-initiated payment, as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub sender_id: String,
    pub recipient_id: String,
    pub amount: Decimal,
    pub currency: Currency,
}

impl PaymentRequest {
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            amount,
            currency,
        }
    }

    /// Amount rounded to the currency's minor units with a fixed scale.
    pub fn normalized_amount(&self) -> Decimal {
        self.currency.normalize_amount(self.amount)
    }

    /// Copy of the request with its amount normalised and ids trimmed.
    pub fn normalized(&self) -> PaymentRequest {
        PaymentRequest {
            sender_id: self.sender_id.trim().to_string(),
            recipient_id: self.recipient_id.trim().to_string(),
            amount: self.normalized_amount(),
            currency: self.currency,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sender_id.trim().is_empty() {
            return Err(AppError::Validation("sender_id cannot be empty".to_string()));
        }
        if self.recipient_id.trim().is_empty() {
            return Err(AppError::Validation("recipient_id cannot be empty".to_string()));
        }
        if self.sender_id.trim() == self.recipient_id.trim() {
            return Err(AppError::Validation(
                "sender and recipient must differ".to_string(),
            ));
        }
        if self.normalized_amount() <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        Ok(())
    }
}

/// Terminal result of one logical payment, shared by every caller that
/// collapsed onto the same idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Confirmed { signature: String, attempts: u32 },
    DuplicateRejected { reason: String },
    /// Outcome unknown: the counter-party may already have accepted it.
    TransientFailure { reason: String },
    FatalFailure { reason: String },
}

impl PaymentOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, PaymentOutcome::Confirmed { .. })
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            PaymentOutcome::Confirmed { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Confirmed { .. } => "confirmed",
            PaymentOutcome::DuplicateRejected { .. } => "duplicate_rejected",
            PaymentOutcome::TransientFailure { .. } => "transient_failure",
            PaymentOutcome::FatalFailure { .. } => "fatal_failure",
        }
    }

    /// Text shown to the user. An ambiguous failure never invites an
    /// immediate retry; it points at the reconciled status view instead.
    pub fn user_message(&self) -> String {
        match self {
            PaymentOutcome::Confirmed { .. } => "Payment sent.".to_string(),
            PaymentOutcome::DuplicateRejected { .. } => {
                "This payment was already submitted.".to_string()
            }
            PaymentOutcome::TransientFailure { .. } => {
                "This payment may have already completed. Check its status in your payment history before trying again.".to_string()
            }
            PaymentOutcome::FatalFailure { reason } => format!("Payment failed: {}", reason),
        }
    }
}
