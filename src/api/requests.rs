use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::responses::ValidationErrorDetail;
use crate::models::{Currency, PaymentRequest};
use crate::submission::{FreshnessToken, SignedSubmission};

/// Query string of the history view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Wire form of a signed submission handed to the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitSubmissionRequest {
    #[validate(length(min = 1, max = 256))]
    pub idempotency_key: String,
    #[validate(length(min = 1, max = 128))]
    pub sender_id: String,
    #[validate(length(min = 1, max = 128))]
    pub recipient_id: String,
    pub amount: Decimal,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub freshness_token: String,
    pub last_valid_position: u64,
    #[validate(range(min = 1))]
    pub attempt_number: u32,
    /// Hex-encoded client-signed payload.
    #[validate(length(min = 2))]
    pub signed_payload: String,
}

impl SubmitSubmissionRequest {
    pub fn from_submission(submission: &SignedSubmission) -> Self {
        Self {
            idempotency_key: submission.idempotency_key.clone(),
            sender_id: submission.payment.sender_id.clone(),
            recipient_id: submission.payment.recipient_id.clone(),
            amount: submission.payment.amount,
            currency: submission.payment.currency.to_string(),
            freshness_token: submission.freshness_token.value.clone(),
            last_valid_position: submission.freshness_token.last_valid_position,
            attempt_number: submission.attempt_number,
            signed_payload: hex::encode(&submission.signed_payload),
        }
    }

    /// Field-level validation plus the conversions the derive cannot express.
    pub fn into_submission(self) -> Result<SignedSubmission, Vec<ValidationErrorDetail>> {
        let mut details = match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => ValidationErrorDetail::from_errors(&errors),
        };

        let currency = match self.currency.parse::<Currency>() {
            Ok(c) => Some(c),
            Err(e) => {
                details.push(ValidationErrorDetail::new("currency", e.to_string()));
                None
            }
        };
        let signed_payload = match hex::decode(&self.signed_payload) {
            Ok(bytes) => Some(bytes),
            Err(_) => {
                details.push(ValidationErrorDetail::new("signed_payload", "must be hex"));
                None
            }
        };
        if self.amount <= Decimal::ZERO {
            details.push(ValidationErrorDetail::new("amount", "amount must be positive"));
        }

        match (currency, signed_payload) {
            (Some(currency), Some(signed_payload)) if details.is_empty() => Ok(SignedSubmission {
                idempotency_key: self.idempotency_key,
                payment: PaymentRequest::new(self.sender_id, self.recipient_id, self.amount, currency),
                freshness_token: FreshnessToken::new(self.freshness_token, self.last_valid_position),
                attempt_number: self.attempt_number,
                signed_payload,
            }),
            _ => Err(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid() -> SubmitSubmissionRequest {
        SubmitSubmissionRequest {
            idempotency_key: "idem_1".to_string(),
            sender_id: "alice".to_string(),
            recipient_id: "bob".to_string(),
            amount: dec!(10),
            currency: "USD".to_string(),
            freshness_token: "tok".to_string(),
            last_valid_position: 5,
            attempt_number: 1,
            signed_payload: "abcd".to_string(),
        }
    }

    #[test]
    fn test_valid_request_converts() {
        let submission = valid().into_submission().unwrap();
        assert_eq!(submission.payment.currency, Currency::USD);
        assert_eq!(submission.signed_payload, vec![0xab, 0xcd]);
    }

    #[test]
    fn test_invalid_fields_are_reported_together() {
        let mut request = valid();
        request.currency = "XYZ".to_string();
        request.signed_payload = "zz".to_string();
        request.attempt_number = 0;

        let details = request.into_submission().unwrap_err();
        let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();
        assert!(fields.contains(&"currency"));
        assert!(fields.contains(&"signed_payload"));
        assert!(fields.contains(&"attempt_number"));
    }
}
