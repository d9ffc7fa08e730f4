use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::PaymentRequest;

/// Which code path created the durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// Written optimistically right after the settlement layer confirmed.
    Confirmed,
    /// Written by a reconciliation sweep.
    Reconciled,
}

/// Business attributes persisted alongside a confirmed signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAttributes {
    pub sender_id: String,
    pub recipient_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: SubmissionStatus,
}

impl SubmissionAttributes {
    pub fn from_payment(payment: &PaymentRequest, status: SubmissionStatus) -> Self {
        let normalized = payment.normalized();
        Self {
            sender_id: normalized.sender_id,
            recipient_id: normalized.recipient_id,
            amount: normalized.amount,
            currency: normalized.currency.to_string(),
            status,
        }
    }
}

/// Durable ledger record; unique by `signature`, never by business fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubmissionRecord {
    pub signature: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new(signature: impl Into<String>, attributes: SubmissionAttributes) -> Self {
        Self {
            signature: signature.into(),
            sender_id: attributes.sender_id,
            recipient_id: attributes.recipient_id,
            amount: attributes.amount,
            currency: attributes.currency,
            status: attributes.status,
            created_at: Utc::now(),
        }
    }
}
