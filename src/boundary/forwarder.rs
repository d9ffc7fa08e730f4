use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SettlementSettings;
use crate::error::Result;
use crate::submission::{GatewayError, SignedSubmission};

/// Last hop from the boundary to the settlement layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, cosigned: &[u8], submission: &SignedSubmission) -> std::result::Result<String, GatewayError>;
}

#[derive(Debug, Serialize)]
struct LedgerSubmission<'a> {
    idempotency_key: &'a str,
    attempt_number: u32,
    freshness_token: &'a str,
    last_valid_position: u64,
    payload: String,
}

#[derive(Debug, Default, Deserialize)]
struct LedgerReply {
    signature: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// Posts co-signed payloads to the settlement layer over HTTP.
pub struct HttpForwarder {
    client: reqwest::Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(settings: &SettlementSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: settings.forward_url.clone(),
        })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, cosigned: &[u8], submission: &SignedSubmission) -> std::result::Result<String, GatewayError> {
        let body = LedgerSubmission {
            idempotency_key: &submission.idempotency_key,
            attempt_number: submission.attempt_number,
            freshness_token: &submission.freshness_token.value,
            last_valid_position: submission.freshness_token.last_valid_position,
            payload: hex::encode(cosigned),
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let reply: LedgerReply = response.json().await.unwrap_or_default();

        if status.is_success() {
            return reply.signature.ok_or_else(|| {
                GatewayError::Connection("settlement layer accepted without a signature".to_string())
            });
        }

        match reply.code {
            Some(code) => Err(GatewayError::rejected(code, reply.message.unwrap_or_default())),
            // No definite answer: treat as ambiguous.
            None => Err(GatewayError::Connection(format!("settlement layer returned {}", status))),
        }
    }
}
