use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::api::requests::SubmitSubmissionRequest;
use crate::api::responses::{ApiResponse, SubmissionResponse};
use crate::error::Result;
use crate::submission::{GatewayError, SettlementGateway, SignedSubmission};

/// Client-side gateway that reaches a remote boundary over HTTP.
pub struct HttpSettlementGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSettlementGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    async fn submit(&self, submission: &SignedSubmission) -> std::result::Result<String, GatewayError> {
        let url = format!("{}/v1/submissions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SubmitSubmissionRequest::from_submission(submission))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: ApiResponse<SubmissionResponse> = response.json().await?;
            return body
                .data
                .map(|data| data.signature)
                .ok_or_else(|| GatewayError::Connection("boundary accepted without a signature".to_string()));
        }

        // The boundary could not learn the forward outcome; neither can we.
        if status == StatusCode::GATEWAY_TIMEOUT {
            return Err(GatewayError::Timeout);
        }

        match response.json::<ApiResponse<()>>().await {
            Ok(ApiResponse { error: Some(error), .. }) => Err(GatewayError::rejected(error.code, error.message)),
            _ => Err(GatewayError::Connection(format!("boundary returned {}", status))),
        }
    }
}
