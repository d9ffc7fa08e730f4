use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SettlementSettings;
use crate::error::Result;
use crate::models::{PaymentRequest, SubmissionAttributes, SubmissionStatus};
use crate::observability::mask_id;
use crate::services::resolver::PostCommitResolver;

/// A submission the settlement layer reports as confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedSubmission {
    pub signature: String,
    pub payment: PaymentRequest,
    pub confirmed_at: DateTime<Utc>,
}

/// Authoritative listing of confirmed submissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    async fn confirmed_since(&self, since: DateTime<Utc>) -> Result<Vec<ConfirmedSubmission>>;
}

/// Reads confirmations from the settlement layer over HTTP.
pub struct HttpConfirmationSource {
    client: reqwest::Client,
    url: String,
}

impl HttpConfirmationSource {
    pub fn new(settings: &SettlementSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: settings.confirmations_url.clone(),
        })
    }
}

#[async_trait]
impl ConfirmationSource for HttpConfirmationSource {
    async fn confirmed_since(&self, since: DateTime<Utc>) -> Result<Vec<ConfirmedSubmission>> {
        let confirmed = self
            .client
            .get(&self.url)
            .query(&[("since", since.to_rfc3339())])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ConfirmedSubmission>>()
            .await?;
        Ok(confirmed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub scanned: usize,
    pub created: usize,
    pub failed: usize,
}

/// Background job that persists confirmations the optimistic path missed.
pub struct ReconciliationJob {
    source: Arc<dyn ConfirmationSource>,
    resolver: PostCommitResolver,
    interval_seconds: u64,
    lookback: Duration,
}

impl ReconciliationJob {
    pub fn new(source: Arc<dyn ConfirmationSource>, resolver: PostCommitResolver, interval_seconds: u64) -> Self {
        let interval_seconds = interval_seconds.max(1);
        Self {
            source,
            resolver,
            interval_seconds,
            // Overlapping windows; the resolver makes repeats harmless.
            lookback: Duration::seconds(interval_seconds as i64 * 2),
        }
    }

    pub async fn run_once(&self) -> Result<ReconciliationReport> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ReconciliationReport> {
        let confirmed = self.source.confirmed_since(now - self.lookback).await?;
        let mut report = ReconciliationReport {
            scanned: confirmed.len(),
            ..Default::default()
        };

        for item in confirmed {
            let attributes = SubmissionAttributes::from_payment(&item.payment, SubmissionStatus::Reconciled);
            match self.resolver.persist(&item.signature, attributes).await {
                Ok(outcome) if outcome.created => report.created += 1,
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(signature = %mask_id(&item.signature), "Reconciliation persist failed: {}", e);
                }
            }
        }

        Ok(report)
    }

    /// Starts the sweep in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.interval_seconds));

            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report.created > 0 || report.failed > 0 => {
                        tracing::info!(
                            scanned = report.scanned,
                            created = report.created,
                            failed = report.failed,
                            "Reconciliation sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Reconciliation sweep error: {}", e),
                }
            }
        })
    }
}
