use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::models::{SubmissionAttributes, SubmissionRecord};
use crate::observability::{get_metrics, EventSubject, LatencyTimer, PipelineEvent};
use crate::repositories::SubmissionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub record: SubmissionRecord,
    /// True only for the single caller whose write created the record.
    pub created: bool,
}

type SharedResult = Option<std::result::Result<SubmissionRecord, String>>;

enum Role {
    Leader,
    Follower(watch::Receiver<SharedResult>),
}

/// Persists confirmed submissions keyed by ledger signature.
///
/// Concurrent calls for one signature collapse onto a single write; the
/// rest observe its result.
#[derive(Clone)]
pub struct PostCommitResolver {
    store: Arc<dyn SubmissionStore>,
    in_progress: Arc<Mutex<HashMap<String, watch::Sender<SharedResult>>>>,
}

impl PostCommitResolver {
    pub fn new(store: Arc<dyn SubmissionStore>) -> Self {
        Self {
            store,
            in_progress: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn find(&self, signature: &str) -> Result<Option<SubmissionRecord>> {
        self.store.find_by_signature(signature).await
    }

    /// Newest first; backs the payment history a user checks after an
    /// ambiguous failure.
    pub async fn history(&self, sender_id: &str, limit: i64) -> Result<Vec<SubmissionRecord>> {
        self.store.list_by_sender(sender_id, limit.clamp(1, 100)).await
    }

    pub async fn persist(&self, signature: &str, attributes: SubmissionAttributes) -> Result<PersistOutcome> {
        loop {
            match self.join_or_lead(signature) {
                Role::Leader => {
                    let flight = Flight {
                        resolver: self,
                        signature,
                        finished: false,
                    };
                    let result = self.write(signature, &attributes).await;
                    flight.finish(&result);
                    return result;
                }
                Role::Follower(mut rx) => {
                    let shared = match rx.wait_for(|slot| slot.is_some()).await {
                        Ok(slot) => slot.clone(),
                        // Leader was cancelled before finishing; take over.
                        Err(_) => continue,
                    };

                    PipelineEvent::new("resolver", EventSubject::Signature(signature), "joined").emit();
                    return match shared {
                        Some(Ok(record)) => Ok(PersistOutcome { record, created: false }),
                        Some(Err(msg)) => Err(AppError::StoreUnavailable(msg)),
                        None => Err(AppError::Internal(anyhow::anyhow!("empty persist slot for {}", signature))),
                    };
                }
            }
        }
    }

    fn join_or_lead(&self, signature: &str) -> Role {
        let mut in_progress = self.lock();
        if let Some(tx) = in_progress.get(signature) {
            return Role::Follower(tx.subscribe());
        }
        let (tx, _) = watch::channel(None);
        in_progress.insert(signature.to_string(), tx);
        Role::Leader
    }

    async fn write(&self, signature: &str, attributes: &SubmissionAttributes) -> Result<PersistOutcome> {
        let timer = LatencyTimer::new();

        if let Some(record) = self.store.find_by_signature(signature).await? {
            get_metrics().record_persist(false, timer.elapsed_ms());
            PipelineEvent::new("resolver", EventSubject::Signature(signature), "existing").emit();
            return Ok(PersistOutcome { record, created: false });
        }

        let candidate = SubmissionRecord::new(signature, attributes.clone());
        let (record, created) = self.store.create_if_absent(&candidate).await?;

        get_metrics().record_persist(created, timer.elapsed_ms());
        let state = if created { "created" } else { "existing" };
        PipelineEvent::new("resolver", EventSubject::Signature(signature), state).emit();
        Ok(PersistOutcome { record, created })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<SharedResult>>> {
        self.in_progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Leader-side bookkeeping. Dropping it unfinished clears the slot so a
/// follower can take over.
struct Flight<'a> {
    resolver: &'a PostCommitResolver,
    signature: &'a str,
    finished: bool,
}

impl Flight<'_> {
    fn finish(mut self, result: &Result<PersistOutcome>) {
        self.finished = true;
        let shared = match result {
            Ok(outcome) => Ok(outcome.record.clone()),
            Err(e) => Err(e.to_string()),
        };
        if let Some(tx) = self.resolver.lock().remove(self.signature) {
            tx.send_replace(Some(shared));
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.resolver.lock().remove(self.signature);
        }
    }
}
