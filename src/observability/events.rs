use std::time::Duration;

use crate::observability::get_metrics;

/// What an event is about: a request before confirmation, or the ledger
/// signature after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject<'a> {
    IdempotencyKey(&'a str),
    Signature(&'a str),
    ContentHash(&'a str),
}

impl<'a> EventSubject<'a> {
    pub fn kind(&self) -> &'static str {
        match self {
            EventSubject::IdempotencyKey(_) => "idempotency_key",
            EventSubject::Signature(_) => "signature",
            EventSubject::ContentHash(_) => "content_hash",
        }
    }

    pub fn value(&self) -> &'a str {
        match self {
            EventSubject::IdempotencyKey(v) | EventSubject::Signature(v) | EventSubject::ContentHash(v) => v,
        }
    }
}

/// Structured record of one state transition or registry/guard hit-miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent<'a> {
    pub component: &'static str,
    pub subject: EventSubject<'a>,
    pub state: &'static str,
    pub attempt_number: u32,
    pub elapsed_ms: u64,
}

impl<'a> PipelineEvent<'a> {
    pub fn new(component: &'static str, subject: EventSubject<'a>, state: &'static str) -> Self {
        Self {
            component,
            subject,
            state,
            attempt_number: 0,
            elapsed_ms: 0,
        }
    }

    pub fn with_attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn emit(&self) {
        match self.subject {
            EventSubject::IdempotencyKey(key) => tracing::info!(
                component = self.component,
                idempotency_key = key,
                state = self.state,
                attempt_number = self.attempt_number,
                elapsed_ms = self.elapsed_ms,
                "pipeline event"
            ),
            EventSubject::Signature(signature) => tracing::info!(
                component = self.component,
                signature = signature,
                state = self.state,
                attempt_number = self.attempt_number,
                elapsed_ms = self.elapsed_ms,
                "pipeline event"
            ),
            EventSubject::ContentHash(hash) => tracing::info!(
                component = self.component,
                content_hash = hash,
                state = self.state,
                attempt_number = self.attempt_number,
                elapsed_ms = self.elapsed_ms,
                "pipeline event"
            ),
        }

        get_metrics().record_pipeline_event(self.component, self.state, self.elapsed_ms as f64);
    }
}
