use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::GuardSettings;
use crate::error::{AppError, Result};
use crate::idempotency::action_guard::ActionGuard;
use crate::idempotency::key_generator::{
    DerivedKeys, IdempotencyKey, IdempotencyKeyGenerator, KeyGeneratorConfig,
};
use crate::models::{PaymentOutcome, PaymentRequest};
use crate::observability::{EventSubject, PipelineEvent};

/// Result slot of an in-flight entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSlot {
    Empty,
    Succeeded(PaymentOutcome),
    Failed(PaymentOutcome),
}

impl ResultSlot {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultSlot::Empty)
    }

    pub fn outcome(&self) -> Option<&PaymentOutcome> {
        match self {
            ResultSlot::Empty => None,
            ResultSlot::Succeeded(o) | ResultSlot::Failed(o) => Some(o),
        }
    }
}

/// Point-in-time view of an entry.
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    pub key: IdempotencyKey,
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub result: ResultSlot,
}

struct Entry {
    owner: Uuid,
    content_key: IdempotencyKey,
    created_at: DateTime<Utc>,
    /// None while pending; set to the cooldown end once failed.
    expires_at: Option<DateTime<Utc>>,
    slot: watch::Sender<ResultSlot>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Counters for registry activity.
#[derive(Debug, Default)]
pub struct RegistryStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub abandoned: AtomicU64,
    pub swept: AtomicU64,
}

impl RegistryStats {
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub swept: u64,
}

impl RegistryStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Configuration for the in-flight registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub keys: KeyGeneratorConfig,
    pub cooldown: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            keys: KeyGeneratorConfig::default(),
            cooldown: Duration::seconds(60),
        }
    }
}

impl From<&GuardSettings> for RegistryConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            keys: KeyGeneratorConfig::from(settings),
            cooldown: Duration::seconds(settings.cooldown_secs),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<IdempotencyKey, Entry>,
    /// Content key -> bucket key of a failed entry still in its cooldown.
    cooling: HashMap<IdempotencyKey, IdempotencyKey>,
}

impl RegistryState {
    fn remove(&mut self, key: &IdempotencyKey) {
        if let Some(entry) = self.entries.remove(key) {
            if self.cooling.get(&entry.content_key) == Some(key) {
                self.cooling.remove(&entry.content_key);
            }
        }
    }
}

struct RegistryInner {
    generator: IdempotencyKeyGenerator,
    cooldown: Duration,
    state: Mutex<RegistryState>,
    stats: RegistryStats,
}

/// Process-local map from idempotency key to the single owning attempt.
///
/// Lookup and insertion happen under one lock with no await point between
/// them, so two callers can never both observe "not in flight".
#[derive(Clone)]
pub struct InFlightRegistry {
    inner: Arc<RegistryInner>,
}

/// Outcome of [`InFlightRegistry::check_and_register`].
pub enum Registration {
    /// The caller won the registration and must drive the attempt chain.
    Owner(InFlightGuard),
    /// Another caller owns the key; wait on the shared handle.
    InFlight(InFlightHandle),
}

impl Registration {
    pub fn is_already_in_flight(&self) -> bool {
        matches!(self, Registration::InFlight(_))
    }

    pub fn key(&self) -> &IdempotencyKey {
        match self {
            Registration::Owner(guard) => guard.key(),
            Registration::InFlight(handle) => handle.key(),
        }
    }
}

impl InFlightRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                generator: IdempotencyKeyGenerator::new(config.keys),
                cooldown: config.cooldown,
                state: Mutex::new(RegistryState::default()),
                stats: RegistryStats::default(),
            }),
        }
    }

    pub fn from_settings(settings: &GuardSettings) -> Self {
        Self::new(RegistryConfig::from(settings))
    }

    pub fn key_generator(&self) -> &IdempotencyKeyGenerator {
        &self.inner.generator
    }

    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn check_and_register(&self, request: &PaymentRequest) -> Registration {
        self.check_and_register_at(request, Utc::now())
    }

    /// Atomically checks the current and previous bucket, plus any failed
    /// entry for the same content still in its cooldown, and registers the
    /// caller under the current bucket if none of them is live.
    pub fn check_and_register_at(&self, request: &PaymentRequest, now: DateTime<Utc>) -> Registration {
        let keys = self.inner.generator.derive_at(request, now);
        let content_key = self.inner.generator.content_key(request);
        let mut state = self.lock();

        let mut candidates = vec![keys.current.clone(), keys.previous.clone()];
        if let Some(failed) = state.cooling.get(&content_key) {
            if !candidates.contains(failed) {
                candidates.push(failed.clone());
            }
        }

        for key in &candidates {
            if state.entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
                state.remove(key);
                self.inner.stats.swept.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if let Some(entry) = state.entries.get(key) {
                let handle = InFlightHandle {
                    key: key.clone(),
                    owner: entry.owner,
                    slot: entry.slot.subscribe(),
                };
                drop(state);

                self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
                PipelineEvent::new("in_flight_registry", EventSubject::IdempotencyKey(handle.key.as_str()), "hit").emit();
                return Registration::InFlight(handle);
            }
        }

        state.cooling.remove(&content_key);
        let owner = Uuid::new_v4();
        let (slot, _) = watch::channel(ResultSlot::Empty);
        state.entries.insert(
            keys.current.clone(),
            Entry {
                owner,
                content_key,
                created_at: now,
                expires_at: None,
                slot,
            },
        );
        drop(state);

        self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
        PipelineEvent::new("in_flight_registry", EventSubject::IdempotencyKey(keys.current.as_str()), "miss").emit();

        Registration::Owner(InFlightGuard {
            registry: self.clone(),
            keys,
            owner,
            started: tokio::time::Instant::now(),
            resolved: false,
        })
    }

    /// Snapshot of the entry stored under `key`, if any.
    pub fn entry(&self, key: &IdempotencyKey) -> Option<InFlightEntry> {
        self.lock().entries.get(key).map(|e| InFlightEntry {
            key: key.clone(),
            owner: e.owner,
            created_at: e.created_at,
            expires_at: e.expires_at,
            result: e.slot.borrow().clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes failed entries whose cooldown has elapsed. Pending entries are
    /// never swept; they always reach a terminal state through their guard.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let RegistryState { entries, cooling } = &mut *state;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        cooling.retain(|_, key| entries.contains_key(key));
        let removed = before - entries.len();
        self.inner.stats.swept.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn resolve(&self, key: &IdempotencyKey, owner: Uuid, outcome: PaymentOutcome, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        let RegistryState { entries, cooling } = &mut *state;
        let entry = entries.get_mut(key).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("No in-flight entry for key {}", key))
        })?;

        if entry.owner != owner {
            return Err(AppError::Internal(anyhow::anyhow!(
                "In-flight entry {} is owned by another registrant",
                key
            )));
        }

        match outcome {
            // Cleared immediately: a confirmed payment is anchored by its
            // signature, and a boundary duplicate is already blocked remotely.
            PaymentOutcome::Confirmed { .. } | PaymentOutcome::DuplicateRejected { .. } => {
                entry.slot.send_replace(ResultSlot::Succeeded(outcome));
                entries.remove(key);
                self.inner.stats.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            PaymentOutcome::TransientFailure { .. } | PaymentOutcome::FatalFailure { .. } => {
                entry.slot.send_replace(ResultSlot::Failed(outcome));
                entry.expires_at = Some(now + self.inner.cooldown);
                cooling.insert(entry.content_key.clone(), key.clone());
                self.inner.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owner side of a registration. Only the owner may resolve the entry.
///
/// Dropping an unresolved guard (a cancelled request) resolves it as a
/// transient failure, which keeps the key blocked for the cooldown instead of
/// reopening a duplicate window.
pub struct InFlightGuard {
    registry: InFlightRegistry,
    keys: DerivedKeys,
    owner: Uuid,
    started: tokio::time::Instant,
    resolved: bool,
}

impl InFlightGuard {
    pub fn key(&self) -> &IdempotencyKey {
        &self.keys.current
    }

    pub fn derived_keys(&self) -> &DerivedKeys {
        &self.keys
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Publishes the terminal outcome to every waiter and applies the release
    /// policy: delete on success, cooldown retention on failure.
    pub fn resolve(mut self, outcome: PaymentOutcome) -> Result<()> {
        self.resolved = true;
        let state = outcome.label();
        self.registry
            .resolve(&self.keys.current, self.owner, outcome, Utc::now())?;

        PipelineEvent::new("in_flight_registry", EventSubject::IdempotencyKey(self.keys.current.as_str()), state)
            .with_elapsed(self.started.elapsed())
            .emit();
        Ok(())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        self.registry
            .inner
            .stats
            .abandoned
            .fetch_add(1, Ordering::Relaxed);
        let outcome = PaymentOutcome::TransientFailure {
            reason: "request abandoned before reaching a terminal state".to_string(),
        };
        if let Err(e) = self
            .registry
            .resolve(&self.keys.current, self.owner, outcome, Utc::now())
        {
            tracing::warn!(idempotency_key = %self.keys.current, "Failed to settle abandoned in-flight entry: {}", e);
        }
    }
}

/// Read-only view of someone else's registration.
pub struct InFlightHandle {
    key: IdempotencyKey,
    owner: Uuid,
    slot: watch::Receiver<ResultSlot>,
}

impl InFlightHandle {
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Current slot without waiting.
    pub fn peek(&self) -> ResultSlot {
        self.slot.borrow().clone()
    }

    /// Waits for the owner's terminal outcome.
    pub async fn wait(mut self) -> PaymentOutcome {
        match self.slot.wait_for(|slot| !slot.is_empty()).await {
            Ok(slot) => match slot.outcome() {
                Some(outcome) => outcome.clone(),
                None => PaymentOutcome::TransientFailure {
                    reason: "in-flight owner published no outcome".to_string(),
                },
            },
            Err(_) => PaymentOutcome::TransientFailure {
                reason: "in-flight owner went away without an outcome".to_string(),
            },
        }
    }
}

/// Background sweep of expired registry entries, and of idle actions when
/// an [`ActionGuard`] is attached.
pub struct RegistrySweepJob {
    registry: InFlightRegistry,
    action_guard: Option<ActionGuard>,
    interval_seconds: u64,
}

impl RegistrySweepJob {
    pub fn new(registry: InFlightRegistry, interval_seconds: u64) -> Self {
        Self {
            registry,
            action_guard: None,
            interval_seconds: interval_seconds.max(1),
        }
    }

    pub fn with_action_guard(mut self, action_guard: ActionGuard) -> Self {
        self.action_guard = Some(action_guard);
        self
    }

    /// Returns the number of registry entries removed.
    pub fn run_once(&self) -> usize {
        if let Some(guard) = &self.action_guard {
            let pruned = guard.prune_idle();
            if pruned > 0 {
                tracing::debug!("Pruned {} idle actions", pruned);
            }
        }
        self.registry.sweep_expired()
    }

    /// Starts the sweep in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(self.interval_seconds));

            loop {
                interval.tick().await;
                let count = self.run_once();
                if count > 0 {
                    tracing::info!("Swept {} expired in-flight entries", count);
                }
            }
        })
    }
}
