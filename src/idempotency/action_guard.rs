use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::GuardSettings;

#[derive(Debug)]
struct ActionState {
    active: bool,
    last_accepted: Instant,
}

/// Collapses rapid repeated triggers of the same UI action within one process.
///
/// Purely synchronous: no suspension point between the check and the flag
/// update, so a second tap can never slip through while the first is being
/// recorded. Offers no cross-process guarantee.
#[derive(Debug, Clone)]
pub struct ActionGuard {
    min_interval: Duration,
    actions: Arc<Mutex<HashMap<String, ActionState>>>,
}

impl ActionGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            actions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_settings(settings: &GuardSettings) -> Self {
        Self::new(Duration::from_millis(settings.action_min_interval_ms))
    }

    /// Returns false if the action is still active or was accepted less than
    /// `min_interval` ago. On true the caller must call [`release`].
    ///
    /// [`release`]: ActionGuard::release
    pub fn try_acquire(&self, action_id: &str) -> bool {
        let now = Instant::now();
        let mut actions = self.lock();

        if let Some(state) = actions.get_mut(action_id) {
            if state.active || now.duration_since(state.last_accepted) < self.min_interval {
                tracing::debug!(action_id, active = state.active, "Suppressed repeated action trigger");
                return false;
            }
            state.active = true;
            state.last_accepted = now;
            return true;
        }

        actions.insert(
            action_id.to_string(),
            ActionState {
                active: true,
                last_accepted: now,
            },
        );
        true
    }

    /// Clears the active flag; the interval check still applies afterwards.
    pub fn release(&self, action_id: &str) {
        if let Some(state) = self.lock().get_mut(action_id) {
            state.active = false;
        }
    }

    /// RAII form of [`try_acquire`](ActionGuard::try_acquire).
    pub fn permit(&self, action_id: &str) -> Option<ActionPermit> {
        self.try_acquire(action_id).then(|| ActionPermit {
            guard: self.clone(),
            action_id: action_id.to_string(),
        })
    }

    pub fn is_active(&self, action_id: &str) -> bool {
        self.lock().get(action_id).map(|s| s.active).unwrap_or(false)
    }

    /// Number of actions currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops idle actions whose interval has long passed.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut actions = self.lock();
        let before = actions.len();
        actions.retain(|_, s| s.active || now.duration_since(s.last_accepted) < self.min_interval);
        before - actions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActionState>> {
        // The map holds plain flags, so a poisoned lock is still consistent.
        self.actions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its action when dropped.
#[derive(Debug)]
pub struct ActionPermit {
    guard: ActionGuard,
    action_id: String,
}

impl ActionPermit {
    pub fn action_id(&self) -> &str {
        &self.action_id
    }
}

impl Drop for ActionPermit {
    fn drop(&mut self) {
        self.guard.release(&self.action_id);
    }
}
