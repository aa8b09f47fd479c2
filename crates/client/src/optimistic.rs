//! Optimistic update manager
//!
//! Applies local mutations immediately, coalesces rapid repeated edits per
//! logical key into a single debounced network commit, and rolls the local
//! state back when the eventual commit fails.
//!
//! Keys are caller-supplied logical identifiers, typically
//! `entity_kind:entity_id:field` (e.g. `product:42:price`). At most one
//! pending entry exists per key: a new edit supersedes the payload of the
//! previous one rather than queueing behind it, while the rollback snapshot
//! of the first edit in the burst is preserved.
//!
//! Commits for a single key never interleave. An edit arriving while that
//! key's commit is in flight re-arms the entry; its debounce cycle starts
//! only after the in-flight commit settles.
//!
//! The manager is an explicit instance with a teardown that cancels all
//! outstanding timers - state never leaks across client instances or test
//! runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tillgrid_domain::{ApiError, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Local-apply hook: called with the new payload on every edit and with the
/// rollback snapshot when a commit fails
pub type ApplyFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// Network commit hook, typically a thin wrapper around a client call
pub type CommitFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Debounce class of a payload; selects the default quiet period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateClass {
    /// Scalar field edits (name, description, price)
    Field,
    /// Quantity and counter edits
    Counter,
    /// Large binary payloads
    Binary,
    /// Caller-chosen quiet period
    Custom(Duration),
}

impl UpdateClass {
    /// Quiet period for this class under `config`
    pub fn debounce(self, config: &UpdateManagerConfig) -> Duration {
        match self {
            Self::Field => config.field_debounce,
            Self::Counter => config.counter_debounce,
            Self::Binary => config.binary_debounce,
            Self::Custom(duration) => duration,
        }
    }
}

/// Debounce defaults per payload class
#[derive(Debug, Clone)]
pub struct UpdateManagerConfig {
    pub field_debounce: Duration,
    pub counter_debounce: Duration,
    pub binary_debounce: Duration,
}

impl Default for UpdateManagerConfig {
    fn default() -> Self {
        Self {
            field_debounce: Duration::from_millis(300),
            counter_debounce: Duration::from_millis(200),
            binary_debounce: Duration::from_millis(500),
        }
    }
}

/// Settlement handle for one scheduled update.
///
/// Resolves when the burst the call joined commits or rolls back. Dropping
/// the ticket is fine; settlement proceeds regardless.
pub struct UpdateTicket {
    receiver: oneshot::Receiver<Result<()>>,
}

impl UpdateTicket {
    /// Wait for the burst to settle
    pub async fn settled(self) -> Result<()> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Cancelled),
        }
    }
}

struct PendingUpdate {
    latest_payload: Value,
    /// Caller state before the first edit of the current uncommitted burst
    snapshot: Value,
    apply: ApplyFn,
    commit: CommitFn,
    debounce: Duration,
    timer: Option<JoinHandle<()>>,
    /// Guards the debounce task against firing for a superseded edit
    epoch: u64,
    in_flight: bool,
    /// An edit arrived while the commit was in flight
    rearmed: bool,
    waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Waiters of the re-armed edit; settle with the *next* commit
    rearmed_waiters: Vec<oneshot::Sender<Result<()>>>,
}

struct Inner {
    pending: HashMap<String, PendingUpdate>,
    next_epoch: u64,
    shutdown: bool,
}

/// Optimistic update manager with explicit lifecycle
#[derive(Clone)]
pub struct UpdateManager {
    inner: Arc<Mutex<Inner>>,
    config: UpdateManagerConfig,
}

impl UpdateManager {
    pub fn new(config: UpdateManagerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: HashMap::new(),
                next_epoch: 0,
                shutdown: false,
            })),
            config,
        }
    }

    /// Schedule an optimistic update for `key`.
    ///
    /// `current` is the caller-visible value before this edit; it becomes the
    /// rollback snapshot only when this call opens a new burst. `apply` runs
    /// synchronously before this function returns - the caller's state
    /// reflects the edit before any network round trip.
    pub fn schedule_update(
        &self,
        key: impl Into<String>,
        payload: Value,
        current: Value,
        class: UpdateClass,
        apply: ApplyFn,
        commit: CommitFn,
    ) -> UpdateTicket {
        let key = key.into();
        let debounce = class.debounce(&self.config);
        let (sender, receiver) = oneshot::channel();

        {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                let _ = sender.send(Err(ApiError::Cancelled));
                return UpdateTicket { receiver };
            }

            inner.next_epoch += 1;
            let epoch = inner.next_epoch;

            if let Some(entry) = inner.pending.get_mut(&key) {
                // supersede: replace payload and hooks, keep the pre-burst snapshot
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
                entry.latest_payload = payload.clone();
                entry.apply = apply.clone();
                entry.commit = commit;
                entry.debounce = debounce;
                entry.epoch = epoch;

                if entry.in_flight {
                    // a commit for this key is mid-air; re-arm instead of
                    // racing it with a second commit
                    entry.rearmed = true;
                    entry.rearmed_waiters.push(sender);
                    debug!(key = %key, "edit while commit in flight, re-armed");
                } else {
                    entry.waiters.push(sender);
                    debug!(key = %key, "superseded pending update");
                    Self::start_timer(&self.inner, &mut inner, key.clone(), epoch, debounce);
                }
            } else {
                inner.pending.insert(
                    key.clone(),
                    PendingUpdate {
                        latest_payload: payload.clone(),
                        snapshot: current,
                        apply: apply.clone(),
                        commit,
                        debounce,
                        timer: None,
                        epoch,
                        in_flight: false,
                        rearmed: false,
                        waiters: vec![sender],
                        rearmed_waiters: Vec::new(),
                    },
                );
                debug!(key = %key, "created pending update");
                Self::start_timer(&self.inner, &mut inner, key.clone(), epoch, debounce);
            }
        }

        // optimistic step: visible state reflects the edit immediately
        apply(&payload);

        UpdateTicket { receiver }
    }

    /// Number of keys with uncommitted or in-flight updates
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Tear down: abort every outstanding debounce timer and cancel pending
    /// entries. Already in-flight commits cannot be cancelled; they are
    /// awaited and settle their own waiters.
    pub fn shutdown(&self) {
        Self::shutdown_inner(&self.inner);
    }

    fn shutdown_inner(inner: &Arc<Mutex<Inner>>) {
        let mut cancelled = Vec::new();
        {
            let mut inner = inner.lock();
            inner.shutdown = true;
            inner.pending.retain(|key, entry| {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
                // re-armed edits never started their cycle; cancel them even
                // when the entry survives for an in-flight commit
                entry.rearmed = false;
                cancelled.append(&mut entry.rearmed_waiters);
                if entry.in_flight {
                    true
                } else {
                    debug!(key = %key, "cancelled pending update");
                    cancelled.append(&mut entry.waiters);
                    false
                }
            });
        }
        for waiter in cancelled {
            let _ = waiter.send(Err(ApiError::Cancelled));
        }
    }

    fn start_timer(
        inner: &Arc<Mutex<Inner>>,
        guard: &mut Inner,
        key: String,
        epoch: u64,
        debounce: Duration,
    ) {
        let weak = Arc::downgrade(inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(inner) = weak.upgrade() {
                Self::fire(inner, &task_key, epoch).await;
            }
        });
        if let Some(entry) = guard.pending.get_mut(&key) {
            entry.timer = Some(handle);
        }
    }

    /// Debounce expiry: start the commit if this timer is still current
    async fn fire(inner: Arc<Mutex<Inner>>, key: &str, epoch: u64) {
        let (payload, commit) = {
            let mut guard = inner.lock();
            let Some(entry) = guard.pending.get_mut(key) else {
                return;
            };
            if entry.epoch != epoch || entry.in_flight {
                // superseded by a newer edit, or racing a commit
                return;
            }
            entry.in_flight = true;
            entry.timer = None;
            (entry.latest_payload.clone(), entry.commit.clone())
        };

        debug!(key, "committing update");
        let result = commit(payload.clone()).await;
        Self::settle(&inner, key, payload, result);
    }

    fn settle(inner: &Arc<Mutex<Inner>>, key: &str, committed: Value, result: Result<()>) {
        let mut rollback: Option<(ApplyFn, Value)> = None;
        let mut waiters = Vec::new();
        let outcome = result.clone();
        {
            let mut guard = inner.lock();
            guard.next_epoch += 1;
            let next_epoch = guard.next_epoch;

            let Some(entry) = guard.pending.get_mut(key) else {
                return;
            };
            entry.in_flight = false;

            match result {
                Ok(()) => {
                    if entry.rearmed {
                        // the superseding edit becomes its own burst; its
                        // rollback point is the state the server just confirmed
                        entry.rearmed = false;
                        entry.snapshot = committed;
                        entry.epoch = next_epoch;
                        waiters = std::mem::take(&mut entry.waiters);
                        entry.waiters = std::mem::take(&mut entry.rearmed_waiters);
                        let debounce = entry.debounce;

                        debug!(key, "commit settled, starting re-armed cycle");
                        Self::start_timer(inner, &mut guard, key.to_string(), next_epoch, debounce);
                    } else if let Some(mut entry) = guard.pending.remove(key) {
                        debug!(key, "commit succeeded");
                        waiters = std::mem::take(&mut entry.waiters);
                    }
                }
                Err(ref err) => {
                    if let Some(mut entry) = guard.pending.remove(key) {
                        warn!(key, error = %err, "commit failed, rolling back");
                        rollback = Some((entry.apply.clone(), entry.snapshot.clone()));
                        waiters = std::mem::take(&mut entry.waiters);
                        waiters.append(&mut entry.rearmed_waiters);
                    }
                }
            }
        }

        if let Some((apply, snapshot)) = rollback {
            apply(&snapshot);
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for UpdateManager {
    fn drop(&mut self) {
        // last handle going away tears the instance down; timer tasks hold
        // only weak references and cannot keep it alive
        if Arc::strong_count(&self.inner) == 1 {
            Self::shutdown_inner(&self.inner);
        }
    }
}
