//! Admin session expiry monitor.
//!
//! [`ExpiryTracker`] is the pure state machine (`Idle → Armed → Warned →
//! Expired`), driven by explicit `now` values. [`SessionExpiryMonitor`] owns
//! one tracker, follows the store's snapshot, and runs a single serial tick
//! task that warns once and forces logout once.
//!
//! Every arm/disarm bumps the tracker generation. A tick only acts if its
//! generation is still current, so a tick that was already scheduled when the
//! session ended can never emit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::events::{LogoutReason, SessionEvent};
use crate::gateway::AuthError;
use crate::session::{SessionSnapshot, SessionStore, SnapshotObserver};

// ─────────────────────────────────────────────────────────────────────────────
// Pure state machine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryState {
    /// No expiry to track.
    Idle,
    Armed,
    /// The approaching-expiry warning has been raised.
    Warned,
    /// The session ran out and logout was forced.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to track; the ticker should stop.
    Stopped,
    /// Armed, outside the warning window.
    Waiting { remaining: Duration },
    /// Entered the warning window on this tick.
    Warn { remaining: Duration },
    /// Already warned; the displayed countdown should update.
    Countdown { remaining: Duration },
    /// Expired on this tick; the caller must force logout.
    Expire,
}

#[derive(Debug, Clone)]
pub struct ExpiryTracker {
    state: ExpiryState,
    expires_at: Option<DateTime<Utc>>,
    warning_threshold: Duration,
    generation: u64,
}

impl ExpiryTracker {
    pub fn new(warning_threshold: Duration) -> Self {
        Self {
            state: ExpiryState::Idle,
            expires_at: None,
            warning_threshold,
            generation: 0,
        }
    }

    pub fn state(&self) -> ExpiryState {
        self.state
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start tracking `expires_at`. Returns the new generation.
    pub fn arm(&mut self, expires_at: DateTime<Utc>) -> u64 {
        self.generation += 1;
        self.state = ExpiryState::Armed;
        self.expires_at = Some(expires_at);
        self.generation
    }

    /// Stop tracking. A forced expiry stays visible as `Expired`.
    pub fn disarm(&mut self) {
        self.generation += 1;
        self.expires_at = None;
        if self.state != ExpiryState::Expired {
            self.state = ExpiryState::Idle;
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.state {
            ExpiryState::Armed | ExpiryState::Warned => self.expires_at.map(|at| at - now),
            ExpiryState::Idle | ExpiryState::Expired => None,
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let Some(remaining) = self.remaining(now) else {
            return TickOutcome::Stopped;
        };

        if remaining <= Duration::zero() {
            self.state = ExpiryState::Expired;
            return TickOutcome::Expire;
        }

        match self.state {
            ExpiryState::Armed if remaining <= self.warning_threshold => {
                self.state = ExpiryState::Warned;
                TickOutcome::Warn { remaining }
            }
            ExpiryState::Warned => TickOutcome::Countdown { remaining },
            _ => TickOutcome::Waiting { remaining },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduled task
// ─────────────────────────────────────────────────────────────────────────────

/// The single active tick task, tagged with the generation it serves.
#[derive(Debug)]
struct ScheduledTask {
    handle: JoinHandle<()>,
    generation: u64,
}

impl ScheduledTask {
    fn cancel(self) {
        tracing::debug!(generation = self.generation, "expiry ticker cancelled");
        self.handle.abort();
    }
}

enum TickAction {
    Continue,
    Stop,
    ForceLogout,
}

// ─────────────────────────────────────────────────────────────────────────────
// Monitor
// ─────────────────────────────────────────────────────────────────────────────

/// Watches the admin session expiry of one [`SessionStore`].
///
/// Dropping the monitor (or calling [`SessionExpiryMonitor::dispose`]) stops
/// the ticker.
#[derive(Debug)]
pub struct SessionExpiryMonitor {
    inner: Arc<MonitorInner>,
}

#[derive(Debug)]
struct MonitorInner {
    this: Weak<MonitorInner>,
    store: SessionStore,
    config: MonitorConfig,
    tracker: Mutex<ExpiryTracker>,
    task: Mutex<Option<ScheduledTask>>,
    disposed: AtomicBool,
}

impl SessionExpiryMonitor {
    /// Start following `store`. Arms immediately if the current snapshot
    /// already carries an expiry.
    ///
    /// Ticking needs a tokio runtime; without one the monitor only tracks state.
    pub fn attach(store: &SessionStore, config: MonitorConfig) -> Self {
        let inner = Arc::new_cyclic(|this| MonitorInner {
            this: this.clone(),
            store: store.clone(),
            config,
            tracker: Mutex::new(ExpiryTracker::new(config.warning_threshold())),
            task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let observer: Weak<MonitorInner> = Arc::downgrade(&inner);
        store.observe(observer);
        inner.snapshot_changed(&store.snapshot());

        Self { inner }
    }

    pub fn state(&self) -> ExpiryState {
        self.inner.lock_tracker().state()
    }

    /// Milliseconds until the admin session expires; 0 when nothing is tracked.
    pub fn remaining(&self) -> i64 {
        let now = self.inner.store.clock().now();
        self.inner
            .lock_tracker()
            .remaining(now)
            .map(|left| left.num_milliseconds().max(0))
            .unwrap_or(0)
    }

    /// Ask the backend for a fresh session and re-arm with its expiry.
    ///
    /// The answer is vetted before it is committed: it must carry an admin
    /// grant that has not lapsed. Any failure ends the session, surfacing one
    /// `SessionExpired` that carries the cause and forcing logout. A session
    /// that already ended meanwhile is left alone.
    pub async fn extend(&self) -> Result<DateTime<Utc>, AuthError> {
        let store = &self.inner.store;
        let clock = store.clock().clone();
        let refreshed = store
            .refresh_inner(|identity| match identity.session_expiry() {
                Some(at) if at > clock.now() => Ok(at),
                Some(_) => Err(AuthError::SessionExpired),
                None => Err(AuthError::forbidden("refreshed session has no admin grant")),
            })
            .await;

        match refreshed {
            Ok((_, at)) => {
                self.inner.renew(at);
                tracing::info!(session_expiry = %at, "admin session extended");
                Ok(at)
            }
            Err(err @ AuthError::OperationInFlight(_)) => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "admin session extension refused");
                if !store.is_signed_in() {
                    return Err(AuthError::SessionExpired);
                }
                store.publish(SessionEvent::SessionExpired {
                    reason: err.to_string(),
                    occurred_at: store.now(),
                });
                store.end_session(LogoutReason::ExtendFailed).await;
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Stop ticking and ignore further snapshot changes.
    pub fn dispose(&self) {
        self.inner
            .disposed
            .store(true, Ordering::SeqCst);
        self.inner.teardown();
    }
}

impl Drop for SessionExpiryMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl SnapshotObserver for MonitorInner {
    fn snapshot_changed(&self, snapshot: &SessionSnapshot) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        match snapshot.session_expiry() {
            Some(at) => {
                let tracker = self.lock_tracker();
                let already_tracking = tracker.expires_at() == Some(at)
                    && matches!(tracker.state(), ExpiryState::Armed | ExpiryState::Warned);
                drop(tracker);
                if !already_tracking {
                    self.arm(at);
                }
            }
            None => self.teardown(),
        }
    }
}

impl MonitorInner {
    fn lock_tracker(&self) -> MutexGuard<'_, ExpiryTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<ScheduledTask>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn arm(&self, expires_at: DateTime<Utc>) {
        self.arm_locked(self.lock_tracker(), expires_at);
    }

    /// Restart the warning cycle for an extension that kept the same expiry.
    /// Skipped once the session has been torn down.
    fn renew(&self, expires_at: DateTime<Utc>) {
        let tracker = self.lock_tracker();
        if tracker.expires_at() == Some(expires_at) && tracker.state() == ExpiryState::Warned {
            self.arm_locked(tracker, expires_at);
        }
    }

    fn arm_locked(&self, mut tracker: MutexGuard<'_, ExpiryTracker>, expires_at: DateTime<Utc>) {
        let generation = tracker.arm(expires_at);
        tracing::info!(session_expiry = %expires_at, generation, "expiry monitor armed");

        // Spawned under the tracker lock so the slot always holds the newest task.
        let scheduled = self.spawn_ticker(generation);
        let previous = std::mem::replace(&mut *self.lock_task(), scheduled);
        drop(tracker);

        if let Some(task) = previous {
            task.cancel();
        }
    }

    /// Disarm and stop the ticker before returning.
    fn teardown(&self) {
        let mut tracker = self.lock_tracker();
        let forced = tracker.state() == ExpiryState::Expired;
        if tracker.state() == ExpiryState::Idle && self.lock_task().is_none() {
            return;
        }
        tracker.disarm();
        let task = self.lock_task().take();
        drop(tracker);

        match task {
            // The forced-logout tick is still finishing its revoke call and
            // exits by itself; aborting it would cut the revoke short.
            Some(task) if forced => drop(task),
            Some(task) => task.cancel(),
            None => {}
        }
        tracing::debug!(forced, "expiry monitor torn down");
    }

    fn spawn_ticker(&self, generation: u64) -> Option<ScheduledTask> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("no async runtime; admin session expiry will not be enforced");
                return None;
            }
        };

        let this = self.this.clone();
        let period = self.config.tick_interval();
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let Some(monitor) = this.upgrade() else {
                    break;
                };

                match monitor.on_tick(generation) {
                    TickAction::Continue => {}
                    TickAction::Stop => break,
                    TickAction::ForceLogout => {
                        monitor.store.end_session(LogoutReason::Expired).await;
                        break;
                    }
                }
            }
        });

        Some(ScheduledTask { handle, generation })
    }

    fn on_tick(&self, generation: u64) -> TickAction {
        let now = self.store.clock().now();
        let mut tracker = self.lock_tracker();
        if tracker.generation() != generation {
            return TickAction::Stop;
        }

        // Events are published under the tracker lock so teardown cannot
        // interleave between the state change and the emission.
        match tracker.tick(now) {
            TickOutcome::Stopped => TickAction::Stop,
            TickOutcome::Waiting { remaining } | TickOutcome::Countdown { remaining } => {
                tracing::trace!(remaining_ms = remaining.num_milliseconds(), "expiry tick");
                TickAction::Continue
            }
            TickOutcome::Warn { remaining } => {
                tracing::info!(
                    remaining_ms = remaining.num_milliseconds(),
                    "admin session approaching expiry"
                );
                self.store.publish(SessionEvent::ExpiryWarning {
                    remaining_ms: remaining.num_milliseconds(),
                    occurred_at: now,
                });
                TickAction::Continue
            }
            TickOutcome::Expire => {
                tracing::info!("admin session expired; forcing logout");
                self.store.publish(SessionEvent::SessionExpired {
                    reason: "session lifetime elapsed".to_string(),
                    occurred_at: now,
                });
                TickAction::ForceLogout
            }
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.cancel();
        }
    }
}
