//! Session store: the single owner of the current identity snapshot.
//!
//! Every mutation replaces the whole snapshot under one lock, so readers see
//! either the old or the new identity (and its expiry), never a mix. After a
//! commit the store synchronously notifies registered [`SnapshotObserver`]s and
//! publishes [`SessionEvent::SnapshotChanged`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

use portal_core::Clock;
use portal_events::{Event, EventBus, Subscription};

use crate::events::{LogoutReason, SessionBus, SessionEvent};
use crate::gateway::{AuthError, AuthGateway, Credentials, Operation, ProfileUpdate};
use crate::identity::{AdminIdentity, Identity, UserIdentity};

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "identity", rename_all = "snake_case")]
pub enum SessionSnapshot {
    /// The backend has not answered `check_status` yet.
    Loading,
    Ready(Identity),
}

impl SessionSnapshot {
    pub fn anonymous() -> Self {
        SessionSnapshot::Ready(Identity::Anonymous)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionSnapshot::Loading)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionSnapshot::Loading => None,
            SessionSnapshot::Ready(identity) => Some(identity),
        }
    }

    pub fn session_expiry(&self) -> Option<DateTime<Utc>> {
        self.identity().and_then(Identity::session_expiry)
    }
}

/// Synchronous hook run after every snapshot commit.
///
/// Implementations must not call back into the store's async operations.
pub trait SnapshotObserver: Send + Sync {
    fn snapshot_changed(&self, snapshot: &SessionSnapshot);
}

/// Cheap-to-clone handle to the session state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    gateway: Arc<dyn AuthGateway>,
    bus: Arc<SessionBus>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<SessionSnapshot>,
    /// Serializes commit + observer notification so observers see commits in order.
    commit_lock: Mutex<()>,
    /// Bumped under `commit_lock` every time the session ends.
    epoch: AtomicU64,
    observers: Mutex<Vec<Weak<dyn SnapshotObserver>>>,
    in_flight: Mutex<HashSet<Operation>>,
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionStore")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Marks an operation as in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Operation>>,
    operation: Operation,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.operation);
    }
}

impl SessionStore {
    /// Create a store in the `Loading` state. Call [`SessionStore::bootstrap`] next.
    pub fn new(gateway: Arc<dyn AuthGateway>, bus: Arc<SessionBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                gateway,
                bus,
                clock,
                snapshot: RwLock::new(SessionSnapshot::Loading),
                commit_lock: Mutex::new(()),
                epoch: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn bus(&self) -> &Arc<SessionBus> {
        &self.inner.bus
    }

    /// Whether a user or admin session is currently held.
    pub fn is_signed_in(&self) -> bool {
        self.snapshot()
            .identity()
            .is_some_and(|identity| !identity.is_anonymous())
    }

    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        self.inner.bus.subscribe()
    }

    /// Register an observer. The store only keeps a weak reference; dropping
    /// the observer unregisters it.
    pub fn observe(&self, observer: Weak<dyn SnapshotObserver>) {
        let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.push(observer);
    }

    /// Whether `operation` is currently awaiting the backend (e.g. to disable a
    /// submit button).
    pub fn is_in_flight(&self, operation: Operation) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&operation)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Restore the session from the backend. Never fails: any error collapses
    /// to `Anonymous`.
    pub async fn bootstrap(&self) {
        let Ok(_guard) = self.begin(Operation::Bootstrap) else {
            tracing::debug!("bootstrap already in progress");
            return;
        };

        if !self.snapshot().is_loading() {
            self.commit(SessionSnapshot::Loading);
        }

        let identity = match self.inner.gateway.check_status().await {
            Ok(identity) => identity,
            Err(AuthError::Unauthenticated) => {
                tracing::debug!("no backend session to restore");
                Identity::Anonymous
            }
            Err(err) => {
                tracing::warn!(error = %err, "session bootstrap failed; continuing anonymous");
                self.publish(SessionEvent::OperationFailed {
                    operation: Operation::Bootstrap,
                    error: err,
                    occurred_at: self.now(),
                });
                Identity::Anonymous
            }
        };

        // A login that finished while we were waiting wins over the restore.
        let applied = self.commit_if(SessionSnapshot::Ready(identity.clone()), |current| {
            current.is_loading()
        });
        if applied {
            tracing::info!(identity = identity.kind(), "session bootstrapped");
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        let result = self.login_inner(credentials).await;
        self.settle(Operation::Login, result)
    }

    async fn login_inner(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        credentials.validate()?;
        let _guard = self.begin(Operation::Login)?;

        let user = self.inner.gateway.login(credentials).await?;
        tracing::info!(user_id = %user.id, "user logged in");

        self.commit_with(|snapshot| {
            let current = snapshot.identity().cloned().unwrap_or_default();
            Some(SessionSnapshot::Ready(current.with_user(user.clone())))
        });
        Ok(user)
    }

    pub async fn admin_login(&self, credentials: &Credentials) -> Result<AdminIdentity, AuthError> {
        let result = self.admin_login_inner(credentials).await;
        self.settle(Operation::AdminLogin, result)
    }

    async fn admin_login_inner(&self, credentials: &Credentials) -> Result<AdminIdentity, AuthError> {
        credentials.validate()?;
        let _guard = self.begin(Operation::AdminLogin)?;

        let admin = self.inner.gateway.admin_login(credentials).await?;
        tracing::info!(
            admin_id = %admin.id,
            session_expiry = %admin.session_expiry,
            "admin logged in"
        );

        self.commit_with(|snapshot| {
            let current = snapshot.identity().cloned().unwrap_or_default();
            Some(SessionSnapshot::Ready(current.with_admin(admin.clone())))
        });
        Ok(admin)
    }

    /// Clear the session, then tell the backend.
    pub async fn logout(&self) {
        self.end_session(LogoutReason::UserInitiated).await;
    }

    /// Shared by self-initiated and monitor-forced logout.
    ///
    /// The snapshot is cleared before the first await, so observers (the expiry
    /// monitor) are torn down before this future can be suspended.
    pub(crate) async fn end_session(&self, reason: LogoutReason) {
        let previous = self.clear();
        let was_signed_in = previous
            .identity()
            .is_some_and(|identity| !identity.is_anonymous());
        if !was_signed_in {
            tracing::debug!(?reason, "logout with no active session");
            return;
        }

        tracing::info!(?reason, "session ended");
        self.publish(SessionEvent::LoggedOut {
            reason,
            occurred_at: self.now(),
        });

        if let Err(err) = self.inner.gateway.logout().await {
            // Local state is already anonymous; a failed revoke never re-arms it.
            tracing::warn!(error = %err, "backend session revoke failed");
        }
    }

    /// Fetch a fresh identity from the backend and adopt it.
    ///
    /// On failure the current snapshot is left untouched. If the session ends
    /// while the backend is answering, the answer is dropped and the call
    /// fails with [`AuthError::SessionExpired`].
    pub async fn refresh(&self) -> Result<Identity, AuthError> {
        let result = self.refresh_inner(|_| Ok(())).await.map(|(identity, ())| identity);
        self.settle(Operation::Refresh, result)
    }

    /// Unsettled refresh. `accept` vets the backend answer before anything is
    /// committed; its error aborts the refresh.
    pub(crate) async fn refresh_inner<T>(
        &self,
        accept: impl FnOnce(&Identity) -> Result<T, AuthError>,
    ) -> Result<(Identity, T), AuthError> {
        let _guard = self.begin(Operation::Refresh)?;
        let epoch = self.inner.epoch.load(Ordering::Acquire);

        let identity = self.inner.gateway.check_status().await?;
        if identity.is_anonymous() {
            return Err(AuthError::Unauthenticated);
        }
        let accepted = accept(&identity)?;

        let applied = self.commit_with(|_| {
            (self.inner.epoch.load(Ordering::Acquire) == epoch)
                .then(|| SessionSnapshot::Ready(identity.clone()))
        });
        if !applied {
            tracing::info!(
                identity = identity.kind(),
                "session ended during refresh; answer dropped"
            );
            return Err(AuthError::SessionExpired);
        }
        Ok((identity, accepted))
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserIdentity, AuthError> {
        let result = self.update_profile_inner(update).await;
        self.settle(Operation::UpdateProfile, result)
    }

    async fn update_profile_inner(&self, update: &ProfileUpdate) -> Result<UserIdentity, AuthError> {
        let current = self
            .current_identity()
            .user()
            .cloned()
            .ok_or_else(|| AuthError::forbidden("no user session"))?;
        let _guard = self.begin(Operation::UpdateProfile)?;

        let response = self.inner.gateway.update_profile(update).await?;
        if response.id != current.id {
            return Err(AuthError::forbidden("profile response for a different user"));
        }

        // Client-editable fields come from the edit; verification signals are
        // the backend's call.
        let mut merged = current;
        update.apply_to(&mut merged);
        merged.verification_status = response.verification_status;
        merged.documents = response.documents;

        let expected_id = merged.id;
        let applied = self.commit_with(|snapshot| {
            let identity = snapshot.identity()?;
            if identity.user().map(|u| u.id) != Some(expected_id) {
                return None;
            }
            Some(SessionSnapshot::Ready(identity.clone().with_user(merged.clone())))
        });
        if !applied {
            return Err(AuthError::forbidden("session changed during profile update"));
        }

        tracing::info!(user_id = %merged.id, "profile updated");
        Ok(merged)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn publish(&self, event: SessionEvent) {
        let event_type = event.event_type();
        tracing::trace!(event_type, version = event.version(), "publishing session event");
        if let Err(err) = self.inner.bus.publish(event) {
            tracing::warn!(?err, event_type, "failed to publish session event");
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn current_identity(&self) -> Identity {
        self.snapshot().identity().cloned().unwrap_or_default()
    }

    fn begin(&self, operation: Operation) -> Result<InFlight<'_>, AuthError> {
        let mut set = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(operation) {
            return Err(AuthError::OperationInFlight(operation));
        }
        Ok(InFlight {
            set: &self.inner.in_flight,
            operation,
        })
    }

    /// Surface the outcome of a caller-initiated operation exactly once.
    fn settle<T>(&self, operation: Operation, result: Result<T, AuthError>) -> Result<T, AuthError> {
        let event = match &result {
            Ok(_) => SessionEvent::OperationSucceeded {
                operation,
                occurred_at: self.now(),
            },
            Err(err) => {
                tracing::warn!(%operation, error = %err, "session operation failed");
                SessionEvent::OperationFailed {
                    operation,
                    error: err.clone(),
                    occurred_at: self.now(),
                }
            }
        };
        self.publish(event);
        result
    }

    fn commit(&self, next: SessionSnapshot) {
        self.commit_with(|_| Some(next));
    }

    fn commit_if(&self, next: SessionSnapshot, accept: impl FnOnce(&SessionSnapshot) -> bool) -> bool {
        self.commit_with(|current| accept(current).then_some(next))
    }

    /// Atomically compute and install the next snapshot from the current one.
    /// Returns whether anything was committed.
    fn commit_with(&self, next: impl FnOnce(&SessionSnapshot) -> Option<SessionSnapshot>) -> bool {
        let _commit = self.inner.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
        let installed = {
            let mut slot = self.inner.snapshot.write().unwrap_or_else(|e| e.into_inner());
            match next(&slot) {
                Some(snapshot) => {
                    *slot = snapshot.clone();
                    Some(snapshot)
                }
                None => None,
            }
        };

        match installed {
            Some(snapshot) => {
                self.notify(&snapshot);
                true
            }
            None => false,
        }
    }

    /// End the session locally and return the snapshot it replaced.
    fn clear(&self) -> SessionSnapshot {
        let _commit = self.inner.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let next = SessionSnapshot::anonymous();
        let previous = {
            let mut slot = self.inner.snapshot.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, next.clone())
        };
        self.notify(&next);
        previous
    }

    /// Runs with `commit_lock` held and the snapshot lock released.
    fn notify(&self, snapshot: &SessionSnapshot) {
        let live: Vec<Arc<dyn SnapshotObserver>> = {
            let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.snapshot_changed(snapshot);
        }

        self.publish(SessionEvent::SnapshotChanged {
            snapshot: snapshot.clone(),
            occurred_at: self.now(),
        });
    }
}
