//! Verification notice deduplication.
//!
//! A notice is shown once per distinct [`NotificationKey`]. The last-shown key
//! is the only state this crate persists.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use portal_core::{Clock, UserId};
use portal_events::EventBus;

use crate::events::{SessionBus, SessionEvent};
use crate::identity::{DocumentKind, DocumentStatus, Identity, UserIdentity, VerificationStatus};
use crate::session::{SessionSnapshot, SessionStore, SnapshotObserver};
use crate::verification;

/// Everything that can change which notice a user should see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationKey {
    pub user_id: UserId,
    pub verification_status: VerificationStatus,
    pub aadhaar_status: DocumentStatus,
    pub pan_status: DocumentStatus,
    pub has_wallet: bool,
}

impl NotificationKey {
    pub fn for_user(user: &UserIdentity) -> Self {
        Self {
            user_id: user.id,
            verification_status: user.verification_status,
            aadhaar_status: user.document_status(DocumentKind::Aadhaar),
            pan_status: user.document_status(DocumentKind::Pan),
            has_wallet: user.has_wallet(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("notification key storage io error: {0}")]
    Io(#[from] io::Error),

    #[error("notification key encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Persistence for the last-shown key.
pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<Option<NotificationKey>, StorageError>;
    fn save(&self, key: &NotificationKey) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    slot: Mutex<Option<NotificationKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<NotificationKey>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyStore for InMemoryKeyStore {
    fn load(&self) -> Result<Option<NotificationKey>, StorageError> {
        Ok(self.slot().clone())
    }

    fn save(&self, key: &NotificationKey) -> Result<(), StorageError> {
        *self.slot() = Some(key.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot() = None;
        Ok(())
    }
}

/// JSON file holding a single key. Writes go through a sibling temp file and
/// a rename.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{data_local_dir}/portal/verification-notice.json`, falling back to
    /// `~/.local/share` when the platform reports no data directory.
    pub fn default_path() -> Option<PathBuf> {
        let mut dir = dirs::data_local_dir().or_else(|| {
            dirs::home_dir().map(|mut home| {
                home.push(".local");
                home.push("share");
                home
            })
        })?;
        dir.push("portal");
        dir.push("verification-notice.json");
        Some(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<NotificationKey>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &NotificationKey) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(key)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShowOutcome {
    pub displayed: bool,
}

/// Shows a user's verification notice only when its key changed since the
/// last display.
pub struct NotificationDeduplicator {
    keys: Mutex<Box<dyn KeyStore>>,
    bus: Arc<SessionBus>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for NotificationDeduplicator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationDeduplicator").finish_non_exhaustive()
    }
}

impl NotificationDeduplicator {
    pub fn new(keys: Box<dyn KeyStore>, bus: Arc<SessionBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys: Mutex::new(keys),
            bus,
            clock,
        }
    }

    /// Build a deduplicator publishing on `store`'s bus and reset it whenever
    /// the session becomes anonymous.
    pub fn attach(store: &SessionStore, keys: Box<dyn KeyStore>) -> Arc<Self> {
        let dedup = Arc::new(Self::new(keys, store.bus().clone(), store.clock().clone()));
        let observer: std::sync::Weak<Self> = Arc::downgrade(&dedup);
        store.observe(observer);
        dedup
    }

    pub fn show(&self, user: &UserIdentity) -> ShowOutcome {
        let Some(message) = verification::message(user) else {
            return ShowOutcome { displayed: false };
        };

        let key = NotificationKey::for_user(user);
        let keys = self.keys();
        let last = keys.load().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read last verification notice; showing again");
            None
        });
        if last.as_ref() == Some(&key) {
            tracing::debug!(user_id = %user.id, "verification notice unchanged; suppressed");
            return ShowOutcome { displayed: false };
        }

        let event = SessionEvent::VerificationNotice {
            user_id: user.id,
            message,
            occurred_at: self.clock.now(),
        };
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(?err, "failed to publish verification notice");
        }
        if let Err(err) = keys.save(&key) {
            tracing::warn!(error = %err, "could not persist verification notice key");
        }

        ShowOutcome { displayed: true }
    }

    pub fn reset(&self) {
        if let Err(err) = self.keys().clear() {
            tracing::warn!(error = %err, "could not clear verification notice key");
        }
    }

    fn keys(&self) -> MutexGuard<'_, Box<dyn KeyStore>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotObserver for NotificationDeduplicator {
    fn snapshot_changed(&self, snapshot: &SessionSnapshot) {
        if let SessionSnapshot::Ready(Identity::Anonymous) = snapshot {
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use portal_core::ManualClock;

    use crate::gateway::Credentials;
    use crate::identity::DocumentRecord;
    use crate::testing::FakeGateway;
    use crate::verification::MessageKind;

    fn pending_user() -> UserIdentity {
        UserIdentity::new(UserId::new(), "investor@example.com")
            .with_status(VerificationStatus::Pending)
            .with_document(DocumentKind::Aadhaar, DocumentRecord::new(DocumentStatus::Verified))
            .with_document(DocumentKind::Pan, DocumentRecord::new(DocumentStatus::Verified))
    }

    fn dedup() -> (NotificationDeduplicator, Arc<SessionBus>) {
        let bus = Arc::new(SessionBus::new());
        let dedup = NotificationDeduplicator::new(
            Box::new(InMemoryKeyStore::new()),
            bus.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        (dedup, bus)
    }

    fn notices(events: Vec<SessionEvent>) -> Vec<MessageKind> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::VerificationNotice { message, .. } => Some(message.kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn unchanged_key_is_suppressed() {
        let (dedup, bus) = dedup();
        let events = bus.subscribe();
        let user = pending_user();

        assert!(dedup.show(&user).displayed);
        assert!(!dedup.show(&user).displayed);
        assert!(!dedup.show(&user).displayed);

        assert_eq!(notices(events.drain()), vec![MessageKind::WalletMissing]);
    }

    #[test]
    fn wallet_appearing_shows_the_next_notice() {
        let (dedup, bus) = dedup();
        let events = bus.subscribe();
        let user = pending_user();

        assert!(dedup.show(&user).displayed);
        let with_wallet = user.with_wallet("0xabc");
        assert!(dedup.show(&with_wallet).displayed);

        assert_eq!(
            notices(events.drain()),
            vec![MessageKind::WalletMissing, MessageKind::FinalReview]
        );
    }

    #[test]
    fn verified_users_get_no_notice() {
        let (dedup, _) = dedup();
        let user = pending_user().with_status(VerificationStatus::Verified);
        assert!(!dedup.show(&user).displayed);
    }

    #[test]
    fn reset_allows_the_same_notice_again() {
        let (dedup, _) = dedup();
        let user = pending_user();
        assert!(dedup.show(&user).displayed);
        dedup.reset();
        assert!(dedup.show(&user).displayed);
    }

    #[tokio::test]
    async fn logout_resets_the_key() {
        let clock = ManualClock::new(Utc::now());
        let gateway = Arc::new(FakeGateway::new());
        let store = SessionStore::new(gateway.clone(), Arc::new(SessionBus::new()), Arc::new(clock));
        let dedup = NotificationDeduplicator::attach(&store, Box::new(InMemoryKeyStore::new()));

        let user = pending_user();
        gateway.set_login(Ok(user.clone()));
        store.bootstrap().await;
        store.login(&Credentials::new("investor@example.com", "pw")).await.unwrap();

        assert!(dedup.show(&user).displayed);
        assert!(!dedup.show(&user).displayed);

        store.logout().await;
        assert!(dedup.show(&user).displayed);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notice.json");
        let key = NotificationKey::for_user(&pending_user());

        let store = FileKeyStore::new(&path);
        assert_eq!(store.load().unwrap(), None);
        store.save(&key).unwrap();

        let reopened = FileKeyStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(key));

        reopened.clear().unwrap();
        reopened.clear().unwrap();
        assert_eq!(reopened.load().unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.json");
        fs::write(&path, b"not json").unwrap();

        let err = FileKeyStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Encoding(_)));
    }

    #[test]
    fn file_backed_dedup_suppresses_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.json");
        let user = pending_user();
        let bus = Arc::new(SessionBus::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));

        let first = NotificationDeduplicator::new(Box::new(FileKeyStore::new(&path)), bus.clone(), clock.clone());
        assert!(first.show(&user).displayed);

        let second = NotificationDeduplicator::new(Box::new(FileKeyStore::new(&path)), bus, clock);
        assert!(!second.show(&user).displayed);
    }
}
