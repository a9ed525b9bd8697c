//! `portal-auth`: identity, session and authorization core of the investor
//! portal front end.
//!
//! This crate owns session state and navigation decisions. It never renders
//! anything and reaches the backend only through the [`AuthGateway`] trait.

pub mod config;
pub mod events;
pub mod gateway;
pub mod guard;
pub mod identity;
pub mod monitor;
pub mod notification;
pub mod session;
pub mod verification;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{MonitorConfig, RoutePaths};
pub use events::{LogoutReason, SessionBus, SessionEvent};
pub use gateway::{AuthError, AuthGateway, Credentials, Operation, ProfileUpdate};
pub use guard::{AccessGuard, Decision, GuardExplanation, GuardRule, RouteRequirements};
pub use identity::{
    AdminIdentity, DocumentKind, DocumentRecord, DocumentStatus, Identity, UserIdentity,
    VerificationStatus,
};
pub use monitor::{ExpiryState, ExpiryTracker, SessionExpiryMonitor, TickOutcome};
pub use notification::{
    FileKeyStore, InMemoryKeyStore, KeyStore, NotificationDeduplicator, NotificationKey,
    ShowOutcome, StorageError,
};
pub use session::{SessionSnapshot, SessionStore, SnapshotObserver};
pub use verification::{MessageKind, Severity, VerificationMessage};
