//! Structured session events for the presentation layer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use portal_core::UserId;
use portal_events::{Event, InMemoryEventBus};

use crate::gateway::{AuthError, Operation};
use crate::session::SessionSnapshot;
use crate::verification::VerificationMessage;

/// Bus type shared by the store, monitor and deduplicator.
pub type SessionBus = InMemoryEventBus<SessionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    UserInitiated,
    /// The admin session lifetime ran out.
    Expired,
    /// Extending the admin session was refused.
    ExtendFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SnapshotChanged {
        snapshot: SessionSnapshot,
        occurred_at: DateTime<Utc>,
    },
    /// Clears any error previously shown for `operation`.
    OperationSucceeded {
        operation: Operation,
        occurred_at: DateTime<Utc>,
    },
    OperationFailed {
        operation: Operation,
        error: AuthError,
        occurred_at: DateTime<Utc>,
    },
    LoggedOut {
        reason: LogoutReason,
        occurred_at: DateTime<Utc>,
    },
    /// Raised once per armed admin session.
    ExpiryWarning {
        remaining_ms: i64,
        occurred_at: DateTime<Utc>,
    },
    SessionExpired {
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    VerificationNotice {
        user_id: UserId,
        message: VerificationMessage,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for SessionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SnapshotChanged { .. } => "session.snapshot_changed",
            SessionEvent::OperationSucceeded { .. } => "session.operation_succeeded",
            SessionEvent::OperationFailed { .. } => "session.operation_failed",
            SessionEvent::LoggedOut { .. } => "session.logged_out",
            SessionEvent::ExpiryWarning { .. } => "session.expiry_warning",
            SessionEvent::SessionExpired { .. } => "session.expired",
            SessionEvent::VerificationNotice { .. } => "verification.notice",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::SnapshotChanged { occurred_at, .. }
            | SessionEvent::OperationSucceeded { occurred_at, .. }
            | SessionEvent::OperationFailed { occurred_at, .. }
            | SessionEvent::LoggedOut { occurred_at, .. }
            | SessionEvent::ExpiryWarning { occurred_at, .. }
            | SessionEvent::SessionExpired { occurred_at, .. }
            | SessionEvent::VerificationNotice { occurred_at, .. } => *occurred_at,
        }
    }
}
