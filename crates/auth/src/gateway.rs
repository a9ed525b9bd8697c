//! Backend authentication contract and error taxonomy.
//!
//! The session core never talks HTTP itself; it is handed an [`AuthGateway`]
//! and treats every call as fallible and slow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use portal_core::{DomainError, DomainResult};

use crate::identity::{AdminIdentity, Identity, UserIdentity};

// ─────────────────────────────────────────────────────────────────────────────
// Operations & errors
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-initiated session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Bootstrap,
    Login,
    AdminLogin,
    Refresh,
    UpdateProfile,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Bootstrap => "bootstrap",
            Operation::Login => "login",
            Operation::AdminLogin => "admin_login",
            Operation::Refresh => "refresh",
            Operation::UpdateProfile => "update_profile",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("session expired")]
    SessionExpired,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The backend has no session for this client.
    #[error("not authenticated")]
    Unauthenticated,

    #[error(transparent)]
    Validation(#[from] DomainError),

    /// The same operation is already awaiting the backend.
    #[error("{0} already in progress")]
    OperationInFlight(Operation),
}

impl AuthError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Email/password pair submitted by a login form.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_lowercase(),
            password: password.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Reject obviously malformed input before it reaches the backend.
    pub fn validate(&self) -> DomainResult<()> {
        if self.email.is_empty() || !self.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if self.password.is_empty() {
            return Err(DomainError::validation("password cannot be empty"));
        }
        Ok(())
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Partial profile edit. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// An empty string removes the payout wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl ProfileUpdate {
    /// Merge the client-editable fields into `user`.
    pub fn apply_to(&self, user: &mut UserIdentity) {
        if let Some(name) = &self.display_name {
            user.display_name = non_blank(name);
        }
        if let Some(phone) = &self.phone {
            user.phone = non_blank(phone);
        }
        if let Some(wallet) = &self.wallet_address {
            user.wallet_address = non_blank(wallet);
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway contract
// ─────────────────────────────────────────────────────────────────────────────

/// Backend authentication/verification service.
///
/// Implementations must not retry on their own; a retry is always a fresh
/// caller-initiated call.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError>;

    async fn admin_login(&self, credentials: &Credentials) -> Result<AdminIdentity, AuthError>;

    /// Restore whatever session the backend still recognises for this client.
    ///
    /// `Identity::Anonymous` and `Err(AuthError::Unauthenticated)` mean the same
    /// thing to callers.
    async fn check_status(&self) -> Result<Identity, AuthError>;

    /// Revoke the backend session. Best-effort.
    async fn logout(&self) -> Result<(), AuthError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserIdentity, AuthError>;
}
