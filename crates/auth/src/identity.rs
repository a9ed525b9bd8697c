//! Identity model.
//!
//! An identity is a closed variant: anonymous visitor, investor, or an admin
//! grant (optionally alongside an investor in the same client context). Which
//! fields are meaningful for which kind is decided by the type, so a session
//! expiry can only ever be read off an admin grant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portal_core::{AdminId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Verification signals
// ─────────────────────────────────────────────────────────────────────────────

/// Account-level verification status, as decided by the backend.
///
/// This is the only signal that gates verification-required routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity documents tracked per investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Aadhaar,
    Pan,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Aadhaar => "aadhaar",
            DocumentKind::Pan => "pan",
        }
    }
}

/// Review state of a single uploaded document. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    NotUploaded,
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl DocumentRecord {
    pub fn new(status: DocumentStatus) -> Self {
        Self {
            status,
            rejection_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: DocumentStatus::Rejected,
            rejection_reason: Some(reason.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identities
// ─────────────────────────────────────────────────────────────────────────────

/// An authenticated investor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub documents: BTreeMap<DocumentKind, DocumentRecord>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

impl UserIdentity {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            display_name: None,
            phone: None,
            verification_status: VerificationStatus::Unverified,
            documents: BTreeMap::new(),
            wallet_address: None,
        }
    }

    pub fn with_status(mut self, status: VerificationStatus) -> Self {
        self.verification_status = status;
        self
    }

    pub fn with_document(mut self, kind: DocumentKind, record: DocumentRecord) -> Self {
        self.documents.insert(kind, record);
        self
    }

    pub fn with_wallet(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }

    /// Status of a document; a missing entry reads as `NotUploaded`.
    pub fn document_status(&self, kind: DocumentKind) -> DocumentStatus {
        self.documents
            .get(&kind)
            .map(|doc| doc.status)
            .unwrap_or_default()
    }

    /// A blank address is the same as no address.
    pub fn has_wallet(&self) -> bool {
        self.wallet_address
            .as_deref()
            .is_some_and(|addr| !addr.trim().is_empty())
    }
}

/// An authenticated administrator with a finite session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub id: AdminId,
    pub email: String,
    pub session_expiry: DateTime<Utc>,
}

/// The current visitor's authenticated state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    #[default]
    Anonymous,
    User(UserIdentity),
    Admin {
        admin: AdminIdentity,
        #[serde(default)]
        user: Option<UserIdentity>,
    },
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    /// The investor dimension, whether primary or alongside an admin grant.
    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
            Identity::Admin { user, .. } => user.as_ref(),
        }
    }

    pub fn admin(&self) -> Option<&AdminIdentity> {
        match self {
            Identity::Admin { admin, .. } => Some(admin),
            _ => None,
        }
    }

    pub fn session_expiry(&self) -> Option<DateTime<Utc>> {
        self.admin().map(|admin| admin.session_expiry)
    }

    /// Replace (or add) the investor dimension, keeping any admin grant.
    pub fn with_user(self, user: UserIdentity) -> Identity {
        match self {
            Identity::Admin { admin, .. } => Identity::Admin {
                admin,
                user: Some(user),
            },
            Identity::Anonymous | Identity::User(_) => Identity::User(user),
        }
    }

    /// Replace (or add) the admin grant, keeping any investor dimension.
    pub fn with_admin(self, admin: AdminIdentity) -> Identity {
        let user = match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
            Identity::Admin { user, .. } => user,
        };
        Identity::Admin { admin, user }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Anonymous => "anonymous",
            Identity::User(_) => "user",
            Identity::Admin { user: None, .. } => "admin",
            Identity::Admin { user: Some(_), .. } => "admin+user",
        }
    }
}
