//! Verification messaging.
//!
//! Derives the single notice an unverified investor should see from the
//! document sub-statuses and wallet presence. None of these signals gate
//! anything; gating reads `verification_status` alone (see `guard`).

use serde::Serialize;

use crate::identity::{DocumentKind, DocumentStatus, UserIdentity, VerificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Both documents verified, no payout wallet on file.
    WalletMissing,
    /// Both documents verified and a wallet is present; awaiting backend promotion.
    FinalReview,
    UnderReview,
    Rejected,
    UploadRequired,
}

impl MessageKind {
    pub fn severity(&self) -> Severity {
        match self {
            MessageKind::FinalReview | MessageKind::UnderReview => Severity::Info,
            MessageKind::WalletMissing | MessageKind::Rejected | MessageKind::UploadRequired => {
                Severity::Warn
            }
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            MessageKind::WalletMissing => {
                "documents verified; add a payout wallet address to finish verification"
            }
            MessageKind::FinalReview => "documents verified and under final review",
            MessageKind::UnderReview => "documents are under review",
            MessageKind::Rejected => "documents were rejected; re-upload to continue",
            MessageKind::UploadRequired => "upload identity documents to continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationMessage {
    pub kind: MessageKind,
    pub severity: Severity,
    pub text: &'static str,
    /// Backend-supplied rejection reasons, `"<doc>: <reason>"`, when rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl VerificationMessage {
    fn of(kind: MessageKind) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            text: kind.text(),
            detail: None,
        }
    }
}

/// The notice for `user`, or `None` once the account is verified.
pub fn message(user: &UserIdentity) -> Option<VerificationMessage> {
    if user.is_verified() {
        return None;
    }

    let aadhaar_verified = user.document_status(DocumentKind::Aadhaar) == DocumentStatus::Verified;
    let pan_verified = user.document_status(DocumentKind::Pan) == DocumentStatus::Verified;

    if aadhaar_verified && pan_verified {
        let kind = if user.has_wallet() {
            MessageKind::FinalReview
        } else {
            MessageKind::WalletMissing
        };
        return Some(VerificationMessage::of(kind));
    }

    let message = match user.verification_status {
        VerificationStatus::Pending => VerificationMessage::of(MessageKind::UnderReview),
        VerificationStatus::Rejected => VerificationMessage {
            detail: rejection_detail(user),
            ..VerificationMessage::of(MessageKind::Rejected)
        },
        VerificationStatus::Unverified | VerificationStatus::Verified => {
            VerificationMessage::of(MessageKind::UploadRequired)
        }
    };
    Some(message)
}

fn rejection_detail(user: &UserIdentity) -> Option<String> {
    let reasons: Vec<String> = user
        .documents
        .iter()
        .filter_map(|(kind, doc)| {
            doc.rejection_reason
                .as_deref()
                .map(|reason| format!("{}: {}", kind.as_str(), reason))
        })
        .collect();

    (!reasons.is_empty()).then(|| reasons.join("; "))
}
