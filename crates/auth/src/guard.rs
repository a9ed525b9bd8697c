//! Navigation guard.
//!
//! - No IO
//! - No panics
//! - Pure: the same requirements and snapshot always produce the same decision

use serde::{Deserialize, Serialize};

use crate::config::RoutePaths;
use crate::identity::Identity;
use crate::session::SessionSnapshot;
use crate::verification::{self, VerificationMessage};

/// What a route demands of the visitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRequirements {
    pub require_admin: bool,
    pub require_verification: bool,
}

impl RouteRequirements {
    /// Any signed-in investor.
    pub const fn authenticated() -> Self {
        Self {
            require_admin: false,
            require_verification: false,
        }
    }

    /// Investment routes: the account must be verified.
    pub const fn verified() -> Self {
        Self {
            require_admin: false,
            require_verification: true,
        }
    }

    pub const fn admin() -> Self {
        Self {
            require_admin: true,
            require_verification: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "decision", content = "path", rename_all = "snake_case")]
pub enum Decision {
    /// Session still loading; render nothing and do not redirect.
    Pending,
    Allow,
    Redirect(String),
}

/// Which rule produced a decision. Rules are checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardRule {
    Loading,
    Anonymous,
    AdminRequired,
    AdminOnlySession,
    VerificationRequired,
    Granted,
}

/// A decision plus why it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardExplanation {
    pub decision: Decision,
    pub rule: GuardRule,
    pub reason: String,
    /// The notice to show alongside a verification redirect.
    pub verification: Option<VerificationMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    paths: RoutePaths,
}

impl AccessGuard {
    pub fn new(paths: RoutePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &RoutePaths {
        &self.paths
    }

    pub fn evaluate(&self, requirements: RouteRequirements, snapshot: &SessionSnapshot) -> Decision {
        self.decide(requirements, snapshot).0
    }

    /// Same decision as [`AccessGuard::evaluate`], with the rule that fired and a
    /// readable reason.
    pub fn explain(&self, requirements: RouteRequirements, snapshot: &SessionSnapshot) -> GuardExplanation {
        let (decision, rule) = self.decide(requirements, snapshot);
        let identity = snapshot.identity();

        let reason = match rule {
            GuardRule::Loading => "session is still loading".to_string(),
            GuardRule::Anonymous => "no authenticated session".to_string(),
            GuardRule::AdminRequired => format!(
                "route requires an admin session; current session is {}",
                identity.map(Identity::kind).unwrap_or("unknown")
            ),
            GuardRule::AdminOnlySession => {
                "admin-only session has no access to investor routes".to_string()
            }
            GuardRule::VerificationRequired => format!(
                "account verification status is {}",
                identity
                    .and_then(Identity::user)
                    .map(|user| user.verification_status.as_str())
                    .unwrap_or("unknown")
            ),
            GuardRule::Granted => "all route requirements met".to_string(),
        };

        let verification = match rule {
            GuardRule::VerificationRequired => identity
                .and_then(Identity::user)
                .and_then(verification::message),
            _ => None,
        };

        GuardExplanation {
            decision,
            rule,
            reason,
            verification,
        }
    }

    fn decide(&self, requirements: RouteRequirements, snapshot: &SessionSnapshot) -> (Decision, GuardRule) {
        let identity = match snapshot {
            SessionSnapshot::Loading => return (Decision::Pending, GuardRule::Loading),
            SessionSnapshot::Ready(identity) => identity,
        };

        if identity.is_anonymous() {
            let target = if requirements.require_admin {
                &self.paths.admin_login
            } else {
                &self.paths.login
            };
            return (Decision::Redirect(target.clone()), GuardRule::Anonymous);
        }

        if requirements.require_admin {
            if identity.admin().is_none() {
                return (
                    Decision::Redirect(self.paths.admin_login.clone()),
                    GuardRule::AdminRequired,
                );
            }
            // Admin grants carry no verification status.
            return (Decision::Allow, GuardRule::Granted);
        }

        let Some(user) = identity.user() else {
            return (
                Decision::Redirect(self.paths.admin_dashboard.clone()),
                GuardRule::AdminOnlySession,
            );
        };

        // `verification_status` is the only gate; document and wallet signals
        // never promote access.
        if requirements.require_verification && !user.is_verified() {
            return (
                Decision::Redirect(self.paths.profile.clone()),
                GuardRule::VerificationRequired,
            );
        }

        (Decision::Allow, GuardRule::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use portal_core::{AdminId, UserId};
    use proptest::prelude::*;

    use crate::identity::{
        AdminIdentity, DocumentKind, DocumentRecord, DocumentStatus, UserIdentity,
        VerificationStatus,
    };
    use crate::verification::MessageKind;

    fn guard() -> AccessGuard {
        AccessGuard::default()
    }

    fn user(status: VerificationStatus) -> UserIdentity {
        UserIdentity::new(UserId::new(), "investor@example.com").with_status(status)
    }

    fn admin() -> AdminIdentity {
        AdminIdentity {
            id: AdminId::new(),
            email: "ops@example.com".to_string(),
            session_expiry: Utc::now() + Duration::minutes(10),
        }
    }

    fn ready(identity: Identity) -> SessionSnapshot {
        SessionSnapshot::Ready(identity)
    }

    fn redirect(path: &str) -> Decision {
        Decision::Redirect(path.to_string())
    }

    #[test]
    fn loading_is_pending_for_every_route() {
        for req in [
            RouteRequirements::authenticated(),
            RouteRequirements::verified(),
            RouteRequirements::admin(),
        ] {
            assert_eq!(guard().evaluate(req, &SessionSnapshot::Loading), Decision::Pending);
        }
    }

    #[test]
    fn anonymous_goes_to_the_matching_login() {
        let snap = SessionSnapshot::anonymous();
        assert_eq!(guard().evaluate(RouteRequirements::verified(), &snap), redirect("/login"));
        assert_eq!(guard().evaluate(RouteRequirements::admin(), &snap), redirect("/admin/login"));
    }

    #[test]
    fn investors_cannot_reach_admin_routes() {
        let snap = ready(Identity::User(user(VerificationStatus::Verified)));
        assert_eq!(guard().evaluate(RouteRequirements::admin(), &snap), redirect("/admin/login"));
    }

    #[test]
    fn admin_only_session_is_sent_to_dashboard() {
        let snap = ready(Identity::Anonymous.with_admin(admin()));
        assert_eq!(
            guard().evaluate(RouteRequirements::authenticated(), &snap),
            redirect("/admin/dashboard")
        );
        assert_eq!(guard().evaluate(RouteRequirements::admin(), &snap), Decision::Allow);
    }

    #[test]
    fn admin_with_investor_uses_the_investor_gate() {
        let pending = ready(Identity::User(user(VerificationStatus::Pending)).with_admin(admin()));
        assert_eq!(guard().evaluate(RouteRequirements::verified(), &pending), redirect("/profile"));
        assert_eq!(guard().evaluate(RouteRequirements::authenticated(), &pending), Decision::Allow);

        let verified = ready(Identity::User(user(VerificationStatus::Verified)).with_admin(admin()));
        assert_eq!(guard().evaluate(RouteRequirements::verified(), &verified), Decision::Allow);
    }

    #[test]
    fn documents_and_wallet_never_open_the_gate() {
        let u = user(VerificationStatus::Pending)
            .with_document(DocumentKind::Aadhaar, DocumentRecord::new(DocumentStatus::Verified))
            .with_document(DocumentKind::Pan, DocumentRecord::new(DocumentStatus::Verified));
        let snap = ready(Identity::User(u));

        assert_eq!(guard().evaluate(RouteRequirements::verified(), &snap), redirect("/profile"));

        let explanation = guard().explain(RouteRequirements::verified(), &snap);
        assert_eq!(explanation.rule, GuardRule::VerificationRequired);
        assert_eq!(
            explanation.verification.map(|m| m.kind),
            Some(MessageKind::WalletMissing)
        );
    }

    #[test]
    fn custom_paths_are_honoured() {
        let guard = AccessGuard::new(RoutePaths {
            profile: "/kyc".to_string(),
            ..RoutePaths::default()
        });
        let snap = ready(Identity::User(user(VerificationStatus::Rejected)));
        assert_eq!(guard.evaluate(RouteRequirements::verified(), &snap), redirect("/kyc"));
    }

    #[test]
    fn explain_granted_has_no_notice() {
        let snap = ready(Identity::User(user(VerificationStatus::Verified)));
        let explanation = guard().explain(RouteRequirements::verified(), &snap);
        assert_eq!(explanation.decision, Decision::Allow);
        assert_eq!(explanation.rule, GuardRule::Granted);
        assert!(explanation.verification.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Properties
    // ─────────────────────────────────────────────────────────────────────────

    fn status_strategy() -> impl Strategy<Value = VerificationStatus> {
        prop_oneof![
            Just(VerificationStatus::Unverified),
            Just(VerificationStatus::Pending),
            Just(VerificationStatus::Verified),
            Just(VerificationStatus::Rejected),
        ]
    }

    fn document_strategy() -> impl Strategy<Value = DocumentStatus> {
        prop_oneof![
            Just(DocumentStatus::NotUploaded),
            Just(DocumentStatus::Pending),
            Just(DocumentStatus::Verified),
            Just(DocumentStatus::Rejected),
        ]
    }

    fn user_strategy() -> impl Strategy<Value = UserIdentity> {
        (
            status_strategy(),
            document_strategy(),
            document_strategy(),
            proptest::option::of("[a-f0-9]{0,8}"),
        )
            .prop_map(|(status, aadhaar, pan, wallet)| {
                let mut u = user(status)
                    .with_document(DocumentKind::Aadhaar, DocumentRecord::new(aadhaar))
                    .with_document(DocumentKind::Pan, DocumentRecord::new(pan));
                u.wallet_address = wallet;
                u
            })
    }

    fn requirements_strategy() -> impl Strategy<Value = RouteRequirements> {
        (any::<bool>(), any::<bool>()).prop_map(|(require_admin, require_verification)| {
            RouteRequirements {
                require_admin,
                require_verification,
            }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: only `verification_status` decides verification-required routes.
        #[test]
        fn verification_status_is_the_sole_gate(u in user_strategy()) {
            let verified = u.is_verified();
            let decision = guard().evaluate(RouteRequirements::verified(), &ready(Identity::User(u)));

            if verified {
                prop_assert_eq!(decision, Decision::Allow);
            } else {
                prop_assert_eq!(decision, redirect("/profile"));
            }
        }

        /// Property: evaluation is a pure function of its inputs.
        #[test]
        fn evaluate_is_pure(
            u in user_strategy(),
            req in requirements_strategy(),
            with_admin in any::<bool>(),
        ) {
            let identity = if with_admin {
                Identity::User(u).with_admin(admin())
            } else {
                Identity::User(u)
            };
            let snap = ready(identity);
            let g = guard();

            let first = g.evaluate(req, &snap);
            let second = g.evaluate(req, &snap.clone());
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first, g.explain(req, &snap).decision);
        }
    }
}
