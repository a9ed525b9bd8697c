//! Application context wiring the session core together.

use std::sync::Arc;

use anyhow::Context;

use portal_auth::{
    AccessGuard, AuthGateway, Decision, FileKeyStore, InMemoryKeyStore, KeyStore,
    NotificationDeduplicator, RouteRequirements, SessionBus, SessionExpiryMonitor,
    SessionSnapshot, SessionStore,
};
use portal_core::{Clock, SystemClock};

use crate::config::PortalConfig;
use crate::http::HttpAuthGateway;

/// One client context: a session store plus everything that follows it.
///
/// Lifecycle: [`Portal::start`] restores the session, [`Portal::shutdown`]
/// stops the expiry ticker. Dropping the portal also stops it.
#[derive(Debug)]
pub struct Portal {
    config: PortalConfig,
    store: SessionStore,
    guard: AccessGuard,
    monitor: SessionExpiryMonitor,
    notifications: Arc<NotificationDeduplicator>,
}

impl Portal {
    /// Wire a portal against the real backend described by `config`.
    pub fn from_config(config: PortalConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid portal configuration")?;

        let gateway = HttpAuthGateway::new(&config.api_base_url, config.request_timeout())
            .context("failed to build HTTP client for the auth backend")?;

        let keys: Box<dyn KeyStore> = match config
            .notification_key_path
            .clone()
            .or_else(FileKeyStore::default_path)
        {
            Some(path) => Box::new(FileKeyStore::new(path)),
            None => {
                tracing::warn!("no data directory; verification notices will repeat across restarts");
                Box::new(InMemoryKeyStore::new())
            }
        };

        Ok(Self::new(config, Arc::new(gateway), keys, Arc::new(SystemClock)))
    }

    pub fn new(
        config: PortalConfig,
        gateway: Arc<dyn AuthGateway>,
        keys: Box<dyn KeyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = SessionStore::new(gateway, Arc::new(SessionBus::new()), clock);
        let guard = AccessGuard::new(config.routes.clone());
        let monitor = SessionExpiryMonitor::attach(&store, config.monitor);
        let notifications = NotificationDeduplicator::attach(&store, keys);

        Self {
            config,
            store,
            guard,
            monitor,
            notifications,
        }
    }

    /// Restore the session from the backend. The expiry monitor arms itself
    /// if an admin grant comes back.
    pub async fn start(&self) -> SessionSnapshot {
        self.store.bootstrap().await;
        let snapshot = self.store.snapshot();
        tracing::info!(
            identity = snapshot.identity().map(|identity| identity.kind()).unwrap_or("loading"),
            api = %self.config.api_base_url,
            "portal started"
        );
        snapshot
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn monitor(&self) -> &SessionExpiryMonitor {
        &self.monitor
    }

    pub fn notifications(&self) -> &NotificationDeduplicator {
        &self.notifications
    }

    /// Evaluate a route against the current snapshot.
    pub fn evaluate(&self, requirements: RouteRequirements) -> Decision {
        self.guard.evaluate(requirements, &self.store.snapshot())
    }

    pub async fn logout(&self) {
        self.store.logout().await;
    }

    pub fn shutdown(&self) {
        self.monitor.dispose();
        tracing::info!("portal shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use portal_auth::testing::{FakeGateway, TokioClock};
    use portal_auth::{
        AdminIdentity, Credentials, ExpiryState, Identity, SessionEvent, UserIdentity,
        VerificationStatus,
    };
    use portal_core::{AdminId, UserId};

    fn portal(gateway: Arc<FakeGateway>, clock: Arc<dyn Clock>) -> Portal {
        Portal::new(
            PortalConfig::default(),
            gateway,
            Box::new(InMemoryKeyStore::new()),
            clock,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn start_restores_admin_and_arms_monitor() {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let gateway = Arc::new(FakeGateway::new());
        let admin = AdminIdentity {
            id: AdminId::new(),
            email: "ops@example.com".to_string(),
            session_expiry: clock.now() + Duration::minutes(15),
        };
        gateway.set_status(Ok(Identity::Anonymous.with_admin(admin)));

        let portal = portal(gateway, clock);
        assert_eq!(portal.evaluate(RouteRequirements::admin()), Decision::Pending);

        portal.start().await;
        assert_eq!(portal.evaluate(RouteRequirements::admin()), Decision::Allow);
        assert_eq!(portal.monitor().state(), ExpiryState::Armed);

        portal.shutdown();
        assert_eq!(portal.monitor().state(), ExpiryState::Idle);
    }

    #[tokio::test]
    async fn failed_start_is_anonymous() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.set_status(Err(portal_auth::AuthError::network("connection refused")));
        let portal = portal(gateway, Arc::new(SystemClock));

        portal.start().await;

        assert_eq!(
            portal.evaluate(RouteRequirements::verified()),
            Decision::Redirect("/login".to_string())
        );
    }

    #[tokio::test]
    async fn investor_journey_through_the_portal() {
        let gateway = Arc::new(FakeGateway::new());
        let portal = portal(gateway.clone(), Arc::new(SystemClock));
        let events = portal.store().subscribe();
        portal.start().await;

        let user = UserIdentity::new(UserId::new(), "investor@example.com")
            .with_status(VerificationStatus::Pending);
        gateway.set_login(Ok(user.clone()));
        portal
            .store()
            .login(&Credentials::new("investor@example.com", "pw"))
            .await
            .unwrap();

        assert_eq!(
            portal.evaluate(RouteRequirements::verified()),
            Decision::Redirect("/profile".to_string())
        );
        assert!(portal.notifications().show(&user).displayed);
        assert!(!portal.notifications().show(&user).displayed);

        portal.logout().await;
        assert_eq!(
            portal.evaluate(RouteRequirements::authenticated()),
            Decision::Redirect("/login".to_string())
        );
        // A fresh session sees the notice again.
        assert!(portal.notifications().show(&user).displayed);

        let notices = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::VerificationNotice { .. }))
            .count();
        assert_eq!(notices, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_portal_stops_the_ticker() {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let gateway = Arc::new(FakeGateway::new());
        gateway.set_status(Ok(Identity::Anonymous.with_admin(AdminIdentity {
            id: AdminId::new(),
            email: "ops@example.com".to_string(),
            session_expiry: clock.now() + Duration::seconds(5),
        })));

        let portal = portal(gateway.clone(), clock);
        portal.start().await;
        drop(portal);

        tokio::time::sleep(StdDuration::from_secs(30)).await;
        assert_eq!(gateway.calls().logout, 0);
    }

    #[test]
    fn from_config_rejects_bad_urls() {
        let config = PortalConfig {
            api_base_url: "localhost".to_string(),
            ..PortalConfig::default()
        };
        assert!(Portal::from_config(config).is_err());
    }

    #[test]
    fn from_config_uses_the_configured_key_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = PortalConfig {
            notification_key_path: Some(dir.path().join("notice.json")),
            ..PortalConfig::default()
        };
        let portal = Portal::from_config(config).unwrap();
        assert_eq!(portal.config().api_base_url, "http://localhost:8080");
    }
}
