//! Test doubles: a scripted gateway and a clock that follows tokio time.

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use portal_core::Clock;

use crate::gateway::{AuthError, AuthGateway, Credentials, ProfileUpdate};
use crate::identity::{AdminIdentity, Identity, UserIdentity};

/// How often each gateway method was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub login: usize,
    pub admin_login: usize,
    pub check_status: usize,
    pub logout: usize,
    pub update_profile: usize,
}

#[derive(Debug)]
struct Script {
    login: Result<UserIdentity, AuthError>,
    admin_login: Result<AdminIdentity, AuthError>,
    status: Result<Identity, AuthError>,
    logout: Result<(), AuthError>,
    update_profile: Result<UserIdentity, AuthError>,
    latency: Option<StdDuration>,
    calls: GatewayCalls,
}

/// Gateway that answers every call with the last scripted response.
///
/// Unscripted calls fail the way an unreachable backend would
/// (`Unauthenticated` for status, `InvalidCredentials` for logins).
#[derive(Debug)]
pub struct FakeGateway {
    script: Mutex<Script>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                login: Err(AuthError::InvalidCredentials),
                admin_login: Err(AuthError::InvalidCredentials),
                status: Err(AuthError::Unauthenticated),
                logout: Ok(()),
                update_profile: Err(AuthError::network("unscripted")),
                latency: None,
                calls: GatewayCalls::default(),
            }),
        }
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut script)
    }

    pub fn set_login(&self, response: Result<UserIdentity, AuthError>) {
        self.with_script(|s| s.login = response);
    }

    pub fn set_admin_login(&self, response: Result<AdminIdentity, AuthError>) {
        self.with_script(|s| s.admin_login = response);
    }

    pub fn set_status(&self, response: Result<Identity, AuthError>) {
        self.with_script(|s| s.status = response);
    }

    pub fn set_logout(&self, response: Result<(), AuthError>) {
        self.with_script(|s| s.logout = response);
    }

    pub fn set_update_profile(&self, response: Result<UserIdentity, AuthError>) {
        self.with_script(|s| s.update_profile = response);
    }

    /// Delay every response by `latency` (tokio time).
    pub fn set_latency(&self, latency: StdDuration) {
        self.with_script(|s| s.latency = Some(latency));
    }

    pub fn calls(&self) -> GatewayCalls {
        self.with_script(|s| s.calls)
    }

    async fn respond<T>(
        &self,
        pick: impl FnOnce(&mut Script) -> Result<T, AuthError>,
    ) -> Result<T, AuthError> {
        let (response, latency) = self.with_script(|s| (pick(s), s.latency));
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        response
    }
}

#[async_trait]
impl AuthGateway for FakeGateway {
    async fn login(&self, _credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        self.respond(|s| {
            s.calls.login += 1;
            s.login.clone()
        })
        .await
    }

    async fn admin_login(&self, _credentials: &Credentials) -> Result<AdminIdentity, AuthError> {
        self.respond(|s| {
            s.calls.admin_login += 1;
            s.admin_login.clone()
        })
        .await
    }

    async fn check_status(&self) -> Result<Identity, AuthError> {
        self.respond(|s| {
            s.calls.check_status += 1;
            s.status.clone()
        })
        .await
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.respond(|s| {
            s.calls.logout += 1;
            s.logout.clone()
        })
        .await
    }

    async fn update_profile(&self, _update: &ProfileUpdate) -> Result<UserIdentity, AuthError> {
        self.respond(|s| {
            s.calls.update_profile += 1;
            s.update_profile.clone()
        })
        .await
    }
}

/// Wall clock that advances with tokio's (pausable) clock.
///
/// Under `#[tokio::test(start_paused = true)]` this lets timer-driven code and
/// absolute expiry timestamps move in lockstep.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin_wall: Utc::now(),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.origin);
        self.origin_wall + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
