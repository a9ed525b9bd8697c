//! reqwest-backed [`AuthGateway`].
//!
//! The backend keeps the session in an HTTP-only cookie, so the client carries
//! a cookie store and never sees a token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use portal_auth::{AdminIdentity, AuthError, AuthGateway, Credentials, Identity, ProfileUpdate, UserIdentity};

use crate::error::{Endpoint, GatewayError};

/// Body of `GET /api/auth/status`. Either dimension may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub user: Option<UserIdentity>,
    #[serde(default)]
    pub admin: Option<AdminIdentity>,
}

impl From<StatusResponse> for Identity {
    fn from(status: StatusResponse) -> Self {
        let identity = match status.user {
            Some(user) => Identity::User(user),
            None => Identity::Anonymous,
        };
        match status.admin {
            Some(admin) => identity.with_admin(admin),
            None => identity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpAuthGateway {
    client: Client,
    base_url: String,
}

impl HttpAuthGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T, GatewayError> {
        let response = self.client.get(self.url(endpoint)).send().await?;
        handle_response(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: &B,
    ) -> Result<T, GatewayError> {
        let response = self.client.post(self.url(endpoint)).json(body).send().await?;
        handle_response(response).await
    }

    async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: &B,
    ) -> Result<T, GatewayError> {
        let response = self.client.patch(self.url(endpoint)).json(body).send().await?;
        handle_response(response).await
    }

    /// POST without a meaningful response body.
    async fn post_empty(&self, endpoint: Endpoint) -> Result<(), GatewayError> {
        let response = self.client.post(self.url(endpoint)).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GatewayError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        Err(GatewayError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

fn logged(endpoint: Endpoint) -> impl FnOnce(GatewayError) -> AuthError {
    move |err| {
        tracing::debug!(path = endpoint.path(), error = %err, "auth backend call failed");
        err.into_auth_error(endpoint)
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        self.post(Endpoint::Login, credentials)
            .await
            .map_err(logged(Endpoint::Login))
    }

    async fn admin_login(&self, credentials: &Credentials) -> Result<AdminIdentity, AuthError> {
        self.post(Endpoint::AdminLogin, credentials)
            .await
            .map_err(logged(Endpoint::AdminLogin))
    }

    async fn check_status(&self) -> Result<Identity, AuthError> {
        self.get::<StatusResponse>(Endpoint::Status)
            .await
            .map(Identity::from)
            .map_err(logged(Endpoint::Status))
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.post_empty(Endpoint::Logout)
            .await
            .map_err(logged(Endpoint::Logout))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserIdentity, AuthError> {
        self.patch(Endpoint::UpdateProfile, update)
            .await
            .map_err(logged(Endpoint::UpdateProfile))
    }
}
