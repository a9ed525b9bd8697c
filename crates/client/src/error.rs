//! Transport errors and their mapping onto the session error taxonomy.

use thiserror::Error;

use portal_auth::AuthError;

/// Backend endpoints the gateway calls. The same HTTP status means different
/// things on different endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    AdminLogin,
    Status,
    Logout,
    UpdateProfile,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Login => "/api/auth/login",
            Endpoint::AdminLogin => "/api/admin/login",
            Endpoint::Status => "/api/auth/status",
            Endpoint::Logout => "/api/auth/logout",
            Endpoint::UpdateProfile => "/api/users/profile",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Parse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl GatewayError {
    /// Classify for the session layer.
    ///
    /// - 401 on a login endpoint: wrong email or password
    /// - 401 elsewhere: the backend has no session for us
    /// - 403: authenticated but not allowed
    /// - anything else (transport, 5xx, unreadable body): network failure
    pub fn into_auth_error(self, endpoint: Endpoint) -> AuthError {
        match self {
            GatewayError::Api { status: 401, .. } => match endpoint {
                Endpoint::Login | Endpoint::AdminLogin => AuthError::InvalidCredentials,
                Endpoint::Status | Endpoint::Logout | Endpoint::UpdateProfile => {
                    AuthError::Unauthenticated
                }
            },
            GatewayError::Api {
                status: 403,
                message,
            } => AuthError::forbidden(if message.is_empty() {
                "access denied".to_string()
            } else {
                message
            }),
            other => AuthError::network(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> GatewayError {
        GatewayError::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn unauthorized_depends_on_endpoint() {
        assert_eq!(api(401).into_auth_error(Endpoint::Login), AuthError::InvalidCredentials);
        assert_eq!(
            api(401).into_auth_error(Endpoint::AdminLogin),
            AuthError::InvalidCredentials
        );
        assert_eq!(api(401).into_auth_error(Endpoint::Status), AuthError::Unauthenticated);
        assert_eq!(
            api(401).into_auth_error(Endpoint::UpdateProfile),
            AuthError::Unauthenticated
        );
    }

    #[test]
    fn forbidden_keeps_backend_message() {
        let err = GatewayError::Api {
            status: 403,
            message: "account locked".to_string(),
        };
        assert_eq!(
            err.into_auth_error(Endpoint::Login),
            AuthError::forbidden("account locked")
        );
        assert_eq!(
            api(403).into_auth_error(Endpoint::Status),
            AuthError::forbidden("access denied")
        );
    }

    #[test]
    fn everything_else_is_a_network_failure() {
        for err in [
            api(500),
            api(502),
            api(404),
            GatewayError::Network("connection refused".to_string()),
            GatewayError::Parse("expected value".to_string()),
        ] {
            assert!(matches!(
                err.into_auth_error(Endpoint::Status),
                AuthError::NetworkFailure(_)
            ));
        }
    }
}
