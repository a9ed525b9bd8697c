//! `portal-client`: binds the session core to the real backend.
//!
//! Contains the HTTP gateway, configuration loading and the [`Portal`]
//! application context.

pub mod config;
pub mod error;
pub mod http;
pub mod portal;

pub use config::{ConfigError, PortalConfig};
pub use error::{Endpoint, GatewayError};
pub use http::{HttpAuthGateway, StatusResponse};
pub use portal::Portal;
