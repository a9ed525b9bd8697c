//! `portal-core`: shared building blocks for the portal session core.
//!
//! This crate contains **pure** primitives (no IO, no async runtime).

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{AdminId, UserId};
