//! `portal-events`: event contract and in-process pub/sub.
//!
//! The session core never renders anything itself: stores and monitors publish
//! structured events here and the presentation layer subscribes.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
