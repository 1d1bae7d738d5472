//! Audit events and their distribution.
//!
//! Workflow decisions are recorded as immutable facts (`Event`), wrapped with
//! stream metadata (`EventEnvelope`) and fanned out to consumers (`EventBus`).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
