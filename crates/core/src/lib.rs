//! `portbill-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod level;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{LineItemId, ServiceId, UserId};
pub use level::ApprovalLevel;
pub use money::{round_ratio, Amount};
