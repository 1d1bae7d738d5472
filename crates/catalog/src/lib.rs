//! Service catalog reference data.
//!
//! Billable port services and the computer-fee ("redevance informatique") rate.
//! Owned by the catalog collaborator; read-only for invoicing.

pub mod redevance;
pub mod service;

pub use redevance::RedevanceRate;
pub use service::{PricingMode, ServiceDefinition, TierRates};
