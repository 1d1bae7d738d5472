//! Collaborator boundary for catalog lookups and line-item persistence.
//!
//! The traits make no storage assumptions. In-memory implementations back
//! tests and local runs; a real backend only needs to honor the same
//! all-or-nothing write semantics.

pub mod catalog;
pub mod in_memory;
pub mod r#trait;

pub use catalog::InMemoryServiceCatalog;
pub use in_memory::InMemoryLineItemStore;
pub use r#trait::{LineItemRepository, PersistenceError, ServiceCatalog};
