//! Infrastructure layer: collaborator contracts, in-memory adapters, config
//! and the invoicing orchestration.

pub mod config;
pub mod invoicing_service;
pub mod store;


pub use config::{ConfigError, InvoicingConfig};
pub use invoicing_service::{CatalogSnapshot, InvoicingError, InvoicingResult, InvoicingService};
pub use store::{
    InMemoryLineItemStore, InMemoryServiceCatalog, LineItemRepository, PersistenceError,
    ServiceCatalog,
};
