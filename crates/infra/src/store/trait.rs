use std::sync::Arc;

use thiserror::Error;

use portbill_catalog::{RedevanceRate, ServiceDefinition};
use portbill_core::{LineItemId, UserId};
use portbill_invoicing::{InvoiceNumber, ServiceLineItem, ShipmentCode};

/// Collaborator call failure.
///
/// These are infrastructure errors, surfaced to the caller unchanged. They
/// never imply a rollback of the caller's in-memory state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by storage: {0}")]
    Rejected(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Read-only reference data owned by the catalog collaborator.
pub trait ServiceCatalog: Send + Sync {
    /// Active services, in catalog order.
    fn list_active_services(&self) -> Result<Vec<ServiceDefinition>, PersistenceError>;

    fn current_redevance_rate(&self) -> Result<RedevanceRate, PersistenceError>;
}

/// Line-item persistence.
///
/// Every write touches all affected lines or none of them. Validation
/// transitions are bulk updates across every line of an invoice.
pub trait LineItemRepository: Send + Sync {
    /// Create or update the lines of one shipment, keyed by existing ids.
    ///
    /// Returns the invoice number the batch belongs to and the saved lines
    /// with their identities assigned.
    fn save_group(
        &self,
        shipment_code: &ShipmentCode,
        items: &[ServiceLineItem],
    ) -> Result<(InvoiceNumber, Vec<ServiceLineItem>), PersistenceError>;

    fn update_item(
        &self,
        id: LineItemId,
        item: &ServiceLineItem,
    ) -> Result<ServiceLineItem, PersistenceError>;

    fn delete_item(&self, id: LineItemId) -> Result<(), PersistenceError>;

    fn validate_level1(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> Result<(), PersistenceError>;

    /// Clears both levels.
    fn invalidate_level1(&self, invoice_number: &InvoiceNumber) -> Result<(), PersistenceError>;

    fn validate_level2(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> Result<(), PersistenceError>;

    fn invalidate_level2(&self, invoice_number: &InvoiceNumber) -> Result<(), PersistenceError>;

    fn find_unvalidated_by_shipment_code(
        &self,
        shipment_code: &ShipmentCode,
    ) -> Result<Vec<ServiceLineItem>, PersistenceError>;

    fn find_by_invoice_number(
        &self,
        invoice_number: &InvoiceNumber,
    ) -> Result<Vec<ServiceLineItem>, PersistenceError>;
}

impl<S> ServiceCatalog for Arc<S>
where
    S: ServiceCatalog + ?Sized,
{
    fn list_active_services(&self) -> Result<Vec<ServiceDefinition>, PersistenceError> {
        (**self).list_active_services()
    }

    fn current_redevance_rate(&self) -> Result<RedevanceRate, PersistenceError> {
        (**self).current_redevance_rate()
    }
}

impl<S> LineItemRepository for Arc<S>
where
    S: LineItemRepository + ?Sized,
{
    fn save_group(
        &self,
        shipment_code: &ShipmentCode,
        items: &[ServiceLineItem],
    ) -> Result<(InvoiceNumber, Vec<ServiceLineItem>), PersistenceError> {
        (**self).save_group(shipment_code, items)
    }

    fn update_item(
        &self,
        id: LineItemId,
        item: &ServiceLineItem,
    ) -> Result<ServiceLineItem, PersistenceError> {
        (**self).update_item(id, item)
    }

    fn delete_item(&self, id: LineItemId) -> Result<(), PersistenceError> {
        (**self).delete_item(id)
    }

    fn validate_level1(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> Result<(), PersistenceError> {
        (**self).validate_level1(invoice_number, validator)
    }

    fn invalidate_level1(&self, invoice_number: &InvoiceNumber) -> Result<(), PersistenceError> {
        (**self).invalidate_level1(invoice_number)
    }

    fn validate_level2(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> Result<(), PersistenceError> {
        (**self).validate_level2(invoice_number, validator)
    }

    fn invalidate_level2(&self, invoice_number: &InvoiceNumber) -> Result<(), PersistenceError> {
        (**self).invalidate_level2(invoice_number)
    }

    fn find_unvalidated_by_shipment_code(
        &self,
        shipment_code: &ShipmentCode,
    ) -> Result<Vec<ServiceLineItem>, PersistenceError> {
        (**self).find_unvalidated_by_shipment_code(shipment_code)
    }

    fn find_by_invoice_number(
        &self,
        invoice_number: &InvoiceNumber,
    ) -> Result<Vec<ServiceLineItem>, PersistenceError> {
        (**self).find_by_invoice_number(invoice_number)
    }
}
