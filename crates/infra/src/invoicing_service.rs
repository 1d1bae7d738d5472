//! Invoicing orchestration (application-level).
//!
//! Composes the catalog, the line-item repository and the event bus around the
//! pure invoicing domain:
//!
//! ```text
//! compose: load catalog -> start/resume group -> edit -> save_group -> mark_persisted
//! approve: load invoice lines -> InvoiceApproval::handle -> store transition -> publish
//! ```
//!
//! Domain rules are checked here before any collaborator call, never left to
//! storage alone. A failed collaborator call leaves the caller's group as it
//! was, so the session can retry.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use portbill_catalog::{RedevanceRate, ServiceDefinition};
use portbill_core::{Aggregate, DomainError, ServiceId, UserId};
use portbill_events::{EventBus, EventEnvelope};
use portbill_invoicing::{
    ApprovalCommand, ApprovalEvent, BillingInputs, InvalidateLevel1, InvalidateLevel2,
    InvoiceApproval, InvoiceAssembler, InvoiceNumber, InvoiceSummary, Level1InvalidationPolicy,
    LineItemGroup, ServiceLineItem, ShipmentCode, ValidateLevel1, ValidateLevel2,
};

use crate::config::InvoicingConfig;
use crate::store::{InMemoryLineItemStore, LineItemRepository, PersistenceError, ServiceCatalog};

/// Stream type used for approval audit envelopes.
pub const INVOICE_STREAM_TYPE: &str = "invoicing.invoice";

#[derive(Debug, Error)]
pub enum InvoicingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The store write succeeded; only the audit publication failed.
    #[error("audit event publication failed: {0}")]
    Publish(String),
}

pub type InvoicingResult<T> = Result<T, InvoicingError>;

/// Catalog data read once at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub services: Vec<ServiceDefinition>,
    pub rate: RedevanceRate,
}

impl CatalogSnapshot {
    pub fn service(&self, id: ServiceId) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Draft a line for an active catalog service.
    pub fn draft_line(
        &self,
        shipment_code: ShipmentCode,
        service_id: ServiceId,
        inputs: BillingInputs,
    ) -> Result<ServiceLineItem, DomainError> {
        let service = self
            .service(service_id)
            .ok_or_else(|| DomainError::validation(format!("no active service {service_id}")))?;
        Ok(ServiceLineItem::draft(shipment_code, service.clone(), inputs))
    }
}

#[derive(Debug)]
pub struct InvoicingService<R, C, B> {
    repository: R,
    catalog: C,
    bus: B,
    policy: Level1InvalidationPolicy,
}

impl<R, C, B> InvoicingService<R, C, B> {
    pub fn new(repository: R, catalog: C, bus: B) -> Self {
        Self {
            repository,
            catalog,
            bus,
            policy: Level1InvalidationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: Level1InvalidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> Level1InvalidationPolicy {
        self.policy
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn into_parts(self) -> (R, C, B) {
        (self.repository, self.catalog, self.bus)
    }
}

impl<C, B> InvoicingService<InMemoryLineItemStore, C, B> {
    /// Build a service over the in-memory store from loaded configuration.
    ///
    /// Installs logging, numbers invoices with the configured prefix and applies
    /// the level-1 invalidation policy.
    pub fn from_config(config: &InvoicingConfig, catalog: C, bus: B) -> Self {
        portbill_observability::init_with(&config.log);
        info!(
            prefix = %config.invoice_prefix,
            policy = ?config.level1_invalidation,
            "invoicing configured"
        );
        Self::new(
            InMemoryLineItemStore::with_prefix(config.invoice_prefix.clone()),
            catalog,
            bus,
        )
        .with_policy(config.level1_invalidation)
    }
}

impl<R, C, B> InvoicingService<R, C, B>
where
    R: LineItemRepository,
    C: ServiceCatalog,
    B: EventBus<EventEnvelope<ApprovalEvent>>,
{
    pub fn load_catalog(&self) -> InvoicingResult<CatalogSnapshot> {
        let services = self.catalog.list_active_services()?;
        let rate = self.catalog.current_redevance_rate()?;
        debug!(services = services.len(), rate = rate.per_unit(), "catalog loaded");
        Ok(CatalogSnapshot { services, rate })
    }

    /// Open a group for a shipment.
    ///
    /// A shipment with unvalidated lines already has an open invoice carrying
    /// the fee, so composition continues that group instead of starting over.
    pub fn start_group(
        &self,
        shipment_code: ShipmentCode,
        snapshot: &CatalogSnapshot,
    ) -> InvoicingResult<LineItemGroup> {
        let group = self.resume_group(shipment_code, snapshot)?;
        if !group.is_empty() {
            info!(
                shipment = %group.shipment_code(),
                lines = group.len(),
                "shipment has an open invoice, continuing it"
            );
        }
        Ok(group)
    }

    /// Continue composing the unvalidated lines already saved for a shipment.
    pub fn resume_group(
        &self,
        shipment_code: ShipmentCode,
        snapshot: &CatalogSnapshot,
    ) -> InvoicingResult<LineItemGroup> {
        let items = self.repository.find_unvalidated_by_shipment_code(&shipment_code)?;
        debug!(shipment = %shipment_code, lines = items.len(), "resuming group");
        Ok(LineItemGroup::resume(shipment_code, snapshot.rate, items)?)
    }

    /// Persist every line of the group as one batch.
    pub fn save_group(&self, group: &mut LineItemGroup) -> InvoicingResult<InvoiceNumber> {
        if group.is_empty() {
            return Err(DomainError::validation(format!(
                "shipment {} has no line items to save",
                group.shipment_code()
            ))
            .into());
        }
        for item in group.items() {
            item.validate()?;
            item.ensure_mutable()?;
        }

        let (invoice_number, saved) = self
            .repository
            .save_group(group.shipment_code(), group.items())
            .inspect_err(|e| {
                warn!(shipment = %group.shipment_code(), error = %e, "saving group failed")
            })?;
        group.mark_persisted(invoice_number.clone(), &saved);

        info!(
            shipment = %group.shipment_code(),
            invoice = %invoice_number,
            lines = saved.len(),
            total = group.total_amount(),
            "group saved"
        );
        Ok(invoice_number)
    }

    /// Update one previously saved line outside a batch.
    pub fn update_line(&self, item: &ServiceLineItem) -> InvoicingResult<ServiceLineItem> {
        let id = item
            .id()
            .ok_or_else(|| DomainError::precondition(format!("{} has not been saved", item.label())))?;
        item.ensure_mutable()?;
        item.validate()?;

        let updated = self
            .repository
            .update_item(id, item)
            .inspect_err(|e| warn!(item = %id, error = %e, "updating line failed"))?;
        info!(item = %id, shipment = %updated.shipment_code(), "line updated");
        Ok(updated)
    }

    /// Delete a line from storage (when saved) and then from the group.
    ///
    /// A transferred fee is only in memory until the group is saved again.
    pub fn delete_line(
        &self,
        group: &mut LineItemGroup,
        service_id: ServiceId,
    ) -> InvoicingResult<ServiceLineItem> {
        let persisted_id = group
            .ensure_removable(service_id)
            .inspect_err(|e| warn!(shipment = %group.shipment_code(), error = %e, "delete refused"))?
            .id();

        if let Some(id) = persisted_id {
            self.repository
                .delete_item(id)
                .inspect_err(|e| warn!(item = %id, error = %e, "deleting line failed"))?;
        }
        let removed = group.remove(service_id)?;

        info!(
            shipment = %group.shipment_code(),
            service = %removed.service().code,
            remaining = group.len(),
            "line deleted"
        );
        Ok(removed)
    }

    pub fn validate_level1(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> InvoicingResult<Vec<ApprovalEvent>> {
        let command = ApprovalCommand::ValidateLevel1(ValidateLevel1 {
            invoice_number: invoice_number.clone(),
            validator,
            occurred_at: Utc::now(),
        });
        self.transition(invoice_number, command, |repo| {
            repo.validate_level1(invoice_number, validator)
        })
    }

    pub fn invalidate_level1(&self, invoice_number: &InvoiceNumber) -> InvoicingResult<Vec<ApprovalEvent>> {
        let command = ApprovalCommand::InvalidateLevel1(InvalidateLevel1 {
            invoice_number: invoice_number.clone(),
            occurred_at: Utc::now(),
        });
        self.transition(invoice_number, command, |repo| repo.invalidate_level1(invoice_number))
    }

    pub fn validate_level2(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> InvoicingResult<Vec<ApprovalEvent>> {
        let command = ApprovalCommand::ValidateLevel2(ValidateLevel2 {
            invoice_number: invoice_number.clone(),
            validator,
            occurred_at: Utc::now(),
        });
        self.transition(invoice_number, command, |repo| {
            repo.validate_level2(invoice_number, validator)
        })
    }

    pub fn invalidate_level2(&self, invoice_number: &InvoiceNumber) -> InvoicingResult<Vec<ApprovalEvent>> {
        let command = ApprovalCommand::InvalidateLevel2(InvalidateLevel2 {
            invoice_number: invoice_number.clone(),
            occurred_at: Utc::now(),
        });
        self.transition(invoice_number, command, |repo| repo.invalidate_level2(invoice_number))
    }

    pub fn invoice_summary(&self, invoice_number: &InvoiceNumber) -> InvoicingResult<InvoiceSummary> {
        let lines = self.repository.find_by_invoice_number(invoice_number)?;
        debug!(invoice = %invoice_number, lines = lines.len(), "assembling invoice");
        Ok(InvoiceAssembler::assemble_one(invoice_number, &lines)?)
    }

    /// Decide with the invoice aggregate, write through the store, then publish.
    ///
    /// Publication happens only after the store write succeeded.
    fn transition(
        &self,
        invoice_number: &InvoiceNumber,
        command: ApprovalCommand,
        write: impl FnOnce(&R) -> Result<(), PersistenceError>,
    ) -> InvoicingResult<Vec<ApprovalEvent>> {
        let lines = self.repository.find_by_invoice_number(invoice_number)?;
        let approval = InvoiceApproval::from_lines(invoice_number, &lines, self.policy)?;

        let events = approval.handle(&command).inspect_err(|e| {
            warn!(invoice = %invoice_number, error = %e, "approval transition refused")
        })?;
        if events.is_empty() {
            return Ok(events);
        }

        write(&self.repository).inspect_err(|e| {
            warn!(invoice = %invoice_number, error = %e, "approval transition failed in storage")
        })?;

        for event in &events {
            info!(
                invoice = %invoice_number,
                event = portbill_events::Event::event_type(event),
                lines = approval.line_count(),
                "approval transition"
            );
            self.bus
                .publish(EventEnvelope::wrap(
                    invoice_number.as_str(),
                    INVOICE_STREAM_TYPE,
                    event.clone(),
                ))
                .map_err(|e| InvoicingError::Publish(e.to_string()))?;
        }

        Ok(events)
    }
}
