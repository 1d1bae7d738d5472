use std::sync::RwLock;

use portbill_core::{DomainResult, LineItemId, UserId};
use portbill_invoicing::{Approval, InvoiceNumber, ServiceLineItem, ShipmentCode, ValidationState};

use super::r#trait::{LineItemRepository, PersistenceError};
use crate::config::DEFAULT_INVOICE_PREFIX;

#[derive(Debug, Default)]
struct StoreState {
    items: Vec<ServiceLineItem>,
    last_invoice: u64,
}

/// In-memory line-item store.
///
/// Intended for tests/dev. Every write holds the lock for its whole batch, so
/// a rejected write leaves nothing behind.
#[derive(Debug)]
pub struct InMemoryLineItemStore {
    state: RwLock<StoreState>,
    prefix: String,
}

impl Default for InMemoryLineItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLineItemStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_INVOICE_PREFIX)
    }

    /// Invoice numbers are allocated as `{prefix}{sequence:06}`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            prefix: prefix.into(),
        }
    }

    /// Snapshot of every stored line.
    pub fn all(&self) -> Result<Vec<ServiceLineItem>, PersistenceError> {
        Ok(self.read()?.items.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, PersistenceError> {
        self.state.read().map_err(|_| PersistenceError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, PersistenceError> {
        self.state.write().map_err(|_| PersistenceError::Poisoned)
    }

    fn allocate(&self, state: &mut StoreState) -> Result<InvoiceNumber, PersistenceError> {
        let next = state.last_invoice + 1;
        let number = InvoiceNumber::new(format!("{}{next:06}", self.prefix))
            .map_err(|e| PersistenceError::Rejected(e.to_string()))?;
        state.last_invoice = next;
        Ok(number)
    }

    /// Apply `step` to every line of an invoice, or to none of them.
    fn transition(
        &self,
        invoice_number: &InvoiceNumber,
        step: impl Fn(Approval) -> DomainResult<Approval>,
    ) -> Result<(), PersistenceError> {
        let mut state = self.write()?;

        let mut updates = Vec::new();
        for (idx, item) in state.items.iter().enumerate() {
            if item.invoice_number() == Some(invoice_number) {
                let next = step(*item.approval())
                    .map_err(|e| PersistenceError::Rejected(format!("{}: {e}", item.label())))?;
                updates.push((idx, next));
            }
        }
        if updates.is_empty() {
            return Err(PersistenceError::NotFound(format!("invoice {invoice_number}")));
        }

        for (idx, approval) in updates {
            state.items[idx].set_approval(approval);
        }
        Ok(())
    }
}

fn reject_locked(item: &ServiceLineItem) -> Result<(), PersistenceError> {
    match item.blocking_level() {
        Some(level) => Err(PersistenceError::Rejected(format!(
            "{} is locked by {level} validation",
            item.label()
        ))),
        None => Ok(()),
    }
}

fn reject_duplicate(
    state: &StoreState,
    invoice_number: &InvoiceNumber,
    item: &ServiceLineItem,
    except: Option<LineItemId>,
) -> Result<(), PersistenceError> {
    let clash = state.items.iter().any(|stored| {
        stored.invoice_number() == Some(invoice_number)
            && stored.service_id() == item.service_id()
            && stored.id() != except
    });
    if clash {
        return Err(PersistenceError::Rejected(format!(
            "service '{}' is already billed on invoice {invoice_number}",
            item.service().name
        )));
    }
    Ok(())
}

impl LineItemRepository for InMemoryLineItemStore {
    fn save_group(
        &self,
        shipment_code: &ShipmentCode,
        items: &[ServiceLineItem],
    ) -> Result<(InvoiceNumber, Vec<ServiceLineItem>), PersistenceError> {
        if items.is_empty() {
            return Err(PersistenceError::Rejected(format!(
                "empty batch for shipment {shipment_code}"
            )));
        }

        let mut state = self.write()?;

        for item in items {
            if item.shipment_code() != shipment_code {
                return Err(PersistenceError::Rejected(format!(
                    "{} belongs to shipment {}",
                    item.label(),
                    item.shipment_code()
                )));
            }
            reject_locked(item)?;
            if let Some(id) = item.id() {
                let stored = state
                    .items
                    .iter()
                    .find(|s| s.id() == Some(id))
                    .ok_or_else(|| PersistenceError::NotFound(format!("line item {id}")))?;
                reject_locked(stored)?;
            }
        }

        // reuse the batch's invoice, then the shipment's open invoice
        let existing = items
            .iter()
            .find_map(|i| i.invoice_number().cloned())
            .or_else(|| {
                state
                    .items
                    .iter()
                    .find(|s| {
                        s.shipment_code() == shipment_code
                            && s.validation_state() == ValidationState::Draft
                    })
                    .and_then(|s| s.invoice_number().cloned())
            });

        let invoice_number = match existing {
            Some(number) => {
                if let Some(locked) = state
                    .items
                    .iter()
                    .find(|s| s.invoice_number() == Some(&number) && s.blocking_level().is_some())
                {
                    return Err(PersistenceError::Rejected(format!(
                        "invoice {number} is already validated ({})",
                        locked.label()
                    )));
                }
                let batch_has_it = |id: Option<LineItemId>| {
                    items.iter().any(|i| i.id().is_some() && i.id() == id)
                };
                let stored_bearer = state.items.iter().find(|stored| {
                    stored.invoice_number() == Some(&number)
                        && stored.redevance() > 0
                        && !batch_has_it(stored.id())
                });
                if let Some(bearer) = stored_bearer {
                    if items.iter().any(|i| i.redevance() > 0) {
                        return Err(PersistenceError::Rejected(format!(
                            "invoice {number} already carries the computer fee on {}",
                            bearer.label()
                        )));
                    }
                }
                for item in items {
                    let clash = state.items.iter().find(|stored| {
                        stored.invoice_number() == Some(&number)
                            && stored.service_id() == item.service_id()
                            && stored.id() != item.id()
                            && !batch_has_it(stored.id())
                    });
                    if clash.is_some() {
                        return Err(PersistenceError::Rejected(format!(
                            "service '{}' is already billed on invoice {number}",
                            item.service().name
                        )));
                    }
                }
                number
            }
            None => self.allocate(&mut state)?,
        };

        let mut saved = Vec::with_capacity(items.len());
        for item in items {
            let id = item.id().unwrap_or_default();
            let mut stored = item.clone();
            stored.assign_identity(id, invoice_number.clone());

            match state.items.iter_mut().find(|s| s.id() == Some(id)) {
                Some(slot) => *slot = stored.clone(),
                None => state.items.push(stored.clone()),
            }
            saved.push(stored);
        }

        Ok((invoice_number, saved))
    }

    fn update_item(
        &self,
        id: LineItemId,
        item: &ServiceLineItem,
    ) -> Result<ServiceLineItem, PersistenceError> {
        let mut state = self.write()?;

        let idx = state
            .items
            .iter()
            .position(|s| s.id() == Some(id))
            .ok_or_else(|| PersistenceError::NotFound(format!("line item {id}")))?;
        let stored = &state.items[idx];
        reject_locked(stored)?;
        reject_locked(item)?;
        if item.shipment_code() != stored.shipment_code() {
            return Err(PersistenceError::Rejected(format!(
                "{} cannot move to shipment {}",
                stored.label(),
                item.shipment_code()
            )));
        }
        let invoice_number = stored
            .invoice_number()
            .cloned()
            .ok_or_else(|| PersistenceError::Rejected(format!("{} has no invoice", stored.label())))?;
        reject_duplicate(&state, &invoice_number, item, Some(id))?;

        let mut updated = item.clone();
        updated.assign_identity(id, invoice_number);
        updated.set_approval(*state.items[idx].approval());
        state.items[idx] = updated.clone();
        Ok(updated)
    }

    fn delete_item(&self, id: LineItemId) -> Result<(), PersistenceError> {
        let mut state = self.write()?;

        let idx = state
            .items
            .iter()
            .position(|s| s.id() == Some(id))
            .ok_or_else(|| PersistenceError::NotFound(format!("line item {id}")))?;
        reject_locked(&state.items[idx])?;
        state.items.remove(idx);
        Ok(())
    }

    fn validate_level1(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> Result<(), PersistenceError> {
        self.transition(invoice_number, |a| a.validate_level1(validator))
    }

    fn invalidate_level1(&self, invoice_number: &InvoiceNumber) -> Result<(), PersistenceError> {
        self.transition(invoice_number, Approval::invalidate_level1)
    }

    fn validate_level2(
        &self,
        invoice_number: &InvoiceNumber,
        validator: UserId,
    ) -> Result<(), PersistenceError> {
        self.transition(invoice_number, |a| a.validate_level2(validator))
    }

    fn invalidate_level2(&self, invoice_number: &InvoiceNumber) -> Result<(), PersistenceError> {
        self.transition(invoice_number, Approval::invalidate_level2)
    }

    fn find_unvalidated_by_shipment_code(
        &self,
        shipment_code: &ShipmentCode,
    ) -> Result<Vec<ServiceLineItem>, PersistenceError> {
        Ok(self
            .read()?
            .items
            .iter()
            .filter(|s| {
                s.shipment_code() == shipment_code && s.validation_state() == ValidationState::Draft
            })
            .cloned()
            .collect())
    }

    fn find_by_invoice_number(
        &self,
        invoice_number: &InvoiceNumber,
    ) -> Result<Vec<ServiceLineItem>, PersistenceError> {
        Ok(self
            .read()?
            .items
            .iter()
            .filter(|s| s.invoice_number() == Some(invoice_number))
            .cloned()
            .collect())
    }
}
