//! Line items of one shipment, composed together and saved as one batch.
//!
//! The group owns the computer-fee rule: exactly one line (the bearer) carries
//! the fee. The bearer is tracked by service id, which is unique in a group.

use portbill_catalog::RedevanceRate;
use portbill_core::{Amount, DomainError, DomainResult, ServiceId};

use crate::command::{LineItemCommand, reduce};
use crate::line_item::{InvoiceNumber, LineAmounts, ServiceLineItem, ShipmentCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemGroup {
    shipment_code: ShipmentCode,
    rate: RedevanceRate,
    invoice_number: Option<InvoiceNumber>,
    items: Vec<ServiceLineItem>,
    bearer: Option<ServiceId>,
}

impl LineItemGroup {
    pub fn new(shipment_code: ShipmentCode, rate: RedevanceRate) -> Self {
        Self {
            shipment_code,
            rate,
            invoice_number: None,
            items: Vec::new(),
            bearer: None,
        }
    }

    /// Rebuild a group from lines that were already saved for `shipment_code`.
    ///
    /// All lines must share one invoice and one validation state. The bearer is
    /// the line carrying a fee (the first line if none does); any other line
    /// still carrying a fee is reset to zero.
    pub fn resume(
        shipment_code: ShipmentCode,
        rate: RedevanceRate,
        items: Vec<ServiceLineItem>,
    ) -> DomainResult<Self> {
        let mut invoice_number: Option<InvoiceNumber> = None;
        for (idx, item) in items.iter().enumerate() {
            if item.shipment_code() != &shipment_code {
                return Err(DomainError::invariant(format!(
                    "{} belongs to shipment {}, not {shipment_code}",
                    item.label(),
                    item.shipment_code()
                )));
            }
            if items[..idx].iter().any(|other| other.service_id() == item.service_id()) {
                return Err(DomainError::duplicate_service(
                    item.service().name.clone(),
                    shipment_code.to_string(),
                ));
            }
            if item.validation_state() != items[0].validation_state() {
                return Err(DomainError::invariant(format!(
                    "shipment {shipment_code} mixes validated and unvalidated lines"
                )));
            }
            match (&invoice_number, item.invoice_number()) {
                (Some(known), Some(number)) if known != number => {
                    return Err(DomainError::invariant(format!(
                        "shipment {shipment_code} mixes invoices {known} and {number}"
                    )));
                }
                (None, Some(number)) => invoice_number = Some(number.clone()),
                _ => {}
            }
        }

        let mut items = items;
        let bearer_idx = items.iter().position(|item| item.redevance() > 0).unwrap_or(0);
        let bearer = items.get(bearer_idx).map(ServiceLineItem::service_id);
        for (idx, item) in items.iter_mut().enumerate() {
            if idx != bearer_idx {
                item.clear_redevance();
            }
        }

        Ok(Self {
            shipment_code,
            rate,
            invoice_number,
            items,
            bearer,
        })
    }

    pub fn shipment_code(&self) -> &ShipmentCode {
        &self.shipment_code
    }

    pub fn rate(&self) -> RedevanceRate {
        self.rate
    }

    pub fn invoice_number(&self) -> Option<&InvoiceNumber> {
        self.invoice_number.as_ref()
    }

    pub fn items(&self) -> &[ServiceLineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, service_id: ServiceId) -> Option<&ServiceLineItem> {
        self.items.iter().find(|item| item.service_id() == service_id)
    }

    /// Line currently carrying the computer fee.
    pub fn bearer(&self) -> Option<&ServiceLineItem> {
        self.bearer.and_then(|id| self.get(id))
    }

    pub fn is_bearer(&self, service_id: ServiceId) -> bool {
        self.bearer == Some(service_id)
    }

    /// Add a line. The first line of an empty group becomes the fee bearer.
    pub fn add(&mut self, mut item: ServiceLineItem) -> DomainResult<()> {
        if item.shipment_code() != &self.shipment_code {
            return Err(DomainError::validation(format!(
                "{} is for shipment {}, not {}",
                item.label(),
                item.shipment_code(),
                self.shipment_code
            )));
        }
        if self.get(item.service_id()).is_some() {
            return Err(DomainError::duplicate_service(
                item.service().name.clone(),
                self.shipment_code.to_string(),
            ));
        }
        item.ensure_mutable()?;

        if self.bearer.is_none() {
            item.bear_redevance(self.rate);
            self.bearer = Some(item.service_id());
        } else {
            item.clear_redevance();
        }
        if self.invoice_number.is_some() {
            item.set_invoice_number(self.invoice_number.clone());
        }
        self.items.push(item);
        Ok(())
    }

    /// Check that `service_id` could be removed, without removing it.
    pub fn ensure_removable(&self, service_id: ServiceId) -> DomainResult<&ServiceLineItem> {
        let item = self.get(service_id).ok_or_else(|| {
            DomainError::not_found(format!(
                "service {service_id} on shipment {}",
                self.shipment_code
            ))
        })?;
        item.ensure_mutable()?;
        Ok(item)
    }

    /// Remove a line. A removed bearer hands its fee amount to the first remaining
    /// unlocked line, which taxes it by its own taxable flag.
    pub fn remove(&mut self, service_id: ServiceId) -> DomainResult<ServiceLineItem> {
        self.ensure_removable(service_id)?;
        let idx = self
            .position(service_id)
            .ok_or_else(|| DomainError::invariant("removable line vanished"))?;
        let removed = self.items.remove(idx);

        if self.bearer == Some(service_id) {
            let next = self.items.iter_mut().find(|item| item.blocking_level().is_none());
            self.bearer = match next {
                Some(next) => {
                    next.take_redevance(removed.redevance());
                    Some(next.service_id())
                }
                None => None,
            };
        }
        Ok(removed)
    }

    /// Edit a line through a typed command; the group is unchanged on error.
    pub fn apply(&mut self, service_id: ServiceId, command: &LineItemCommand) -> DomainResult<()> {
        let idx = self.position(service_id).ok_or_else(|| {
            DomainError::not_found(format!(
                "service {service_id} on shipment {}",
                self.shipment_code
            ))
        })?;

        if let LineItemCommand::SetService(service) = command {
            if service.id != service_id && self.get(service.id).is_some() {
                return Err(DomainError::duplicate_service(
                    service.name.clone(),
                    self.shipment_code.to_string(),
                ));
            }
        }

        let is_bearer = self.is_bearer(service_id);
        let updated = reduce(&self.items[idx], command, is_bearer.then_some(self.rate))?;
        if is_bearer {
            self.bearer = Some(updated.service_id());
        }
        self.items[idx] = updated;
        Ok(())
    }

    /// Copy the identities assigned by storage back onto the lines.
    pub fn mark_persisted(&mut self, invoice_number: InvoiceNumber, saved: &[ServiceLineItem]) {
        for item in &mut self.items {
            match saved.iter().find(|s| s.service_id() == item.service_id()) {
                Some(persisted) => match persisted.id() {
                    Some(id) => item.assign_identity(id, invoice_number.clone()),
                    None => item.set_invoice_number(Some(invoice_number.clone())),
                },
                None => item.set_invoice_number(Some(invoice_number.clone())),
            }
        }
        self.invoice_number = Some(invoice_number);
    }

    /// Sum of every derived amount across the group.
    pub fn totals(&self) -> LineAmounts {
        self.items
            .iter()
            .fold(LineAmounts::default(), |acc, item| acc.saturating_add(*item.amounts()))
    }

    /// `charge + tax + redevance + redevance_tax` over all lines.
    pub fn total_amount(&self) -> Amount {
        self.totals().total()
    }

    fn position(&self, service_id: ServiceId) -> Option<usize> {
        self.items.iter().position(|item| item.service_id() == service_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portbill_catalog::{PricingMode, ServiceDefinition};
    use portbill_core::{LineItemId, UserId};

    use crate::approval::Approval;
    use crate::line_item::BillingInputs;

    fn shipment() -> ShipmentCode {
        ShipmentCode::new("LT-2024-001").unwrap()
    }

    fn service(name: &str, unit_price: Amount) -> ServiceDefinition {
        ServiceDefinition::new(ServiceId::new(), name, name, PricingMode::Flat, unit_price).unwrap()
    }

    fn line(service: &ServiceDefinition, quantity: u32) -> ServiceLineItem {
        ServiceLineItem::draft(shipment(), service.clone(), BillingInputs::new(quantity))
    }

    fn group() -> LineItemGroup {
        LineItemGroup::new(shipment(), RedevanceRate::new(5000))
    }

    #[test]
    fn first_line_bears_the_fee() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);

        group.add(line(&a, 1)).unwrap();
        group.add(line(&b, 2)).unwrap();

        assert_eq!(group.get(a.id).unwrap().redevance(), 5000);
        assert_eq!(group.get(a.id).unwrap().redevance_tax(), 900);
        assert_eq!(group.get(b.id).unwrap().redevance(), 0);
        assert_eq!(group.bearer().unwrap().service_id(), a.id);
    }

    #[test]
    fn added_line_is_stripped_of_any_fee() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        group.add(line(&a, 1)).unwrap();

        let mut with_fee = line(&b, 1);
        with_fee.bear_redevance(RedevanceRate::new(9999));
        group.add(with_fee).unwrap();

        assert_eq!(group.get(b.id).unwrap().redevance(), 0);
        assert_eq!(group.get(b.id).unwrap().redevance_tax(), 0);
    }

    #[test]
    fn duplicate_service_is_rejected_without_change() {
        let mut group = group();
        let a = service("Pesage", 1000);
        group.add(line(&a, 1)).unwrap();
        let before = group.clone();

        let err = group.add(line(&a, 3)).unwrap_err();
        match err {
            DomainError::DuplicateService { service, shipment } => {
                assert_eq!(service, "Pesage");
                assert_eq!(shipment, "LT-2024-001");
            }
            _ => panic!("Expected DuplicateService error"),
        }
        assert_eq!(group, before);
    }

    #[test]
    fn line_for_other_shipment_is_rejected() {
        let mut group = group();
        let item = ServiceLineItem::draft(
            ShipmentCode::new("LT-OTHER").unwrap(),
            service("Pesage", 1000),
            BillingInputs::new(1),
        );
        assert!(matches!(group.add(item), Err(DomainError::Validation(_))));
    }

    #[test]
    fn removing_bearer_transfers_fee_to_next_line() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        group.add(line(&a, 1)).unwrap();
        group.add(line(&b, 1)).unwrap();

        let removed = group.remove(a.id).unwrap();
        assert_eq!(removed.redevance(), 5000);

        let b_line = group.get(b.id).unwrap();
        assert_eq!(b_line.redevance(), 5000);
        assert_eq!(b_line.redevance_tax(), 900);
        assert_eq!(group.bearer().unwrap().service_id(), b.id);
    }

    #[test]
    fn transferred_fee_follows_the_taxable_flag_of_its_new_line() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        group.add(line(&a, 1)).unwrap();
        let exempt = ServiceLineItem::draft(shipment(), b.clone(), BillingInputs::new(1).taxable(false));
        group.add(exempt).unwrap();

        group.remove(a.id).unwrap();

        let b_line = group.get(b.id).unwrap();
        assert_eq!(b_line.redevance(), 5000);
        assert_eq!(b_line.redevance_tax(), 0);
        assert_eq!(b_line.tax(), 0);
    }

    #[test]
    fn resume_rejects_mixed_validation_states() {
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        let invoice = InvoiceNumber::new("FAC-000001").unwrap();

        let mut locked = line(&a, 1);
        locked.assign_identity(LineItemId::new(), invoice.clone());
        locked.set_approval(Approval::draft().validate_level1(UserId::new()).unwrap());
        let mut open = line(&b, 1);
        open.bear_redevance(RedevanceRate::new(5000));
        open.assign_identity(LineItemId::new(), invoice);

        let err = LineItemGroup::resume(shipment(), RedevanceRate::new(5000), vec![locked, open])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn removing_last_line_leaves_no_bearer() {
        let mut group = group();
        let a = service("Pesage", 1000);
        group.add(line(&a, 1)).unwrap();
        group.remove(a.id).unwrap();
        assert!(group.is_empty());
        assert!(group.bearer().is_none());

        // next line added becomes bearer again
        let b = service("Gardiennage", 2000);
        group.add(line(&b, 2)).unwrap();
        assert_eq!(group.get(b.id).unwrap().redevance(), 10_000);
    }

    #[test]
    fn validated_line_cannot_be_removed_or_edited() {
        let a = service("Pesage", 1000);
        let mut validated = line(&a, 1);
        validated.assign_identity(LineItemId::new(), InvoiceNumber::new("FAC-000001").unwrap());
        validated.set_approval(Approval::draft().validate_level1(UserId::new()).unwrap());
        let mut group = LineItemGroup::resume(shipment(), RedevanceRate::new(5000), vec![validated])
            .unwrap();
        let before = group.clone();

        assert!(matches!(
            group.remove(a.id),
            Err(DomainError::ImmutableRecord { .. })
        ));
        assert!(matches!(
            group.apply(a.id, &LineItemCommand::SetQuantity(9)),
            Err(DomainError::ImmutableRecord { .. })
        ));
        assert_eq!(group, before);
    }

    #[test]
    fn bearer_quantity_change_refreshes_fee() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        group.add(line(&a, 1)).unwrap();
        group.add(line(&b, 1)).unwrap();

        group.apply(a.id, &LineItemCommand::SetQuantity(2)).unwrap();
        group.apply(b.id, &LineItemCommand::SetQuantity(5)).unwrap();

        assert_eq!(group.get(a.id).unwrap().redevance(), 10_000);
        assert_eq!(group.get(b.id).unwrap().redevance(), 0);
        assert_eq!(group.get(b.id).unwrap().charge(), 10_000);
    }

    #[test]
    fn switching_to_a_service_already_present_is_rejected() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        group.add(line(&a, 1)).unwrap();
        group.add(line(&b, 1)).unwrap();
        let before = group.clone();

        let err = group
            .apply(b.id, &LineItemCommand::SetService(a.clone()))
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateService { .. }));
        assert_eq!(group, before);
    }

    #[test]
    fn bearer_follows_its_line_when_service_changes() {
        let mut group = group();
        let a = service("Pesage", 1000);
        let c = service("Manutention", 3000);
        group.add(line(&a, 1)).unwrap();

        group.apply(a.id, &LineItemCommand::SetService(c.clone())).unwrap();
        let bearer = group.bearer().unwrap();
        assert_eq!(bearer.service_id(), c.id);
        assert_eq!(bearer.charge(), 3000);
        assert_eq!(bearer.redevance(), 5000);
    }

    #[test]
    fn total_amount_sums_every_component() {
        let mut group = group();
        group.add(line(&service("Pesage", 1000), 1)).unwrap();
        group.add(line(&service("Gardiennage", 2000), 1)).unwrap();

        // 1000 + 180 + 5000 + 900 + 2000 + 360
        assert_eq!(group.total_amount(), 9440);
        assert_eq!(group.totals().redevance, 5000);
    }

    #[test]
    fn resume_keeps_fee_on_line_that_carries_it() {
        let a = service("Pesage", 1000);
        let b = service("Gardiennage", 2000);
        let invoice = InvoiceNumber::new("FAC-000001").unwrap();

        let mut first = line(&a, 1);
        first.assign_identity(LineItemId::new(), invoice.clone());
        let mut second = line(&b, 1);
        second.bear_redevance(RedevanceRate::new(5000));
        second.assign_identity(LineItemId::new(), invoice.clone());

        let group = LineItemGroup::resume(shipment(), RedevanceRate::new(5000), vec![first, second])
            .unwrap();
        assert_eq!(group.bearer().unwrap().service_id(), b.id);
        assert_eq!(group.invoice_number(), Some(&invoice));
    }

    #[test]
    fn resume_rejects_duplicate_services() {
        let a = service("Pesage", 1000);
        let err = LineItemGroup::resume(
            shipment(),
            RedevanceRate::new(5000),
            vec![line(&a, 1), line(&a, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateService { .. }));
    }

    #[test]
    fn mark_persisted_copies_ids_and_invoice_number() {
        let mut group = group();
        let a = service("Pesage", 1000);
        group.add(line(&a, 1)).unwrap();

        let invoice = InvoiceNumber::new("FAC-000042").unwrap();
        let mut saved = group.items()[0].clone();
        let id = LineItemId::new();
        saved.assign_identity(id, invoice.clone());

        group.mark_persisted(invoice.clone(), &[saved]);
        assert_eq!(group.invoice_number(), Some(&invoice));
        assert_eq!(group.get(a.id).unwrap().id(), Some(id));
        assert_eq!(group.get(a.id).unwrap().invoice_number(), Some(&invoice));

        // lines added afterwards join the same invoice
        let b = service("Gardiennage", 2000);
        group.add(line(&b, 1)).unwrap();
        assert_eq!(group.get(b.id).unwrap().invoice_number(), Some(&invoice));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(usize, u32),
            Remove(usize),
            Quantity(usize, u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0usize..6, 0u32..10).prop_map(|(s, q)| Op::Add(s, q)),
                (0usize..6).prop_map(Op::Remove),
                (0usize..6, 0u32..10).prop_map(|(s, q)| Op::Quantity(s, q)),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: at most one line carries a fee, and it is the bearer.
            #[test]
            fn single_fee_bearer(ops in proptest::collection::vec(op(), 0..40), rate in 1u64..10_000) {
                let catalog: Vec<ServiceDefinition> =
                    (0..6).map(|i| service(&format!("S{i}"), 100 * (i as u64 + 1))).collect();
                let mut group = LineItemGroup::new(shipment(), RedevanceRate::new(rate));

                for op in ops {
                    let _ = match op {
                        Op::Add(s, q) => group.add(line(&catalog[s], q)),
                        Op::Remove(s) => group.remove(catalog[s].id).map(|_| ()),
                        Op::Quantity(s, q) => group.apply(catalog[s].id, &LineItemCommand::SetQuantity(q)),
                    };

                    let carriers: Vec<&ServiceLineItem> =
                        group.items().iter().filter(|i| i.redevance() > 0).collect();
                    prop_assert!(carriers.len() <= 1);
                    if let Some(carrier) = carriers.first() {
                        prop_assert!(group.is_bearer(carrier.service_id()));
                    }
                    prop_assert_eq!(group.bearer().is_some(), !group.is_empty());
                }
            }

            /// Property: no two lines of a group bill the same service.
            #[test]
            fn services_stay_unique(adds in proptest::collection::vec(0usize..4, 0..20)) {
                let catalog: Vec<ServiceDefinition> =
                    (0..4).map(|i| service(&format!("S{i}"), 100)).collect();
                let mut group = LineItemGroup::new(shipment(), RedevanceRate::new(100));
                for s in adds {
                    let _ = group.add(line(&catalog[s], 1));
                }
                let mut ids: Vec<ServiceId> = group.items().iter().map(|i| i.service_id()).collect();
                let len = ids.len();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), len);
            }
        }
    }
}
