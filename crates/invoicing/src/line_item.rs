//! Service line item: one billed service on one shipment.

use serde::{Deserialize, Serialize};

use portbill_catalog::{RedevanceRate, ServiceDefinition};
use portbill_core::{Amount, ApprovalLevel, DomainError, DomainResult, LineItemId, ServiceId};

use crate::approval::{Approval, ValidationState};
use crate::period::DateRange;
use crate::pricing::price;
use crate::tax::tax;

/// Transport-document code identifying a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentCode(String);

impl ShipmentCode {
    pub fn new(code: impl Into<String>) -> DomainResult<Self> {
        let code = code.into().trim().to_string();
        if code.is_empty() {
            return Err(DomainError::validation("shipment code cannot be empty"));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ShipmentCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invoice number shared by every line of a shipment's batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn new(number: impl Into<String>) -> DomainResult<Self> {
        let number = number.into();
        if number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        Ok(Self(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs the charge is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInputs {
    /// Number of containers/units (`nbreCont`); below one is billed as one.
    pub quantity: u32,
    pub weight_kg: Option<u64>,
    pub period: Option<DateRange>,
    pub taxable: bool,
}

impl BillingInputs {
    /// Taxable inputs for `quantity` units, without weight or period.
    pub fn new(quantity: u32) -> Self {
        Self {
            quantity,
            weight_kg: None,
            period: None,
            taxable: true,
        }
    }

    pub fn with_weight(mut self, weight_kg: u64) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_period(mut self, period: DateRange) -> Self {
        self.period = Some(period);
        self
    }

    pub fn taxable(mut self, taxable: bool) -> Self {
        self.taxable = taxable;
        self
    }
}

/// Descriptive pass-through fields; never used in computations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDetails {
    pub declarant: Option<String>,
    pub phone: Option<String>,
    pub payment_mode: Option<String>,
    pub vehicle_plate: Option<String>,
    pub observations: Option<String>,
}

/// Derived amounts of a line (or a sum of lines).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub charge: Amount,
    pub tax: Amount,
    pub redevance: Amount,
    pub redevance_tax: Amount,
}

impl LineAmounts {
    pub fn total(&self) -> Amount {
        self.charge
            .saturating_add(self.tax)
            .saturating_add(self.redevance)
            .saturating_add(self.redevance_tax)
    }

    pub fn saturating_add(self, other: LineAmounts) -> LineAmounts {
        LineAmounts {
            charge: self.charge.saturating_add(other.charge),
            tax: self.tax.saturating_add(other.tax),
            redevance: self.redevance.saturating_add(other.redevance),
            redevance_tax: self.redevance_tax.saturating_add(other.redevance_tax),
        }
    }
}

/// A billed service on a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLineItem {
    id: Option<LineItemId>,
    shipment_code: ShipmentCode,
    invoice_number: Option<InvoiceNumber>,
    service: ServiceDefinition,
    inputs: BillingInputs,
    #[serde(default)]
    details: LineDetails,
    amounts: LineAmounts,
    #[serde(default)]
    approval: Approval,
}

impl ServiceLineItem {
    /// New unsaved line, priced and taxed, carrying no computer fee.
    pub fn draft(shipment_code: ShipmentCode, service: ServiceDefinition, inputs: BillingInputs) -> Self {
        let mut item = Self {
            id: None,
            shipment_code,
            invoice_number: None,
            service,
            inputs,
            details: LineDetails::default(),
            amounts: LineAmounts::default(),
            approval: Approval::draft(),
        };
        item.reprice();
        item
    }

    pub fn with_details(mut self, details: LineDetails) -> Self {
        self.details = details;
        self
    }

    pub fn id(&self) -> Option<LineItemId> {
        self.id
    }

    pub fn shipment_code(&self) -> &ShipmentCode {
        &self.shipment_code
    }

    pub fn invoice_number(&self) -> Option<&InvoiceNumber> {
        self.invoice_number.as_ref()
    }

    pub fn service(&self) -> &ServiceDefinition {
        &self.service
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.id
    }

    pub fn inputs(&self) -> &BillingInputs {
        &self.inputs
    }

    pub fn details(&self) -> &LineDetails {
        &self.details
    }

    pub fn amounts(&self) -> &LineAmounts {
        &self.amounts
    }

    pub fn charge(&self) -> Amount {
        self.amounts.charge
    }

    pub fn tax(&self) -> Amount {
        self.amounts.tax
    }

    pub fn redevance(&self) -> Amount {
        self.amounts.redevance
    }

    pub fn redevance_tax(&self) -> Amount {
        self.amounts.redevance_tax
    }

    pub fn total(&self) -> Amount {
        self.amounts.total()
    }

    pub fn approval(&self) -> &Approval {
        &self.approval
    }

    pub fn validation_state(&self) -> ValidationState {
        self.approval.state()
    }

    pub fn valide1(&self) -> bool {
        self.approval.state().valide1()
    }

    pub fn valide2(&self) -> bool {
        self.approval.state().valide2()
    }

    /// Human-readable reference used in error messages.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("line '{}' ({id})", self.service.name),
            None => format!("line '{}'", self.service.name),
        }
    }

    /// Reject any change once a validation level is set, naming the highest one.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        match self.approval.state().blocking_level() {
            Some(level) => Err(DomainError::immutable(self.label(), level)),
            None => Ok(()),
        }
    }

    pub fn blocking_level(&self) -> Option<ApprovalLevel> {
        self.approval.state().blocking_level()
    }

    /// Checks required before the line can be persisted.
    pub fn validate(&self) -> DomainResult<()> {
        if self.service.requires_weight() && self.inputs.weight_kg.is_none() {
            return Err(DomainError::validation(format!(
                "{} is billed by tonnage and needs a weight",
                self.label()
            )));
        }
        if self.service.requires_period() && self.inputs.period.is_none() {
            return Err(DomainError::validation(format!(
                "{} is billed per night and needs a date range",
                self.label()
            )));
        }
        Ok(())
    }

    /// Storage hook: record the persisted identity and invoice number.
    pub fn assign_identity(&mut self, id: LineItemId, invoice_number: InvoiceNumber) {
        self.id = Some(id);
        self.invoice_number = Some(invoice_number);
    }

    /// Storage hook: stamp the approval decided for the whole invoice.
    pub fn set_approval(&mut self, approval: Approval) {
        self.approval = approval;
    }

    pub(crate) fn set_invoice_number(&mut self, invoice_number: Option<InvoiceNumber>) {
        self.invoice_number = invoice_number;
    }

    pub(crate) fn service_mut(&mut self) -> &mut ServiceDefinition {
        &mut self.service
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut BillingInputs {
        &mut self.inputs
    }

    pub(crate) fn details_mut(&mut self) -> &mut LineDetails {
        &mut self.details
    }

    /// Refresh charge and both taxes from the current inputs.
    pub(crate) fn reprice(&mut self) {
        self.amounts.charge = price(
            &self.service,
            self.inputs.quantity,
            self.inputs.weight_kg,
            self.inputs.period.as_ref(),
        );
        self.amounts.tax = tax(self.amounts.charge, self.inputs.taxable);
        self.amounts.redevance_tax = tax(self.amounts.redevance, self.inputs.taxable);
    }

    /// Make this line carry the computer fee for its current quantity.
    pub(crate) fn bear_redevance(&mut self, rate: RedevanceRate) {
        self.amounts.redevance = rate.amount_for(self.inputs.quantity);
        self.amounts.redevance_tax = tax(self.amounts.redevance, self.inputs.taxable);
    }

    /// Take over another line's fee amount, taxed by this line's own flag.
    pub(crate) fn take_redevance(&mut self, redevance: Amount) {
        self.amounts.redevance = redevance;
        self.amounts.redevance_tax = tax(redevance, self.inputs.taxable);
    }

    pub(crate) fn clear_redevance(&mut self) {
        self.amounts.redevance = 0;
        self.amounts.redevance_tax = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portbill_catalog::PricingMode;
    use portbill_core::UserId;

    fn shipment() -> ShipmentCode {
        ShipmentCode::new("LT-2024-001").unwrap()
    }

    fn service(mode: PricingMode, unit_price: Amount) -> ServiceDefinition {
        ServiceDefinition::new(ServiceId::new(), "PES", "Pesage", mode, unit_price).unwrap()
    }

    #[test]
    fn shipment_code_is_trimmed_and_required() {
        assert_eq!(ShipmentCode::new("  LT-9 ").unwrap().as_str(), "LT-9");
        assert!(matches!(
            ShipmentCode::new("   "),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn draft_is_priced_and_taxed_without_fee() {
        let item = ServiceLineItem::draft(
            shipment(),
            service(PricingMode::Flat, 1000),
            BillingInputs::new(3),
        );
        assert_eq!(item.charge(), 3000);
        assert_eq!(item.tax(), 540);
        assert_eq!(item.redevance(), 0);
        assert_eq!(item.redevance_tax(), 0);
        assert_eq!(item.total(), 3540);
        assert!(item.id().is_none());
        assert!(item.invoice_number().is_none());
    }

    #[test]
    fn non_taxable_draft_has_no_tax() {
        let item = ServiceLineItem::draft(
            shipment(),
            service(PricingMode::Flat, 1000),
            BillingInputs::new(1).taxable(false),
        );
        assert_eq!(item.tax(), 0);
    }

    #[test]
    fn validate_requires_weight_for_tonnage() {
        let item = ServiceLineItem::draft(
            shipment(),
            service(PricingMode::Tonnage, 44138),
            BillingInputs::new(1),
        );
        match item.validate().unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("weight")),
            _ => panic!("Expected Validation error for missing weight"),
        }
    }

    #[test]
    fn validate_requires_period_for_per_night_services() {
        let item = ServiceLineItem::draft(
            shipment(),
            service(PricingMode::TieredPerDay, 1000),
            BillingInputs::new(1),
        );
        assert!(matches!(item.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn ensure_mutable_names_highest_level() {
        let mut item = ServiceLineItem::draft(
            shipment(),
            service(PricingMode::Flat, 1000),
            BillingInputs::new(1),
        );
        assert!(item.ensure_mutable().is_ok());

        let level1 = Approval::draft().validate_level1(UserId::new()).unwrap();
        item.set_approval(level1);
        match item.ensure_mutable().unwrap_err() {
            DomainError::ImmutableRecord { level, .. } => assert_eq!(level, ApprovalLevel::Level1),
            _ => panic!("Expected ImmutableRecord error"),
        }

        item.set_approval(level1.validate_level2(UserId::new()).unwrap());
        match item.ensure_mutable().unwrap_err() {
            DomainError::ImmutableRecord { level, .. } => assert_eq!(level, ApprovalLevel::Level2),
            _ => panic!("Expected ImmutableRecord error"),
        }
    }
}
