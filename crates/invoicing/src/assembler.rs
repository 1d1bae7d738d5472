//! Read-side view: line items grouped into invoices with their totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use portbill_core::{Amount, DomainError, DomainResult};

use crate::approval::{InvoiceApproval, Level1InvalidationPolicy, ValidationState};
use crate::line_item::{InvoiceNumber, LineAmounts, ServiceLineItem, ShipmentCode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub charge: Amount,
    pub tax: Amount,
    pub redevance: Amount,
    pub redevance_tax: Amount,
    pub grand_total: Amount,
}

impl From<LineAmounts> for InvoiceTotals {
    fn from(amounts: LineAmounts) -> Self {
        Self {
            charge: amounts.charge,
            tax: amounts.tax,
            redevance: amounts.redevance,
            redevance_tax: amounts.redevance_tax,
            grand_total: amounts.total(),
        }
    }
}

/// One invoice as the billing screens and exports see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice_number: InvoiceNumber,
    pub shipment_code: ShipmentCode,
    pub state: ValidationState,
    pub lines: Vec<ServiceLineItem>,
    pub totals: InvoiceTotals,
}

pub struct InvoiceAssembler;

impl InvoiceAssembler {
    /// Group persisted lines by invoice number, ordered by invoice number.
    ///
    /// Lines without an invoice number are not yet saved and are skipped.
    pub fn assemble(items: &[ServiceLineItem]) -> DomainResult<Vec<InvoiceSummary>> {
        let mut by_invoice: BTreeMap<&InvoiceNumber, Vec<ServiceLineItem>> = BTreeMap::new();
        for item in items {
            if let Some(number) = item.invoice_number() {
                by_invoice.entry(number).or_default().push(item.clone());
            }
        }

        by_invoice
            .into_iter()
            .map(|(number, lines)| Self::summarize(number, lines))
            .collect()
    }

    /// Summarize a single invoice from `items`, ignoring lines of other invoices.
    pub fn assemble_one(
        invoice_number: &InvoiceNumber,
        items: &[ServiceLineItem],
    ) -> DomainResult<InvoiceSummary> {
        let lines: Vec<ServiceLineItem> = items
            .iter()
            .filter(|item| item.invoice_number() == Some(invoice_number))
            .cloned()
            .collect();
        Self::summarize(invoice_number, lines)
    }

    fn summarize(
        invoice_number: &InvoiceNumber,
        lines: Vec<ServiceLineItem>,
    ) -> DomainResult<InvoiceSummary> {
        // policy does not affect the derived state
        let approval =
            InvoiceApproval::from_lines(invoice_number, &lines, Level1InvalidationPolicy::default())?;

        let shipment_code = lines[0].shipment_code().clone();
        if let Some(stray) = lines.iter().find(|l| l.shipment_code() != &shipment_code) {
            return Err(DomainError::invariant(format!(
                "invoice {invoice_number} spans shipments {shipment_code} and {}",
                stray.shipment_code()
            )));
        }

        let totals = lines
            .iter()
            .fold(LineAmounts::default(), |acc, l| acc.saturating_add(*l.amounts()));

        Ok(InvoiceSummary {
            invoice_number: invoice_number.clone(),
            shipment_code,
            state: approval.state(),
            lines,
            totals: totals.into(),
        })
    }
}
