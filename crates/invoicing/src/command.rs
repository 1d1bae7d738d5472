//! Typed line-item edits and the reducer that applies them.
//!
//! Each command names the field it changes, so the recomputation that follows
//! is fixed per command instead of being chosen from a field name at runtime.

use serde::{Deserialize, Serialize};

use portbill_catalog::{RedevanceRate, ServiceDefinition};
use portbill_core::DomainResult;

use crate::line_item::{LineDetails, ServiceLineItem};
use crate::period::DateRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineItemCommand {
    SetService(ServiceDefinition),
    SetQuantity(u32),
    SetWeight(Option<u64>),
    SetPeriod(Option<DateRange>),
    SetTaxable(bool),
    SetDetails(LineDetails),
}

impl LineItemCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LineItemCommand::SetService(_) => "set_service",
            LineItemCommand::SetQuantity(_) => "set_quantity",
            LineItemCommand::SetWeight(_) => "set_weight",
            LineItemCommand::SetPeriod(_) => "set_period",
            LineItemCommand::SetTaxable(_) => "set_taxable",
            LineItemCommand::SetDetails(_) => "set_details",
        }
    }
}

/// Apply `command` to a copy of `item` and recompute what depends on it.
///
/// `bearer_rate` is the computer-fee rate when `item` bears the fee for its
/// group; a quantity change then refreshes the fee as well. Validated items are
/// rejected and `item` itself is never modified.
pub fn reduce(
    item: &ServiceLineItem,
    command: &LineItemCommand,
    bearer_rate: Option<RedevanceRate>,
) -> DomainResult<ServiceLineItem> {
    item.ensure_mutable()?;

    let mut next = item.clone();
    match command {
        LineItemCommand::SetService(service) => {
            *next.service_mut() = service.clone();
            next.reprice();
        }
        LineItemCommand::SetQuantity(quantity) => {
            next.inputs_mut().quantity = *quantity;
            next.reprice();
            if let Some(rate) = bearer_rate {
                next.bear_redevance(rate);
            }
        }
        LineItemCommand::SetWeight(weight_kg) => {
            next.inputs_mut().weight_kg = *weight_kg;
            next.reprice();
        }
        LineItemCommand::SetPeriod(period) => {
            next.inputs_mut().period = *period;
            next.reprice();
        }
        LineItemCommand::SetTaxable(taxable) => {
            next.inputs_mut().taxable = *taxable;
            next.reprice();
        }
        LineItemCommand::SetDetails(details) => {
            *next.details_mut() = details.clone();
        }
    }
    Ok(next)
}
