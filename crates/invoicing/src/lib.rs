//! Invoicing domain for port services.
//!
//! Line items for billable services, grouped per shipment and assembled into
//! invoices, with a two-level approval workflow. Pure domain logic: no IO and
//! no storage. Money is integral (smallest currency unit) throughout.

pub mod approval;
pub mod assembler;
pub mod command;
pub mod group;
pub mod line_item;
pub mod period;
pub mod pricing;
pub mod tax;

pub use approval::{
    Approval, ApprovalCommand, ApprovalEvent, InvalidateLevel1, InvalidateLevel2, InvoiceApproval,
    Level1Invalidated, Level1InvalidationPolicy, Level1Validated, Level2Invalidated,
    Level2Validated, ValidateLevel1, ValidateLevel2, ValidationState,
};
pub use assembler::{InvoiceAssembler, InvoiceSummary, InvoiceTotals};
pub use command::{LineItemCommand, reduce};
pub use group::LineItemGroup;
pub use line_item::{
    BillingInputs, InvoiceNumber, LineAmounts, LineDetails, ServiceLineItem, ShipmentCode,
};
pub use period::DateRange;
pub use pricing::{TieredBreakdown, price, tiered_breakdown};
pub use tax::{TAX_RATE_PERCENT, tax};
