use serde::{Deserialize, Serialize};

use portbill_core::Amount;

/// Current computer-fee rate, charged per unit of quantity on one line per invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedevanceRate(Amount);

impl RedevanceRate {
    pub const fn new(per_unit: Amount) -> Self {
        Self(per_unit)
    }

    pub const fn per_unit(&self) -> Amount {
        self.0
    }

    /// Fee owed for `quantity` units (a quantity below one counts as one).
    pub fn amount_for(&self, quantity: u32) -> Amount {
        self.0.saturating_mul(u64::from(quantity.max(1)))
    }
}
