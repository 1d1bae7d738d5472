//! Charge computation for a single service line.
//!
//! Pure functions of the service definition and the billing inputs; no state.

use portbill_catalog::{PricingMode, ServiceDefinition};
use portbill_core::{Amount, round_ratio};

use crate::period::DateRange;

/// Nights at the start of a banded stay that are never billed.
pub const FREE_NIGHTS: i64 = 7;
/// Last night billed under `tarif1`.
pub const TIER1_LAST_NIGHT: i64 = 14;
/// Last night billed under `tarif2`; later nights fall under `tarif3`.
pub const TIER2_LAST_NIGHT: i64 = 44;

const KG_PER_TON: u64 = 1000;

/// Per-band contribution of a `TieredPerDay` charge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TieredBreakdown {
    pub nights: i64,
    /// Nights billed without any band (no tier rate configured at all).
    pub unbanded: Amount,
    pub tier1: Amount,
    pub tier2: Amount,
    pub tier3: Amount,
}

impl TieredBreakdown {
    pub fn total(&self) -> Amount {
        self.unbanded
            .saturating_add(self.tier1)
            .saturating_add(self.tier2)
            .saturating_add(self.tier3)
    }
}

/// Charge for `service` given the line inputs.
///
/// `quantity` below one is billed as one. Tonnage without a weight and per-night
/// pricing without a period both price at zero.
pub fn price(
    service: &ServiceDefinition,
    quantity: u32,
    weight_kg: Option<u64>,
    period: Option<&DateRange>,
) -> Amount {
    match service.mode {
        PricingMode::Flat => service.unit_price.saturating_mul(effective_quantity(quantity)),
        PricingMode::Tonnage => match weight_kg {
            Some(kg) => round_ratio(kg, service.unit_price, KG_PER_TON),
            None => 0,
        },
        PricingMode::TieredPerDay => match period {
            Some(period) => tiered_breakdown(service, quantity, period.nights()).total(),
            None => 0,
        },
    }
}

/// Split a per-night charge into its bands.
///
/// Without any tier rate every night is billed at the base price. With at least
/// one rate configured, the first `FREE_NIGHTS` are free and each band only
/// contributes when its own rate is set.
pub fn tiered_breakdown(service: &ServiceDefinition, quantity: u32, nights: i64) -> TieredBreakdown {
    let mut breakdown = TieredBreakdown {
        nights,
        ..TieredBreakdown::default()
    };
    if nights <= 0 {
        return breakdown;
    }

    let base = service.unit_price.saturating_mul(effective_quantity(quantity));
    let tiers = &service.tiers;

    if !tiers.any_configured() {
        breakdown.unbanded = base.saturating_mul(nights as u64);
        return breakdown;
    }

    if tiers.tarif1.is_some() {
        breakdown.tier1 = base.saturating_mul(band_nights(nights, FREE_NIGHTS, Some(TIER1_LAST_NIGHT)));
    }
    if tiers.tarif2.is_some() {
        breakdown.tier2 = base.saturating_mul(band_nights(nights, TIER1_LAST_NIGHT, Some(TIER2_LAST_NIGHT)));
    }
    if tiers.tarif3.is_some() {
        breakdown.tier3 = base.saturating_mul(band_nights(nights, TIER2_LAST_NIGHT, None));
    }

    breakdown
}

fn effective_quantity(quantity: u32) -> u64 {
    u64::from(quantity.max(1))
}

/// Nights of `nights` that fall in `(after, last]`.
fn band_nights(nights: i64, after: i64, last: Option<i64>) -> u64 {
    let upper = match last {
        Some(last) => nights.min(last),
        None => nights,
    };
    (upper - after).max(0) as u64
}
