use serde::{Deserialize, Serialize};

use portbill_core::{Amount, DomainError, DomainResult, ServiceId};

/// How a service turns its inputs into a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingMode {
    /// `unit_price * quantity`.
    Flat,
    /// `unit_price` per metric ton of declared weight.
    Tonnage,
    /// `unit_price` per night, optionally banded by `TierRates`.
    TieredPerDay,
}

/// Night bands for `TieredPerDay` pricing.
///
/// Only the presence of a rate matters: a configured band bills its nights at
/// the service base price, an unconfigured band bills nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRates {
    /// Nights 8..=14.
    pub tarif1: Option<Amount>,
    /// Nights 15..=44.
    pub tarif2: Option<Amount>,
    /// Nights 45 and beyond.
    pub tarif3: Option<Amount>,
}

impl TierRates {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all(rate: Amount) -> Self {
        Self {
            tarif1: Some(rate),
            tarif2: Some(rate),
            tarif3: Some(rate),
        }
    }

    pub fn any_configured(&self) -> bool {
        self.tarif1.is_some() || self.tarif2.is_some() || self.tarif3.is_some()
    }
}

/// Catalog entry for a billable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: ServiceId,
    pub code: String,
    pub name: String,
    pub mode: PricingMode,
    /// Price in smallest currency unit, per unit of the pricing mode.
    pub unit_price: Amount,
    #[serde(default)]
    pub tiers: TierRates,
    pub active: bool,
}

impl ServiceDefinition {
    /// Build an active catalog entry without tier rates.
    pub fn new(
        id: ServiceId,
        code: impl Into<String>,
        name: impl Into<String>,
        mode: PricingMode,
        unit_price: Amount,
    ) -> DomainResult<Self> {
        let code = code.into();
        let name = name.into();

        if code.trim().is_empty() {
            return Err(DomainError::validation("service code cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("service name cannot be empty"));
        }

        Ok(Self {
            id,
            code,
            name,
            mode,
            unit_price,
            tiers: TierRates::none(),
            active: true,
        })
    }

    pub fn with_tiers(mut self, tiers: TierRates) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn requires_weight(&self) -> bool {
        self.mode == PricingMode::Tonnage
    }

    pub fn requires_period(&self) -> bool {
        self.mode == PricingMode::TieredPerDay
    }
}
