use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AirplaneId, Cents, Grams, PilotId};

pub type FuelTypeId = i64;
pub type RefuelId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelType {
    pub id: FuelTypeId,
    pub name: String,
    /// Grams per liter (Jet A-1 is about 800).
    pub density_g_per_l: Grams,
    pub price_per_liter: Cents,
}

impl FuelType {
    /// Price and mass of `liters` of this fuel at the current list price.
    pub fn quote(&self, liters: i64) -> RefuelQuote {
        RefuelQuote {
            liters,
            price_per_liter: self.price_per_liter,
            cost: liters * self.price_per_liter,
            added_mass: liters * self.density_g_per_l,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefuelQuote {
    pub liters: i64,
    pub price_per_liter: Cents,
    pub cost: Cents,
    pub added_mass: Grams,
}

/// A fuel purchase for an airplane. The price is frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refuel {
    pub id: RefuelId,
    pub airplane_id: AirplaneId,
    pub fuel_type_id: FuelTypeId,
    pub pilot_id: Option<PilotId>,
    pub liters: i64,
    pub price_per_liter: Cents,
    pub cost: Cents,
    pub added_mass: Grams,
    pub refueled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        let jet_a1 = FuelType {
            id: 1,
            name: "Jet A-1".into(),
            density_g_per_l: 804,
            price_per_liter: 185,
        };

        let quote = jet_a1.quote(200);

        assert_eq!(quote.cost, 37_000);
        assert_eq!(quote.added_mass, 160_800);
        assert_eq!(quote.price_per_liter, 185);
    }
}
