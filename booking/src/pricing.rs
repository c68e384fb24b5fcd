//! Price difference arithmetic and the rolled-up price summary

use serde::{Deserialize, Serialize};
use tripflow_api::{Itinerary, ResourceKind};

use crate::transform::day_resources;

/// Smallest movement that counts as a price change
pub const PRICE_EPSILON: f64 = 0.01;

/// `difference / original * 100`, or 0 when the original is 0
#[must_use]
pub fn percentage_change(original: f64, difference: f64) -> f64 {
    if original == 0.0 {
        0.0
    } else {
        difference / original * 100.0
    }
}

/// Old and new price of one item
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    /// Price captured from the itinerary
    pub original_price: f64,
    /// Price returned by the recheck
    pub new_price: f64,
    /// `new - original`
    pub difference: f64,
    /// Difference relative to the original, in percent
    pub percentage_change: f64,
}

impl PriceChange {
    /// Compare a rechecked price to the original one
    #[must_use]
    pub fn compute(original_price: f64, new_price: f64) -> Self {
        let difference = new_price - original_price;
        Self {
            original_price,
            new_price,
            difference,
            percentage_change: percentage_change(original_price, difference),
        }
    }

    /// Whether the price moved by at least a cent
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.difference.abs() >= PRICE_EPSILON
    }
}

/// Totals by resource type
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentTotals {
    /// All flights
    pub flights: f64,
    /// All hotels
    pub hotels: f64,
    /// All activities
    pub activities: f64,
    /// All transfers
    pub transfers: f64,
    /// Sum of the four segments
    pub total: f64,
}

impl SegmentTotals {
    /// Add a price to its segment and to the total
    pub fn add(&mut self, kind: ResourceKind, price: f64) {
        match kind {
            ResourceKind::Flight => self.flights += price,
            ResourceKind::Hotel => self.hotels += price,
            ResourceKind::Activity => self.activities += price,
            ResourceKind::Transfer => self.transfers += price,
        }
        self.total += price;
    }

    /// Totals of an itinerary at its quoted prices
    #[must_use]
    pub fn of_itinerary(itinerary: &Itinerary) -> Self {
        let mut totals = Self::default();
        for (_, day) in itinerary.days() {
            for resource in day_resources(day) {
                totals.add(resource.kind(), resource.price());
            }
        }
        totals
    }
}

/// Price summary the user confirms before the final commit
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// Totals at itinerary prices
    pub original_totals: SegmentTotals,
    /// Totals with rechecked prices
    pub new_totals: SegmentTotals,
    /// `new_totals.total - original_totals.total`
    pub difference: f64,
    /// Difference relative to the original total, in percent
    pub percentage_change: f64,
    /// Whether any rechecked item moved by at least a cent
    pub has_price_changed: bool,
}

impl PriceSummary {
    /// Roll up rechecked flights and hotels over the whole itinerary
    ///
    /// Activities and transfers are not rechecked and count at their quoted
    /// price on both sides.
    pub fn build<'a>(
        itinerary: &Itinerary,
        flights: impl IntoIterator<Item = &'a PriceChange>,
        hotels: impl IntoIterator<Item = &'a PriceChange>,
    ) -> Self {
        let original_totals = SegmentTotals::of_itinerary(itinerary);

        let mut new_totals = original_totals;
        new_totals.flights = 0.0;
        new_totals.hotels = 0.0;
        new_totals.total = new_totals.activities + new_totals.transfers;

        let mut has_price_changed = false;
        for (kind, changes) in [
            (ResourceKind::Flight, flights.into_iter().collect::<Vec<_>>()),
            (ResourceKind::Hotel, hotels.into_iter().collect::<Vec<_>>()),
        ] {
            for change in changes {
                new_totals.add(kind, change.new_price);
                has_price_changed |= change.has_changed();
            }
        }

        let difference = new_totals.total - original_totals.total;
        Self {
            original_totals,
            new_totals,
            difference,
            percentage_change: percentage_change(original_totals.total, difference),
            has_price_changed,
        }
    }
}
