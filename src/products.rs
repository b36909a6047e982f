//! Products

use std::fmt;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::discounts::Discount;

/// Product identifier, as found in the input data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selling price and expected demand for one product, week and discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceDemand {
    /// Selling price after the discount is applied
    pub selling_price: Decimal,

    /// Units that would sell at that price
    pub demand: u64,
}

impl PriceDemand {
    /// Create a new price/demand point.
    pub fn new(selling_price: Decimal, demand: u64) -> Self {
        Self {
            selling_price,
            demand,
        }
    }

    /// Revenue if the full demand is served.
    pub fn revenue(&self) -> Decimal {
        self.selling_price * Decimal::from(self.demand)
    }
}

/// Per-week demand curves of a product, indexed by week index.
#[derive(Debug, Clone, Default)]
pub struct DemandCurve {
    weeks: Vec<FxHashMap<Discount, PriceDemand>>,
}

impl DemandCurve {
    /// Create an empty curve covering `week_count` weeks.
    pub fn with_weeks(week_count: usize) -> Self {
        Self {
            weeks: vec![FxHashMap::default(); week_count],
        }
    }

    /// Record a price/demand point, returning the previous one if the slot was filled.
    ///
    /// Points for weeks outside the curve are ignored.
    pub fn insert(
        &mut self,
        week: usize,
        discount: Discount,
        point: PriceDemand,
    ) -> Option<PriceDemand> {
        self.weeks.get_mut(week)?.insert(discount, point)
    }

    /// Look up the price/demand point for a week and discount.
    pub fn get(&self, week: usize, discount: Discount) -> Option<&PriceDemand> {
        self.weeks.get(week)?.get(&discount)
    }

    /// Whether a week offers the given discount.
    pub fn offers(&self, week: usize, discount: Discount) -> bool {
        self.get(week, discount).is_some()
    }

    /// All price/demand points of a week.
    pub fn week(&self, week: usize) -> impl Iterator<Item = (&Discount, &PriceDemand)> {
        self.weeks.get(week).into_iter().flat_map(|points| points.iter())
    }

    /// Number of weeks covered by the curve.
    pub fn len(&self) -> usize {
        self.weeks.len()
    }

    /// Whether the curve covers no weeks.
    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }
}

/// Product
#[derive(Debug, Clone)]
pub struct Product {
    /// Product identifier
    pub id: ProductId,

    /// Units on hand at the start of the horizon
    pub initial_inventory: u64,

    /// Unit cost
    pub cost: Decimal,

    /// Name of the owning group
    pub group: String,

    /// Price/demand points per week and discount
    pub curve: DemandCurve,
}

impl Product {
    /// Create a product with an empty demand curve covering `week_count` weeks.
    pub fn new(
        id: ProductId,
        initial_inventory: u64,
        cost: Decimal,
        group: impl Into<String>,
        week_count: usize,
    ) -> Self {
        Self {
            id,
            initial_inventory,
            cost,
            group: group.into(),
            curve: DemandCurve::with_weeks(week_count),
        }
    }

    /// Price/demand point for a week and discount.
    pub fn price_demand(&self, week: usize, discount: Discount) -> Option<&PriceDemand> {
        self.curve.get(week, discount)
    }

    /// Largest demand of any discount in the week. This is the tightest big-M for the week.
    pub fn max_demand(&self, week: usize) -> u64 {
        self.curve
            .week(week)
            .map(|(_, point)| point.demand)
            .max()
            .unwrap_or_default()
    }

    /// Largest selling price of any discount in the week.
    pub fn max_price(&self, week: usize) -> Decimal {
        self.curve
            .week(week)
            .map(|(_, point)| point.selling_price)
            .max()
            .unwrap_or_default()
    }

    /// Largest full-demand revenue of any discount in the week.
    pub fn max_revenue(&self, week: usize) -> Decimal {
        self.curve
            .week(week)
            .map(|(_, point)| point.revenue())
            .max()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn product() -> Product {
        let mut product = Product::new(ProductId(7), 50, Decimal::from(4), "g", 2);

        product.curve.insert(
            0,
            Discount::ZERO,
            PriceDemand::new(Decimal::from(10), 30),
        );
        product.curve.insert(
            0,
            Discount::from_points(20),
            PriceDemand::new(Decimal::from(8), 45),
        );

        product
    }

    #[test]
    fn week_maxima_are_taken_across_discounts() {
        let product = product();

        assert_eq!(product.max_demand(0), 45);
        assert_eq!(product.max_price(0), Decimal::from(10));
        assert_eq!(product.max_revenue(0), Decimal::from(360));
    }

    #[test]
    fn empty_week_maxima_are_zero() {
        let product = product();

        assert_eq!(product.max_demand(1), 0);
        assert_eq!(product.max_revenue(1), Decimal::ZERO);
    }

    #[test]
    fn insert_outside_horizon_is_ignored() {
        let mut product = product();

        let previous = product.curve.insert(
            5,
            Discount::ZERO,
            PriceDemand::new(Decimal::ONE, 1),
        );

        assert!(previous.is_none());
        assert!(!product.curve.offers(5, Discount::ZERO));
        assert_eq!(product.curve.len(), 2);
    }
}
