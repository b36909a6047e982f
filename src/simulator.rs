//! Sell-through Simulator
//!
//! Deterministic evaluation of a fixed discount-per-week sequence applied to every product of a
//! group. Each product sells `min(remaining inventory, demand)` units per week at that week's
//! price and stops once it sells out, so later weeks contribute nothing.
//!
//! Products are independent. Totals are exact decimal sums, so they are identical whatever order
//! the products are evaluated in, which lets the `parallel` feature fan products out with `rayon`.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    discounts::Discount,
    groups::ProductGroup,
    horizon::PlanningHorizon,
    ledger::{Ledger, LedgerEntry},
    products::{Product, ProductId},
};

/// Errors raised by the simulator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    /// The sequence does not have one discount per planning week.
    #[error("discount sequence has {actual} weeks, expected {expected}")]
    LengthMismatch {
        /// Weeks in the horizon
        expected: usize,
        /// Weeks in the sequence
        actual: usize,
    },

    /// A product has no price/demand point for the scheduled discount.
    #[error("product {product} has no demand for discount {discount} in week index {week}")]
    MissingDemand {
        /// Product identifier
        product: ProductId,
        /// Week index
        week: usize,
        /// Scheduled discount
        discount: Discount,
    },

    /// The planning horizon and the group cover a different number of weeks.
    #[error("planning horizon has {horizon} weeks, the group has {weeks}")]
    HorizonMismatch {
        /// Weeks in the horizon
        horizon: usize,
        /// Weeks in the group
        weeks: usize,
    },
}

/// Outcome of one product under a discount sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductOutcome {
    /// Product identifier
    pub product_id: ProductId,

    /// Units sold in each simulated week. Weeks after the product sold out are not listed.
    pub sold: SmallVec<[u64; 16]>,

    /// Units left at the end of the horizon
    pub inventory_left: u64,

    /// Revenue minus cost of the units sold
    pub profit: Decimal,
}

/// Outcome of a whole group under a discount sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    /// Profit summed over products
    pub total_profit: Decimal,

    /// Units left summed over products
    pub total_inventory_left: u64,

    /// Per-product outcomes in group order
    pub outcomes: Vec<ProductOutcome>,
}

impl SimulationResult {
    /// Whether the ending inventory stays within `cap` units.
    pub fn within_ending_inventory(&self, cap: Decimal) -> bool {
        Decimal::from(self.total_inventory_left) <= cap
    }
}

/// Simulate a discount sequence over every product of a group.
///
/// # Errors
///
/// Returns a [`SimulationError`] if the sequence length differs from the group's horizon or a
/// product has no demand for a scheduled discount.
pub fn simulate(
    group: &ProductGroup,
    discounts: &[Discount],
) -> Result<SimulationResult, SimulationError> {
    if discounts.len() != group.week_count() {
        return Err(SimulationError::LengthMismatch {
            expected: group.week_count(),
            actual: discounts.len(),
        });
    }

    #[cfg(feature = "parallel")]
    let outcomes = group
        .products()
        .par_iter()
        .map(|product| simulate_product(product, discounts))
        .collect::<Result<Vec<_>, _>>()?;

    #[cfg(not(feature = "parallel"))]
    let outcomes = group
        .products()
        .iter()
        .map(|product| simulate_product(product, discounts))
        .collect::<Result<Vec<_>, _>>()?;

    let total_profit = outcomes.iter().map(|outcome| outcome.profit).sum();
    let total_inventory_left = outcomes.iter().map(|outcome| outcome.inventory_left).sum();

    Ok(SimulationResult {
        total_profit,
        total_inventory_left,
        outcomes,
    })
}

/// Simulate one product.
///
/// # Errors
///
/// Returns [`SimulationError::MissingDemand`] if the product has no demand for a scheduled
/// discount before it sells out.
pub fn simulate_product(
    product: &Product,
    discounts: &[Discount],
) -> Result<ProductOutcome, SimulationError> {
    let mut inventory = product.initial_inventory;
    let mut profit = Decimal::ZERO;
    let mut sold = SmallVec::new();

    for (week, discount) in discounts.iter().copied().enumerate() {
        let point = product
            .price_demand(week, discount)
            .ok_or(SimulationError::MissingDemand {
                product: product.id,
                week,
                discount,
            })?;

        let quantity = inventory.min(point.demand);

        inventory -= quantity;
        profit += Decimal::from(quantity) * (point.selling_price - product.cost);
        sold.push(quantity);

        if inventory == 0 {
            break;
        }
    }

    Ok(ProductOutcome {
        product_id: product.id,
        sold,
        inventory_left: inventory,
        profit,
    })
}

/// Re-run a discount sequence and record every product and week in a ledger.
///
/// Weeks after a product sold out are recorded with zero units sold.
///
/// # Errors
///
/// Returns a [`SimulationError`] if the sequence does not fit the group.
pub fn ledger(
    group: &ProductGroup,
    horizon: &PlanningHorizon,
    discounts: &[Discount],
) -> Result<Ledger, SimulationError> {
    if horizon.len() != group.week_count() {
        return Err(SimulationError::HorizonMismatch {
            horizon: horizon.len(),
            weeks: group.week_count(),
        });
    }

    if discounts.len() != group.week_count() {
        return Err(SimulationError::LengthMismatch {
            expected: group.week_count(),
            actual: discounts.len(),
        });
    }

    let mut ledger = Ledger::default();

    for product in group.products() {
        let mut inventory = product.initial_inventory;

        for (week, discount) in discounts.iter().copied().enumerate() {
            let point = product
                .price_demand(week, discount)
                .ok_or(SimulationError::MissingDemand {
                    product: product.id,
                    week,
                    discount,
                })?;

            let quantity = inventory.min(point.demand);
            inventory -= quantity;

            let units = Decimal::from(quantity);

            ledger.push(LedgerEntry {
                product_id: product.id,
                week: horizon
                    .week_id(week)
                    .ok_or(SimulationError::HorizonMismatch {
                        horizon: horizon.len(),
                        weeks: group.week_count(),
                    })?,
                quantity_sold: quantity,
                selling_price: point.selling_price,
                revenue: units * point.selling_price,
                cost: units * product.cost,
                demand: point.demand,
            });
        }
    }

    Ok(ledger)
}
