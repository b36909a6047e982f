//! Schedule Solvers

use rust_decimal::Decimal;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    discounts::Discount,
    groups::ProductGroup,
    horizon::{PlanningHorizon, WeekId},
    ledger::Ledger,
    model::DemandModel,
    simulator::SimulationError,
};

pub mod heuristic;
pub mod milp;

/// Discount per week for one group.
pub type DiscountSequence = SmallVec<[Discount; 16]>;

/// Solver Errors
#[derive(Debug, Error)]
pub enum SolverError {
    /// A group has a week in which no discount tier is offered by every member product.
    #[error("group {group} has no discount offered by all of its products in week {week}")]
    NoEligibleDiscount {
        /// Group name
        group: String,
        /// Week identifier
        week: WeekId,
    },

    /// The model has no groups to schedule.
    #[error("demand model has no product groups")]
    NoGroups,

    /// The backend proved the formulation infeasible.
    #[error("the schedule formulation is infeasible")]
    Infeasible,

    /// The backend found the formulation unbounded.
    #[error("the schedule formulation is unbounded")]
    Unbounded,

    /// The backend failed to solve the formulation.
    #[error("MIP backend failed: {0}")]
    Backend(String),

    /// Quantity cannot be represented exactly as a solver coefficient.
    #[error("quantity cannot be represented exactly as a solver coefficient: {0}")]
    NotRepresentable(u64),

    /// Wrapped simulation error
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// Internal solver invariant was violated (this is a bug).
    #[error("solver invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },
}

/// Chosen schedule of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSchedule {
    /// Group name
    pub group: String,

    /// Discount applied in each planning week
    pub discounts: DiscountSequence,

    /// Revenue minus cost over the horizon
    pub profit: Decimal,

    /// Units left unsold at the end of the horizon
    pub inventory_left: u64,

    /// Whether the schedule meets the minimum sell-through rule
    pub feasible: bool,
}

/// Result of solving a demand model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// One schedule per group, in model order
    pub schedules: Vec<GroupSchedule>,

    /// Per-product, per-week outcome of the schedules
    pub ledger: Ledger,
}

impl Plan {
    /// Profit summed over groups.
    pub fn total_profit(&self) -> Decimal {
        self.schedules.iter().map(|schedule| schedule.profit).sum()
    }

    /// Schedule of a group, by name.
    pub fn schedule(&self, group: &str) -> Option<&GroupSchedule> {
        self.schedules.iter().find(|schedule| schedule.group == group)
    }
}

/// Trait for computing discount schedules for a demand model
pub trait Solver {
    /// Solve the schedule of every group in the model.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the model cannot be scheduled or the solver fails.
    fn solve(&self, model: &DemandModel) -> Result<Plan, SolverError>;
}

/// Ensure every week of the group offers at least one discount tier.
///
/// # Errors
///
/// Returns [`SolverError::NoEligibleDiscount`] naming the first week without tiers, or
/// [`SolverError::InvariantViolation`] if the horizon and the group differ in length.
pub(crate) fn ensure_schedulable(
    group: &ProductGroup,
    horizon: &PlanningHorizon,
) -> Result<(), SolverError> {
    if horizon.len() != group.week_count() {
        return Err(SolverError::InvariantViolation {
            message: "planning horizon and group cover different weeks",
        });
    }

    match group.first_week_without_tiers() {
        Some(week) => Err(SolverError::NoEligibleDiscount {
            group: group.name().to_string(),
            week: horizon
                .week_id(week)
                .ok_or(SolverError::InvariantViolation {
                    message: "week outside the planning horizon",
                })?,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::test_support::{single_product_group, two_week_horizon};

    use super::*;

    #[test]
    fn horizon_must_cover_every_group_week() -> TestResult {
        let group = single_product_group(100, &[(10, 5), (10, 5), (10, 5)], 4);

        assert!(matches!(
            ensure_schedulable(&group, &two_week_horizon()?),
            Err(SolverError::InvariantViolation { .. })
        ));

        let group = single_product_group(100, &[(10, 5), (10, 5)], 4);
        ensure_schedulable(&group, &two_week_horizon()?)?;

        Ok(())
    }
}
