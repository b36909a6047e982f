//! MILP Observer

use crate::solvers::milp::backend::{
    ConstraintId, Direction, SolveStatus, VariableId, VariableKind,
};

/// Observer trait for capturing the MILP formulation as it's built.
///
/// The formulation calls the observer right after each change it makes to the backend, so an
/// observer sees the same variables, rows and objective the solver does without rebuilding any of
/// them. Renderers such as the LP writer are observers.
pub trait MilpObserver {
    /// Called when a variable is created.
    fn on_variable(
        &mut self,
        variable: VariableId,
        kind: VariableKind,
        lower: f64,
        upper: f64,
        label: &str,
    );

    /// Called when a constraint row is complete.
    ///
    /// `terms` holds every non-zero coefficient of the row in insertion order.
    fn on_constraint(
        &mut self,
        constraint: ConstraintId,
        label: &str,
        lower: f64,
        upper: f64,
        terms: &[(VariableId, f64)],
    );

    /// Called when an objective coefficient is set.
    fn on_objective_term(&mut self, variable: VariableId, coefficient: f64);

    /// Called when the optimisation direction is set.
    fn on_direction(&mut self, _direction: Direction) {}

    /// Called once the backend has finished solving.
    fn on_solved(&mut self, _status: &SolveStatus) {}
}

/// No-op observer that ignores all callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MilpObserver for NoopObserver {
    fn on_variable(&mut self, _: VariableId, _: VariableKind, _: f64, _: f64, _: &str) {}

    fn on_constraint(&mut self, _: ConstraintId, _: &str, _: f64, _: f64, _: &[(VariableId, f64)]) {
    }

    fn on_objective_term(&mut self, _: VariableId, _: f64) {}
}
