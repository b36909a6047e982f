//! MILP State

use std::fmt;

use crate::solvers::milp::{
    backend::{ConstraintId, Direction, MipBackend, SolveStatus, VariableId, VariableKind},
    observer::MilpObserver,
};

/// Builder state that forwards every change to the backend and the observer.
pub(crate) struct MilpState<'a, B: MipBackend + ?Sized, O: MilpObserver + ?Sized> {
    backend: &'a mut B,
    observer: &'a mut O,
}

impl<B: MipBackend + ?Sized, O: MilpObserver + ?Sized> fmt::Debug for MilpState<'_, B, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MilpState")
            .field("variables", &self.backend.variable_count())
            .field("constraints", &self.backend.constraint_count())
            .finish_non_exhaustive()
    }
}

impl<'a, B: MipBackend + ?Sized, O: MilpObserver + ?Sized> MilpState<'a, B, O> {
    pub(crate) fn new(backend: &'a mut B, observer: &'a mut O) -> Self {
        Self { backend, observer }
    }

    pub(crate) fn variable(
        &mut self,
        kind: VariableKind,
        lower: f64,
        upper: f64,
        label: &str,
    ) -> VariableId {
        let id = self.backend.add_variable(kind, lower, upper, label);

        self.observer.on_variable(id, kind, lower, upper, label);

        id
    }

    /// Add a ranged row `lower <= Σ terms <= upper`. Zero coefficients are left out.
    pub(crate) fn row(
        &mut self,
        label: &str,
        lower: f64,
        upper: f64,
        terms: &[(VariableId, f64)],
    ) -> ConstraintId {
        let kept: Vec<(VariableId, f64)> = terms
            .iter()
            .copied()
            .filter(|(_, coefficient)| *coefficient != 0.0)
            .collect();

        let id = self.backend.add_constraint(lower, upper, label);

        for (variable, coefficient) in kept.iter().copied() {
            self.backend.set_coefficient(id, variable, coefficient);
        }

        self.observer.on_constraint(id, label, lower, upper, &kept);

        id
    }

    pub(crate) fn objective(&mut self, variable: VariableId, coefficient: f64) {
        self.backend.set_objective_coefficient(variable, coefficient);
        self.observer.on_objective_term(variable, coefficient);
    }

    pub(crate) fn direction(&mut self, direction: Direction) {
        self.backend.set_direction(direction);
        self.observer.on_direction(direction);
    }

    pub(crate) fn solve(&mut self) -> SolveStatus {
        let status = self.backend.solve();

        self.observer.on_solved(&status);

        status
    }

    pub(crate) fn value_of(&self, variable: VariableId) -> Option<f64> {
        self.backend.value_of(variable)
    }

    pub(crate) fn variable_count(&self) -> usize {
        self.backend.variable_count()
    }

    pub(crate) fn constraint_count(&self) -> usize {
        self.backend.constraint_count()
    }
}
