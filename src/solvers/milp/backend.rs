//! MIP Backend
//!
//! Row-oriented interface to a mixed-integer solver: variables with bounds, ranged constraint rows
//! with per-variable coefficients, an objective and a direction. The formulation only talks to
//! this trait, so the LP dump and tests see exactly the model the solver sees.

use std::fmt;

#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as default_solver;
#[cfg(all(not(feature = "solver-highs"), feature = "solver-microlp"))]
use good_lp::solvers::microlp::microlp as default_solver;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable,
    VariableDefinition, variable,
};

/// Domain of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Real valued
    Continuous,

    /// Integer valued
    Integer,

    /// Integer valued in `0..=1`
    Binary,
}

/// Handle of a variable created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(usize);

impl VariableId {
    /// Creation order of the variable.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle of a constraint row created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(usize);

impl ConstraintId {
    /// Creation order of the row.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Optimisation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Maximise the objective
    Maximise,

    /// Minimise the objective
    Minimise,
}

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    /// An optimal solution was found
    Optimal,

    /// The problem has no feasible solution
    Infeasible,

    /// The objective is unbounded
    Unbounded,

    /// The backend failed
    Error(String),
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => f.write_str("optimal"),
            SolveStatus::Infeasible => f.write_str("infeasible"),
            SolveStatus::Unbounded => f.write_str("unbounded"),
            SolveStatus::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Mixed-integer solver interface.
///
/// Rows are ranged: `lower <= Σ coefficient · variable <= upper`, with infinite bounds meaning
/// the side is absent. Setting a coefficient twice replaces the earlier value.
pub trait MipBackend {
    /// Create a variable with the given bounds.
    fn add_variable(
        &mut self,
        kind: VariableKind,
        lower: f64,
        upper: f64,
        label: &str,
    ) -> VariableId;

    /// Create an empty constraint row with the given range.
    fn add_constraint(&mut self, lower: f64, upper: f64, label: &str) -> ConstraintId;

    /// Set the coefficient of `variable` in `constraint`.
    fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, value: f64);

    /// Set the objective coefficient of `variable`.
    fn set_objective_coefficient(&mut self, variable: VariableId, value: f64);

    /// Set the optimisation direction.
    fn set_direction(&mut self, direction: Direction);

    /// Solve the problem built so far.
    fn solve(&mut self) -> SolveStatus;

    /// Value of a variable in the last optimal solution.
    fn value_of(&self, variable: VariableId) -> Option<f64>;

    /// Number of variables created.
    fn variable_count(&self) -> usize;

    /// Number of constraint rows created.
    fn constraint_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Row {
    lower: f64,
    upper: f64,
    terms: Vec<(VariableId, f64)>,
}

#[derive(Debug, Clone)]
struct VariableSpec {
    kind: VariableKind,
    lower: f64,
    upper: f64,
    label: String,
}

impl VariableSpec {
    fn definition(&self) -> VariableDefinition {
        let mut definition = variable().name(self.label.as_str());

        if self.lower.is_finite() {
            definition = definition.min(self.lower);
        }

        if self.upper.is_finite() {
            definition = definition.max(self.upper);
        }

        if self.kind != VariableKind::Continuous {
            definition = definition.integer();
        }

        definition
    }
}

/// [`MipBackend`] on top of `good_lp`, using HiGHS when the `solver-highs` feature is enabled and
/// microlp otherwise.
///
/// Variables and rows are recorded and the `good_lp` problem is assembled on every
/// [`MipBackend::solve`], so the model can still grow after a solve.
#[derive(Debug, Clone)]
pub struct GoodLpBackend {
    variables: Vec<VariableSpec>,
    rows: Vec<Row>,
    objective: Vec<(VariableId, f64)>,
    direction: Direction,
    values: Vec<f64>,
}

impl Default for GoodLpBackend {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            rows: Vec::new(),
            objective: Vec::new(),
            direction: Direction::Maximise,
            values: Vec::new(),
        }
    }
}

impl GoodLpBackend {
    /// Empty problem.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MipBackend for GoodLpBackend {
    fn add_variable(
        &mut self,
        kind: VariableKind,
        lower: f64,
        upper: f64,
        label: &str,
    ) -> VariableId {
        let (lower, upper) = match kind {
            VariableKind::Binary => (lower.max(0.0), upper.min(1.0)),
            VariableKind::Continuous | VariableKind::Integer => (lower, upper),
        };

        self.variables.push(VariableSpec {
            kind,
            lower,
            upper,
            label: label.to_string(),
        });

        VariableId(self.variables.len() - 1)
    }

    fn add_constraint(&mut self, lower: f64, upper: f64, _label: &str) -> ConstraintId {
        self.rows.push(Row {
            lower,
            upper,
            terms: Vec::new(),
        });

        ConstraintId(self.rows.len() - 1)
    }

    fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, value: f64) {
        let Some(row) = self.rows.get_mut(constraint.index()) else {
            return;
        };

        set_term(&mut row.terms, variable, value);
    }

    fn set_objective_coefficient(&mut self, variable: VariableId, value: f64) {
        set_term(&mut self.objective, variable, value);
    }

    fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    fn solve(&mut self) -> SolveStatus {
        self.values.clear();

        // Rows without terms reduce to `lower <= 0 <= upper`.
        if self
            .rows
            .iter()
            .any(|row| row.terms.is_empty() && (row.lower > 0.0 || row.upper < 0.0))
        {
            return SolveStatus::Infeasible;
        }

        let mut problem = ProblemVariables::new();

        let variables: Vec<Variable> = self
            .variables
            .iter()
            .map(|spec| problem.add(spec.definition()))
            .collect();

        let Some(objective) = expression(&variables, &self.objective) else {
            return unknown_variable();
        };

        let unsolved = match self.direction {
            Direction::Maximise => problem.maximise(objective),
            Direction::Minimise => problem.minimise(objective),
        };

        let mut model = unsolved.using(default_solver);

        for row in self.rows.iter().filter(|row| !row.terms.is_empty()) {
            let Some(expr) = expression(&variables, &row.terms) else {
                return unknown_variable();
            };

            model = apply_row(model, expr, row.lower, row.upper);
        }

        match model.solve() {
            Ok(solution) => {
                self.values = variables.iter().map(|v| solution.value(*v)).collect();

                SolveStatus::Optimal
            }
            Err(ResolutionError::Infeasible) => SolveStatus::Infeasible,
            Err(ResolutionError::Unbounded) => SolveStatus::Unbounded,
            Err(err) => SolveStatus::Error(err.to_string()),
        }
    }

    fn value_of(&self, variable: VariableId) -> Option<f64> {
        self.values.get(variable.index()).copied()
    }

    fn variable_count(&self) -> usize {
        self.variables.len()
    }

    fn constraint_count(&self) -> usize {
        self.rows.len()
    }
}

/// Linear expression over `terms`. `None` if a term names a variable this backend never created.
fn expression(variables: &[Variable], terms: &[(VariableId, f64)]) -> Option<Expression> {
    let mut expr = Expression::default();

    for (id, coefficient) in terms {
        expr += *variables.get(id.index())? * *coefficient;
    }

    Some(expr)
}

fn unknown_variable() -> SolveStatus {
    SolveStatus::Error("a term refers to a variable this backend did not create".to_string())
}

fn set_term(terms: &mut Vec<(VariableId, f64)>, variable: VariableId, value: f64) {
    match terms.iter_mut().find(|(id, _)| *id == variable) {
        Some(term) => term.1 = value,
        None => terms.push((variable, value)),
    }
}

#[expect(
    clippy::float_cmp,
    reason = "equality rows are created with the same value on both sides"
)]
fn apply_row<S: SolverModel>(model: S, expr: Expression, lower: f64, upper: f64) -> S {
    match (lower.is_finite(), upper.is_finite()) {
        (true, true) if lower == upper => model.with(expr.eq(lower)),
        (true, true) => model.with(expr.clone().geq(lower)).with(expr.leq(upper)),
        (true, false) => model.with(expr.geq(lower)),
        (false, true) => model.with(expr.leq(upper)),
        (false, false) => model,
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn maximises_simple_integer_program() -> TestResult {
        let mut backend = GoodLpBackend::new();

        let x = backend.add_variable(VariableKind::Integer, 0.0, 10.0, "x");
        let y = backend.add_variable(VariableKind::Integer, 0.0, 10.0, "y");

        let row = backend.add_constraint(f64::NEG_INFINITY, 7.5, "capacity");
        backend.set_coefficient(row, x, 1.0);
        backend.set_coefficient(row, y, 1.0);

        backend.set_objective_coefficient(x, 2.0);
        backend.set_objective_coefficient(y, 1.0);
        backend.set_direction(Direction::Maximise);

        assert_eq!(backend.solve(), SolveStatus::Optimal);

        let x_value = backend.value_of(x).ok_or("missing x")?;
        let y_value = backend.value_of(y).ok_or("missing y")?;

        assert!((x_value - 7.0).abs() < 1e-6);
        assert!(y_value.abs() < 1e-6);

        Ok(())
    }

    #[test]
    fn setting_a_coefficient_twice_replaces_it() -> TestResult {
        let mut backend = GoodLpBackend::new();

        let x = backend.add_variable(VariableKind::Continuous, 0.0, 100.0, "x");
        let row = backend.add_constraint(f64::NEG_INFINITY, 10.0, "cap");

        backend.set_coefficient(row, x, 1.0);
        backend.set_coefficient(row, x, 2.0);
        backend.set_objective_coefficient(x, 1.0);

        assert_eq!(backend.solve(), SolveStatus::Optimal);

        let value = backend.value_of(x).ok_or("missing x")?;
        assert!((value - 5.0).abs() < 1e-6);

        Ok(())
    }

    #[test]
    fn conflicting_rows_are_infeasible() {
        let mut backend = GoodLpBackend::new();

        let x = backend.add_variable(VariableKind::Binary, 0.0, 1.0, "x");

        let row = backend.add_constraint(2.0, f64::INFINITY, "too_much");
        backend.set_coefficient(row, x, 1.0);

        assert_eq!(backend.solve(), SolveStatus::Infeasible);
        assert_eq!(backend.value_of(x), None);
    }

    #[test]
    fn empty_row_that_excludes_zero_is_infeasible() {
        let mut backend = GoodLpBackend::new();

        backend.add_variable(VariableKind::Binary, 0.0, 1.0, "x");
        backend.add_constraint(1.0, 1.0, "pick_one");

        assert_eq!(backend.solve(), SolveStatus::Infeasible);
    }

    #[test]
    fn variables_added_after_a_solve_get_fresh_ids() -> TestResult {
        let mut backend = GoodLpBackend::new();

        let x = backend.add_variable(VariableKind::Integer, 0.0, 4.0, "x");
        backend.set_objective_coefficient(x, 1.0);

        assert_eq!(backend.solve(), SolveStatus::Optimal);

        let y = backend.add_variable(VariableKind::Integer, 0.0, 3.0, "y");
        backend.set_objective_coefficient(y, 1.0);

        assert_ne!(x, y);
        assert_eq!(backend.variable_count(), 2);
        assert_eq!(backend.solve(), SolveStatus::Optimal);

        let y_value = backend.value_of(y).ok_or("missing y")?;
        assert!((y_value - 3.0).abs() < 1e-6);

        Ok(())
    }

    #[test]
    fn terms_on_unknown_variables_are_an_error() {
        let mut backend = GoodLpBackend::new();

        let x = backend.add_variable(VariableKind::Continuous, 0.0, 1.0, "x");
        let row = backend.add_constraint(f64::NEG_INFINITY, 1.0, "cap");

        backend.set_coefficient(row, x, 1.0);
        backend.set_coefficient(row, VariableId(7), 1.0);

        assert!(matches!(backend.solve(), SolveStatus::Error(_)));
        assert_eq!(backend.value_of(x), None);
    }
}
