//! LP Renderer
//!
//! Captures the formulation through the observer callbacks and writes it in CPLEX LP format, the
//! plain text format read by HiGHS, CBC, GLPK and most other MIP solvers.
//!
//! # Example
//!
//! ```rust,no_run
//! use clearance::{
//!     model::DemandModel,
//!     settings::Settings,
//!     solvers::milp::{MilpSolver, renderers::lp::LpRenderer},
//! };
//! # fn example(model: &DemandModel) -> Result<(), Box<dyn std::error::Error>> {
//! let mut renderer = LpRenderer::new("model.lp");
//!
//! let _plan = MilpSolver::new(Settings::default()).solve_with_observer(model, &mut renderer)?;
//!
//! renderer.write()?;
//! # Ok(())
//! # }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;

use crate::solvers::milp::{
    backend::{ConstraintId, Direction, VariableId, VariableKind},
    observer::MilpObserver,
};

/// Terms written per line of an expression.
const TERMS_PER_LINE: usize = 8;

/// Errors that can occur during LP rendering.
#[derive(Debug, thiserror::Error)]
pub enum LpRenderError {
    /// Failed to write to the output file.
    #[error("failed to write LP file: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured variable.
#[derive(Debug, Clone, PartialEq)]
pub struct LpVariable {
    /// Backend handle
    pub id: VariableId,

    /// Domain
    pub kind: VariableKind,

    /// Lower bound
    pub lower: f64,

    /// Upper bound
    pub upper: f64,

    /// Name as written to the file
    pub name: String,
}

/// Captured constraint row.
#[derive(Debug, Clone, PartialEq)]
pub struct LpRow {
    /// Backend handle
    pub id: ConstraintId,

    /// Name as written to the file
    pub name: String,

    /// Lower bound of the row
    pub lower: f64,

    /// Upper bound of the row
    pub upper: f64,

    /// Non-zero coefficients
    pub terms: Vec<(VariableId, f64)>,
}

/// Captured MILP formulation.
#[derive(Debug, Clone, PartialEq)]
pub struct LpFormulation {
    /// Variables in creation order
    pub variables: Vec<LpVariable>,

    /// Rows in creation order
    pub rows: Vec<LpRow>,

    /// Objective coefficients in the order they were set
    pub objective: Vec<(VariableId, f64)>,

    /// Optimisation direction
    pub direction: Direction,
}

impl Default for LpFormulation {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            rows: Vec::new(),
            objective: Vec::new(),
            direction: Direction::Maximise,
        }
    }
}

/// Observer that renders the formulation as an LP file.
#[derive(Debug, Clone)]
pub struct LpRenderer {
    output_path: PathBuf,
    formulation: LpFormulation,
    names: FxHashMap<VariableId, usize>,
}

impl LpRenderer {
    /// Renderer writing to `output_path`.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            formulation: LpFormulation::default(),
            names: FxHashMap::default(),
        }
    }

    /// Captured formulation.
    pub fn formulation(&self) -> &LpFormulation {
        &self.formulation
    }

    /// Output path.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Render the captured formulation to LP text.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("\\ Clearance discount schedule\n");

        out.push_str(match self.formulation.direction {
            Direction::Maximise => "Maximize\n",
            Direction::Minimise => "Minimize\n",
        });

        out.push_str(" obj:");
        self.push_terms(&mut out, &self.formulation.objective);
        out.push('\n');

        out.push_str("Subject To\n");

        for row in &self.formulation.rows {
            self.push_row(&mut out, row);
        }

        out.push_str("Bounds\n");

        for var in &self.formulation.variables {
            push_bounds(&mut out, var);
        }

        let general: Vec<&str> = self
            .formulation
            .variables
            .iter()
            .filter(|var| {
                var.kind == VariableKind::Integer
                    || (var.kind == VariableKind::Binary && !is_unit_interval(var))
            })
            .map(|var| var.name.as_str())
            .collect();

        let binary: Vec<&str> = self
            .formulation
            .variables
            .iter()
            .filter(|var| var.kind == VariableKind::Binary && is_unit_interval(var))
            .map(|var| var.name.as_str())
            .collect();

        push_section(&mut out, "General", &general);
        push_section(&mut out, "Binary", &binary);

        out.push_str("End\n");

        out
    }

    /// Render and write the LP file.
    ///
    /// # Errors
    ///
    /// Returns [`LpRenderError::Io`] if the file cannot be written.
    pub fn write(&self) -> Result<(), LpRenderError> {
        fs::write(&self.output_path, self.render())?;

        Ok(())
    }

    fn name_of(&self, id: VariableId) -> &str {
        self.names
            .get(&id)
            .and_then(|idx| self.formulation.variables.get(*idx))
            .map_or("_unknown", |var| var.name.as_str())
    }

    fn push_terms(&self, out: &mut String, terms: &[(VariableId, f64)]) {
        for (position, (id, coefficient)) in terms.iter().enumerate() {
            if position > 0 && position % TERMS_PER_LINE == 0 {
                out.push_str("\n   ");
            }

            let sign = if coefficient.is_sign_negative() { '-' } else { '+' };

            out.push_str(&format!(
                " {sign} {} {}",
                coefficient.abs(),
                self.name_of(*id)
            ));
        }
    }

    #[expect(
        clippy::float_cmp,
        reason = "equality rows are created with the same value on both sides"
    )]
    fn push_row(&self, out: &mut String, row: &LpRow) {
        if row.terms.is_empty() {
            return;
        }

        let mut push = |suffix: &str, relation: &str, rhs: f64| {
            out.push_str(&format!(" {}{suffix}:", row.name));
            self.push_terms(out, &row.terms);
            out.push_str(&format!(" {relation} {rhs}\n"));
        };

        match (row.lower.is_finite(), row.upper.is_finite()) {
            (true, true) if row.lower == row.upper => push("", "=", row.lower),
            (true, true) => {
                push("_lo", ">=", row.lower);
                push("_hi", "<=", row.upper);
            }
            (true, false) => push("", ">=", row.lower),
            (false, true) => push("", "<=", row.upper),
            (false, false) => {}
        }
    }
}

impl MilpObserver for LpRenderer {
    fn on_variable(
        &mut self,
        variable: VariableId,
        kind: VariableKind,
        lower: f64,
        upper: f64,
        label: &str,
    ) {
        let (lower, upper) = match kind {
            VariableKind::Binary => (lower.max(0.0), upper.min(1.0)),
            VariableKind::Continuous | VariableKind::Integer => (lower, upper),
        };

        self.names
            .insert(variable, self.formulation.variables.len());

        self.formulation.variables.push(LpVariable {
            id: variable,
            kind,
            lower,
            upper,
            name: sanitize(label),
        });
    }

    fn on_constraint(
        &mut self,
        constraint: ConstraintId,
        label: &str,
        lower: f64,
        upper: f64,
        terms: &[(VariableId, f64)],
    ) {
        self.formulation.rows.push(LpRow {
            id: constraint,
            name: sanitize(label),
            lower,
            upper,
            terms: terms.to_vec(),
        });
    }

    fn on_objective_term(&mut self, variable: VariableId, coefficient: f64) {
        let objective = &mut self.formulation.objective;

        match objective.iter_mut().find(|(id, _)| *id == variable) {
            Some(term) => term.1 = coefficient,
            None => objective.push((variable, coefficient)),
        }
    }

    fn on_direction(&mut self, direction: Direction) {
        self.formulation.direction = direction;
    }
}

fn is_unit_interval(var: &LpVariable) -> bool {
    var.lower == 0.0 && (var.upper - 1.0).abs() < f64::EPSILON
}

#[expect(clippy::float_cmp, reason = "fixed variables carry the same value on both bounds")]
fn push_bounds(out: &mut String, var: &LpVariable) {
    if var.kind == VariableKind::Binary && is_unit_interval(var) {
        return;
    }

    let name = &var.name;

    let line = match (var.lower.is_finite(), var.upper.is_finite()) {
        (true, true) if var.lower == var.upper => format!(" {name} = {}", var.lower),
        (true, true) => format!(" {} <= {name} <= {}", var.lower, var.upper),
        (true, false) => format!(" {name} >= {}", var.lower),
        (false, true) => format!(" -inf <= {name} <= {}", var.upper),
        (false, false) => format!(" {name} free"),
    };

    out.push_str(&line);
    out.push('\n');
}

fn push_section(out: &mut String, title: &str, names: &[&str]) {
    if names.is_empty() {
        return;
    }

    out.push_str(title);
    out.push('\n');

    for chunk in names.chunks(TERMS_PER_LINE) {
        out.push(' ');
        out.push_str(&chunk.join(" "));
        out.push('\n');
    }
}

/// LP names allow letters, digits and a few punctuation marks, and must not start with a digit or
/// a period.
fn sanitize(label: &str) -> String {
    let mut name: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name
        .chars()
        .next()
        .is_none_or(|c| c.is_ascii_digit() || c == '.')
    {
        name.insert(0, '_');
    }

    name
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::solvers::milp::{
        backend::{GoodLpBackend, MipBackend},
        state::MilpState,
    };

    use super::*;

    fn small_formulation(renderer: &mut LpRenderer) {
        let mut backend = GoodLpBackend::new();
        let mut state = MilpState::new(&mut backend, renderer);

        let sold = state.variable(VariableKind::Integer, 0.0, 30.0, "QuantitySold_1_0");
        let pick = state.variable(VariableKind::Binary, 0.0, 1.0, "DiscSelected_g_0_0");
        let fixed = state.variable(VariableKind::Binary, 1.0, 1.0, "InventoryExists_1_0");

        state.row("Cap", f64::NEG_INFINITY, 30.0, &[(sold, 1.0), (pick, -30.0)]);
        state.row("Band", -4.0, 4.0, &[(pick, 1.0), (fixed, 0.0)]);
        state.row("Pick", 1.0, 1.0, &[(pick, 1.0)]);

        state.objective(sold, 6.0);
        state.direction(Direction::Maximise);
    }

    #[test]
    fn renders_all_sections() -> TestResult {
        let mut renderer = LpRenderer::new("unused.lp");
        small_formulation(&mut renderer);

        let text = renderer.render();

        assert_eq!(
            text,
            "\\ Clearance discount schedule\n\
             Maximize\n \
             obj: + 6 QuantitySold_1_0\n\
             Subject To\n \
             Cap: + 1 QuantitySold_1_0 - 30 DiscSelected_g_0_0 <= 30\n \
             Band_lo: + 1 DiscSelected_g_0_0 >= -4\n \
             Band_hi: + 1 DiscSelected_g_0_0 <= 4\n \
             Pick: + 1 DiscSelected_g_0_0 = 1\n\
             Bounds\n \
             0 <= QuantitySold_1_0 <= 30\n \
             InventoryExists_1_0 = 1\n\
             General\n \
             QuantitySold_1_0 InventoryExists_1_0\n\
             Binary\n \
             DiscSelected_g_0_0\n\
             End\n"
        );

        Ok(())
    }

    #[test]
    fn zero_coefficients_are_not_captured() -> TestResult {
        let mut renderer = LpRenderer::new("unused.lp");
        small_formulation(&mut renderer);

        let band = renderer
            .formulation()
            .rows
            .iter()
            .find(|row| row.name == "Band")
            .ok_or("missing band row")?;

        assert_eq!(band.terms.len(), 1);

        Ok(())
    }

    #[test]
    fn long_rows_wrap() {
        let mut renderer = LpRenderer::new("unused.lp");
        let mut backend = GoodLpBackend::new();

        let terms: Vec<(VariableId, f64)> = (0..20)
            .map(|idx| {
                let label = format!("x{idx}");
                let id = backend.add_variable(VariableKind::Continuous, 0.0, 1.0, &label);
                renderer.on_variable(id, VariableKind::Continuous, 0.0, 1.0, &label);

                (id, 1.0)
            })
            .collect();

        let row = backend.add_constraint(f64::NEG_INFINITY, 5.0, "Sum");
        renderer.on_constraint(row, "Sum", f64::NEG_INFINITY, 5.0, &terms);

        let text = renderer.render();

        assert!(text.lines().all(|line| line.len() < 255));
        assert!(text.contains("\n    + 1 x8"));
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize("Disc Selected/g 1"), "Disc_Selected_g_1");
        assert_eq!(sanitize("12.5"), "_12.5");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn write_creates_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.lp");

        let mut renderer = LpRenderer::new(&path);
        small_formulation(&mut renderer);

        renderer.write()?;

        let written = fs::read_to_string(&path)?;
        assert!(written.starts_with("\\ Clearance"));
        assert!(written.ends_with("End\n"));

        Ok(())
    }
}
