//! MILP Solver
//!
//! Exact formulation of the discount schedule as a mixed-integer program. Every product of every
//! group gets inventory, sales, price and revenue variables per week, every group gets one binary
//! indicator per eligible discount per week, and a two-state stockout machine per product links
//! the two so that full demand is met while stock lasts.
//!
//! All groups share one model because the minimum sell-through rule spans every product.

use std::time::Instant;

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::{
    discounts::Discount,
    groups::ProductGroup,
    ledger::{Ledger, LedgerEntry},
    model::DemandModel,
    products::Product,
    settings::Settings,
    solvers::{
        DiscountSequence, GroupSchedule, Plan, Solver, SolverError, ensure_schedulable,
        milp::{
            backend::{Direction, GoodLpBackend, MipBackend, SolveStatus, VariableId, VariableKind},
            observer::{MilpObserver, NoopObserver},
            state::MilpState,
        },
    },
};

pub mod backend;
pub mod observer;
pub mod renderers;
pub(crate) mod state;

/// Indicator threshold above which a binary counts as selected.
const SELECTED: f64 = 0.5;

/// Decimal places kept from solved continuous values.
const SOLVED_PRECISION: u32 = 4;

type TierVariables = SmallVec<[VariableId; 8]>;

/// Solver that formulates the whole model as one MILP.
#[derive(Debug, Clone, Default)]
pub struct MilpSolver {
    settings: Settings,
}

impl MilpSolver {
    /// Solver using the given planning rules.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Planning rules.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Solve with the default backend while reporting the formulation to `observer`.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the model cannot be scheduled or the backend does not find an
    /// optimal solution.
    pub fn solve_with_observer<O: MilpObserver + ?Sized>(
        &self,
        model: &DemandModel,
        observer: &mut O,
    ) -> Result<Plan, SolverError> {
        let mut backend = GoodLpBackend::new();

        self.solve_with_backend(model, &mut backend, observer)
    }

    /// Solve with a caller supplied backend.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the model cannot be scheduled or the backend does not find an
    /// optimal solution.
    pub fn solve_with_backend<B, O>(
        &self,
        model: &DemandModel,
        backend: &mut B,
        observer: &mut O,
    ) -> Result<Plan, SolverError>
    where
        B: MipBackend + ?Sized,
        O: MilpObserver + ?Sized,
    {
        if model.groups().is_empty() {
            return Err(SolverError::NoGroups);
        }

        for group in model.groups() {
            ensure_schedulable(group, model.horizon())?;
        }

        let started = Instant::now();
        let mut state = MilpState::new(backend, observer);

        let formulation = Formulation::build(model, &self.settings, &mut state)?;

        info!(
            variables = state.variable_count(),
            constraints = state.constraint_count(),
            "MILP formulation built"
        );

        let status = state.solve();

        info!(%status, elapsed = ?started.elapsed(), "MILP solve finished");

        match status {
            SolveStatus::Optimal => {}
            SolveStatus::Infeasible => return Err(SolverError::Infeasible),
            SolveStatus::Unbounded => return Err(SolverError::Unbounded),
            SolveStatus::Error(message) => return Err(SolverError::Backend(message)),
        }

        formulation.extract(model, &state)
    }
}

impl Solver for MilpSolver {
    fn solve(&self, model: &DemandModel) -> Result<Plan, SolverError> {
        let mut observer = NoopObserver;

        self.solve_with_observer(model, &mut observer)
    }
}

/// Variables of one product, indexed by week (and tier for `sold_at`).
#[derive(Debug, Default)]
struct ProductVariables {
    inventory: Vec<VariableId>,
    sold: Vec<VariableId>,
    price: Vec<VariableId>,
    revenue: Vec<VariableId>,
    out_of_stock: Vec<VariableId>,
    inventory_exists: Vec<VariableId>,
    sold_at: Vec<TierVariables>,
}

/// Variables of one group: discount indicators by week and tier, then its products.
#[derive(Debug, Default)]
struct GroupVariables {
    selected: Vec<TierVariables>,
    products: Vec<ProductVariables>,
}

#[derive(Debug)]
struct Formulation {
    groups: Vec<GroupVariables>,
}

impl Formulation {
    fn build<B, O>(
        model: &DemandModel,
        settings: &Settings,
        state: &mut MilpState<'_, B, O>,
    ) -> Result<Self, SolverError>
    where
        B: MipBackend + ?Sized,
        O: MilpObserver + ?Sized,
    {
        let mut groups = Vec::with_capacity(model.groups().len());

        for group in model.groups() {
            let vars = add_group_variables(group, state)?;

            add_flow_balance(group, &vars, state)?;
            add_single_discount(group, &vars, state);
            add_price_and_revenue(group, &vars, state)?;
            add_stockout_state(group, &vars, state)?;
            add_discount_restriction(group, &vars, settings, state);

            debug!(group = group.name(), products = group.len(), "group formulated");

            groups.push(vars);
        }

        let formulation = Self { groups };

        formulation.add_sell_through(model, settings, state)?;
        formulation.add_objective(model, state);

        Ok(formulation)
    }

    /// Σ ending inventory ≤ ratio · Σ initial inventory, across every product.
    fn add_sell_through<B, O>(
        &self,
        model: &DemandModel,
        settings: &Settings,
        state: &mut MilpState<'_, B, O>,
    ) -> Result<(), SolverError>
    where
        B: MipBackend + ?Sized,
        O: MilpObserver + ?Sized,
    {
        let cap = settings
            .ending_inventory_cap(model.total_initial_inventory())
            .to_f64()
            .unwrap_or(f64::INFINITY);

        let terms: Vec<(VariableId, f64)> = self
            .groups
            .iter()
            .flat_map(|group| &group.products)
            .map(|product| {
                product
                    .inventory
                    .last()
                    .copied()
                    .map(|var| (var, 1.0))
                    .ok_or(SolverError::InvariantViolation {
                        message: "product has no inventory variables",
                    })
            })
            .collect::<Result<_, _>>()?;

        state.row("Minimum_Sell_Through", f64::NEG_INFINITY, cap, &terms);

        Ok(())
    }

    /// Maximise Σ revenue − cost · sold.
    fn add_objective<B, O>(&self, model: &DemandModel, state: &mut MilpState<'_, B, O>)
    where
        B: MipBackend + ?Sized,
        O: MilpObserver + ?Sized,
    {
        for (group, vars) in model.groups().iter().zip(&self.groups) {
            for (product, product_vars) in group.products().iter().zip(&vars.products) {
                let cost = decimal_coefficient(product.cost);

                for (revenue, sold) in product_vars.revenue.iter().zip(&product_vars.sold) {
                    state.objective(*revenue, 1.0);
                    state.objective(*sold, -cost);
                }
            }
        }

        state.direction(Direction::Maximise);
    }

    /// Translate solved values back into schedules and a ledger.
    fn extract<B, O>(
        &self,
        model: &DemandModel,
        state: &MilpState<'_, B, O>,
    ) -> Result<Plan, SolverError>
    where
        B: MipBackend + ?Sized,
        O: MilpObserver + ?Sized,
    {
        let mut schedules = Vec::with_capacity(self.groups.len());
        let mut ledger = Ledger::default();

        for (group, vars) in model.groups().iter().zip(&self.groups) {
            let mut discounts = DiscountSequence::new();

            for (week, tiers) in vars.selected.iter().enumerate() {
                let tier = selected_tier(state, tiers)?;

                let discount = group.eligible(week).get(tier).copied().ok_or(
                    SolverError::InvariantViolation {
                        message: "selected tier outside the eligible list",
                    },
                )?;

                discounts.push(discount);
            }

            let mut group_ledger = Ledger::default();
            let mut inventory_left = 0;

            for (product, product_vars) in group.products().iter().zip(&vars.products) {
                extract_product(
                    model,
                    product,
                    product_vars,
                    &discounts,
                    state,
                    &mut group_ledger,
                )?;

                let last = product_vars.inventory.last().copied().ok_or(
                    SolverError::InvariantViolation {
                        message: "product has no inventory variables",
                    },
                )?;

                inventory_left += solved_units(solved(state, last)?);
            }

            schedules.push(GroupSchedule {
                group: group.name().to_string(),
                discounts,
                profit: group_ledger.total_profit(),
                inventory_left,
                feasible: true,
            });

            ledger.extend(group_ledger);
        }

        Ok(Plan { schedules, ledger })
    }
}

fn add_group_variables<B, O>(
    group: &ProductGroup,
    state: &mut MilpState<'_, B, O>,
) -> Result<GroupVariables, SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    let name = group.name();
    let weeks = group.week_count();

    let selected = (0..weeks)
        .map(|week| {
            group
                .eligible(week)
                .iter()
                .map(|discount| {
                    state.variable(
                        VariableKind::Binary,
                        0.0,
                        1.0,
                        &format!("DiscSelected_{name}_{week}_{discount}"),
                    )
                })
                .collect()
        })
        .collect();

    let mut products = Vec::with_capacity(group.len());

    for product in group.products() {
        let id = product.id;
        let initial = exact(product.initial_inventory)?;
        let mut vars = ProductVariables::default();

        for week in 0..weeks {
            let max_demand = exact(product.max_demand(week))?;
            let max_price = decimal_coefficient(product.max_price(week));
            let max_revenue = decimal_coefficient(product.max_revenue(week));

            vars.inventory.push(state.variable(
                VariableKind::Integer,
                0.0,
                initial,
                &format!("Inventory_{id}_{week}"),
            ));

            vars.sold.push(state.variable(
                VariableKind::Integer,
                0.0,
                max_demand,
                &format!("QuantitySold_{id}_{week}"),
            ));

            vars.price.push(state.variable(
                VariableKind::Continuous,
                0.0,
                max_price,
                &format!("Price_{id}_{week}"),
            ));

            vars.revenue.push(state.variable(
                VariableKind::Continuous,
                0.0,
                max_revenue,
                &format!("Revenue_{id}_{week}"),
            ));

            vars.out_of_stock.push(state.variable(
                VariableKind::Binary,
                0.0,
                1.0,
                &format!("OutOfStock_{id}_{week}"),
            ));

            // Stock state is known in the first week.
            let (lower, upper) = match (week, product.initial_inventory) {
                (0, 0) => (0.0, 0.0),
                (0, _) => (1.0, 1.0),
                _ => (0.0, 1.0),
            };

            vars.inventory_exists.push(state.variable(
                VariableKind::Binary,
                lower,
                upper,
                &format!("InventoryExists_{id}_{week}"),
            ));

            let mut sold_at = TierVariables::new();

            for discount in group.eligible(week) {
                let demand = demand_at(product, week, *discount)?;

                sold_at.push(state.variable(
                    VariableKind::Continuous,
                    0.0,
                    exact(demand)?,
                    &format!("QuantitySoldAtDiscount_{id}_{week}_{discount}"),
                ));
            }

            vars.sold_at.push(sold_at);
        }

        products.push(vars);
    }

    Ok(GroupVariables { selected, products })
}

/// Week 0: −I − S = −initial. Later weeks: I[w−1] − I[w] − S[w] = 0.
fn add_flow_balance<B, O>(
    group: &ProductGroup,
    vars: &GroupVariables,
    state: &mut MilpState<'_, B, O>,
) -> Result<(), SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    for (product, product_vars) in group.products().iter().zip(&vars.products) {
        let id = product.id;
        let initial = exact(product.initial_inventory)?;

        let mut previous: Option<VariableId> = None;

        for (week, (inventory, sold)) in product_vars
            .inventory
            .iter()
            .copied()
            .zip(product_vars.sold.iter().copied())
            .enumerate()
        {
            let label = format!("FlowBal_{id}_{week}");

            match previous {
                None => {
                    state.row(
                        &label,
                        -initial,
                        -initial,
                        &[(inventory, -1.0), (sold, -1.0)],
                    );
                }
                Some(before) => {
                    state.row(
                        &label,
                        0.0,
                        0.0,
                        &[(before, 1.0), (inventory, -1.0), (sold, -1.0)],
                    );
                }
            }

            previous = Some(inventory);
        }
    }

    Ok(())
}

/// Σ_d selected[w, d] = 1 for every week.
fn add_single_discount<B, O>(
    group: &ProductGroup,
    vars: &GroupVariables,
    state: &mut MilpState<'_, B, O>,
) where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    let name = group.name();

    for (week, tiers) in vars.selected.iter().enumerate() {
        let terms: Vec<(VariableId, f64)> = tiers.iter().map(|var| (*var, 1.0)).collect();

        state.row(&format!("Single_Discount_{name}_{week}"), 1.0, 1.0, &terms);
    }
}

/// Price follows the selected tier; revenue and units sold sum the per-tier sales.
fn add_price_and_revenue<B, O>(
    group: &ProductGroup,
    vars: &GroupVariables,
    state: &mut MilpState<'_, B, O>,
) -> Result<(), SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    for (product, product_vars) in group.products().iter().zip(&vars.products) {
        let id = product.id;

        for (week, tiers) in vars.selected.iter().enumerate() {
            let eligible = group.eligible(week);
            let sold_at = product_vars.sold_at.get(week).ok_or(missing("sold_at"))?;

            let prices: SmallVec<[f64; 8]> = eligible
                .iter()
                .map(|discount| {
                    product
                        .price_demand(week, *discount)
                        .map(|point| decimal_coefficient(point.selling_price))
                        .ok_or(missing("price/demand point"))
                })
                .collect::<Result<_, _>>()?;

            let price = *product_vars.price.get(week).ok_or(missing("price"))?;
            let revenue = *product_vars.revenue.get(week).ok_or(missing("revenue"))?;
            let sold = *product_vars.sold.get(week).ok_or(missing("sold"))?;

            let mut terms = vec![(price, 1.0)];
            terms.extend(tiers.iter().zip(&prices).map(|(var, p)| (*var, -p)));
            state.row(&format!("Price_Det_{id}_{week}"), 0.0, 0.0, &terms);

            let mut terms = vec![(revenue, 1.0)];
            terms.extend(sold_at.iter().zip(&prices).map(|(var, p)| (*var, -p)));
            state.row(&format!("Revenue_Det_{id}_{week}"), 0.0, 0.0, &terms);

            let mut terms = vec![(sold, 1.0)];
            terms.extend(sold_at.iter().map(|var| (*var, -1.0)));
            state.row(&format!("Qty_Balance_{id}_{week}"), 0.0, 0.0, &terms);
        }
    }

    Ok(())
}

/// HasInventory/OutOfStock transitions plus the demand satisfaction rows they gate.
fn add_stockout_state<B, O>(
    group: &ProductGroup,
    vars: &GroupVariables,
    state: &mut MilpState<'_, B, O>,
) -> Result<(), SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    for (product, product_vars) in group.products().iter().zip(&vars.products) {
        let id = product.id;
        let exists = &product_vars.inventory_exists;
        let out_of_stock = &product_vars.out_of_stock;

        // ES[w] − ES[w+1] − OOS[w] = 0
        for (week, (pair, oos)) in exists.windows(2).zip(out_of_stock).enumerate() {
            if let [now, next] = pair {
                state.row(
                    &format!("Stock_Transition_{id}_{week}"),
                    0.0,
                    0.0,
                    &[(*now, 1.0), (*next, -1.0), (*oos, -1.0)],
                );
            }
        }

        let terms: Vec<(VariableId, f64)> = out_of_stock.iter().map(|var| (*var, 1.0)).collect();
        state.row(&format!("Out_Of_Stock_Once_{id}"), 0.0, 1.0, &terms);

        for (week, tiers) in vars.selected.iter().enumerate() {
            let sold_at = product_vars.sold_at.get(week).ok_or(missing("sold_at"))?;
            let has_stock = *exists.get(week).ok_or(missing("inventory_exists"))?;
            let oos = *out_of_stock.get(week).ok_or(missing("out_of_stock"))?;
            let sold = *product_vars.sold.get(week).ok_or(missing("sold"))?;

            let mut big_m = 0;

            for ((discount, selected), at_tier) in
                group.eligible(week).iter().zip(tiers).zip(sold_at)
            {
                let demand = demand_at(product, week, *discount)?;
                let coefficient = exact(demand)?;

                big_m = big_m.max(demand);

                // Sales only at the active discount, capped by its demand.
                state.row(
                    &format!("Sell_Cap_{id}_{week}_{discount}"),
                    f64::NEG_INFINITY,
                    0.0,
                    &[(*at_tier, 1.0), (*selected, -coefficient)],
                );

                // Full demand while in stock at the active discount, unless stock runs out now.
                state.row(
                    &format!("Must_Satisfy_{id}_{week}_{discount}"),
                    -coefficient,
                    f64::INFINITY,
                    &[
                        (*at_tier, 1.0),
                        (*selected, -coefficient),
                        (has_stock, -coefficient),
                        (oos, coefficient),
                    ],
                );
            }

            state.row(
                &format!("Cant_Satisfy_{id}_{week}"),
                f64::NEG_INFINITY,
                0.0,
                &[(sold, 1.0), (has_stock, -exact(big_m)?)],
            );
        }
    }

    Ok(())
}

/// −max_change ≤ Σ d·selected[w−1, d] − Σ d·selected[w, d] ≤ max_change.
///
/// Exactly one indicator is set per week, so each weighted sum is the selected discount and the
/// row bounds the true change between consecutive weeks.
fn add_discount_restriction<B, O>(
    group: &ProductGroup,
    vars: &GroupVariables,
    settings: &Settings,
    state: &mut MilpState<'_, B, O>,
) where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    let name = group.name();
    let max_change = f64::from(settings.max_weekly_change);

    for (week, pair) in vars.selected.windows(2).enumerate() {
        let [before, after] = pair else {
            continue;
        };

        let mut terms: Vec<(VariableId, f64)> = group
            .eligible(week)
            .iter()
            .zip(before)
            .map(|(discount, var)| (*var, discount.as_f64()))
            .collect();

        terms.extend(
            group
                .eligible(week + 1)
                .iter()
                .zip(after)
                .map(|(discount, var)| (*var, -discount.as_f64())),
        );

        state.row(
            &format!("Disc_Restriction_{name}_{}", week + 1),
            -max_change,
            max_change,
            &terms,
        );
    }
}

fn extract_product<B, O>(
    model: &DemandModel,
    product: &Product,
    vars: &ProductVariables,
    discounts: &[Discount],
    state: &MilpState<'_, B, O>,
    ledger: &mut Ledger,
) -> Result<(), SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    for (week, ((discount, sold), revenue)) in discounts
        .iter()
        .zip(&vars.sold)
        .zip(&vars.revenue)
        .enumerate()
    {
        let point = product
            .price_demand(week, *discount)
            .ok_or(missing("price/demand point"))?;

        let quantity = solved_units(solved(state, *sold)?);
        let revenue = Decimal::from_f64(solved(state, *revenue)?.max(0.0))
            .unwrap_or_default()
            .round_dp(SOLVED_PRECISION);

        ledger.push(LedgerEntry {
            product_id: product.id,
            week: model
                .horizon()
                .week_id(week)
                .ok_or(missing("week outside the planning horizon"))?,
            quantity_sold: quantity,
            selling_price: point.selling_price,
            revenue,
            cost: Decimal::from(quantity) * product.cost,
            demand: point.demand,
        });
    }

    Ok(())
}

fn selected_tier<B, O>(
    state: &MilpState<'_, B, O>,
    tiers: &[VariableId],
) -> Result<usize, SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    let mut selected = None;

    for (tier, var) in tiers.iter().enumerate() {
        if solved(state, *var)? > SELECTED {
            if selected.is_some() {
                return Err(missing("more than one discount selected in a week"));
            }

            selected = Some(tier);
        }
    }

    selected.ok_or(missing("no discount selected in a week"))
}

fn solved<B, O>(state: &MilpState<'_, B, O>, var: VariableId) -> Result<f64, SolverError>
where
    B: MipBackend + ?Sized,
    O: MilpObserver + ?Sized,
{
    state
        .value_of(var)
        .ok_or(SolverError::InvariantViolation {
            message: "solved value missing",
        })
}

fn demand_at(
    product: &Product,
    week: usize,
    discount: Discount,
) -> Result<u64, SolverError> {
    product
        .price_demand(week, discount)
        .map(|point| point.demand)
        .ok_or(missing("price/demand point"))
}

fn missing(what: &'static str) -> SolverError {
    SolverError::InvariantViolation { message: what }
}

fn solved_units(value: f64) -> u64 {
    value.round().max(0.0).to_u64().unwrap_or_default()
}

fn decimal_coefficient(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Convert to `f64` only when the conversion round-trips.
fn exact(value: u64) -> Result<f64, SolverError> {
    u64_to_f64_exact(value).ok_or(SolverError::NotRepresentable(value))
}

fn u64_to_f64_exact(value: u64) -> Option<f64> {
    let f = value.to_f64()?;

    (f.to_u64() == Some(value)).then_some(f)
}
