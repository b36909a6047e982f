//! Neighbourhood Search
//!
//! Stochastic search over per-week tier indexes, scored by the simulator. A random exploration
//! phase picks the best feasible sequence out of a fixed number of random walks, then a greedy
//! local search nudges single weeks up or down a tier and keeps strict improvements.
//!
//! Trials run sequentially off one seeded generator, so a fixed seed always yields the same
//! schedule.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use smallvec::{SmallVec, smallvec};
use tracing::{debug, info, warn};

use crate::{
    groups::ProductGroup,
    horizon::PlanningHorizon,
    ledger::Ledger,
    model::DemandModel,
    settings::Settings,
    simulator,
    solvers::{
        DiscountSequence, GroupSchedule, Plan, Solver, SolverError, ensure_schedulable,
    },
};

/// Position of each week's discount in that week's ascending eligible list.
pub type IndexSequence = SmallVec<[usize; 16]>;

/// Eligible tiers of a group, by week.
#[derive(Debug, Clone, Copy)]
pub struct TierLadder<'a> {
    group: &'a ProductGroup,
}

impl<'a> TierLadder<'a> {
    /// Ladder over the eligible tiers of `group`.
    pub fn new(group: &'a ProductGroup) -> Self {
        Self { group }
    }

    /// Number of weeks.
    pub fn weeks(&self) -> usize {
        self.group.week_count()
    }

    /// Highest valid index in `week`.
    fn top(&self, week: usize) -> usize {
        self.group.eligible(week).len().saturating_sub(1)
    }

    /// Sequence choosing the lowest tier every week.
    pub fn lowest(&self) -> IndexSequence {
        smallvec![0; self.weeks()]
    }

    /// Convert indexes to discounts. Indexes past a week's list are clamped to its top tier.
    pub fn discounts(&self, indexes: &[usize]) -> DiscountSequence {
        indexes
            .iter()
            .enumerate()
            .filter_map(|(week, idx)| {
                let eligible = self.group.eligible(week);

                eligible.get(*idx).or_else(|| eligible.last()).copied()
            })
            .collect()
    }

    /// Random walk: a uniform start, then steps of at most `max_step` tiers clamped to each
    /// week's range.
    pub fn random_walk<R: Rng + ?Sized>(&self, rng: &mut R, max_step: usize) -> IndexSequence {
        let mut indexes = IndexSequence::with_capacity(self.weeks());

        for week in 0..self.weeks() {
            let idx = match indexes.last() {
                None => rng.gen_range(0..=self.top(week)),
                Some(previous) => {
                    let deviation = rng.gen_range(0..=2 * max_step);

                    (previous + deviation).saturating_sub(max_step)
                }
            };

            indexes.push(idx.min(self.top(week)));
        }

        indexes
    }

    /// Move each week down one tier with probability `p`, up one tier with probability `p`,
    /// then keep every week within `max_step` tiers of the already moved previous week.
    pub fn neighbour<R: Rng + ?Sized>(
        &self,
        current: &[usize],
        rng: &mut R,
        p: f64,
        max_step: usize,
    ) -> IndexSequence {
        let mut indexes = IndexSequence::with_capacity(current.len());

        for (week, idx) in current.iter().copied().enumerate() {
            let roll: f64 = rng.r#gen();

            let moved = if roll < p {
                idx.saturating_sub(1)
            } else if roll >= 1.0 - p {
                idx + 1
            } else {
                idx
            };

            let mut next = moved.min(self.top(week));

            if let Some(previous) = indexes.last() {
                next = next.clamp(previous.saturating_sub(max_step), previous + max_step);
            }

            indexes.push(next.min(self.top(week)));
        }

        indexes
    }
}

/// Best schedule found for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Winning schedule
    pub schedule: GroupSchedule,

    /// Winning tier indexes
    pub indexes: IndexSequence,

    /// Ledger of the winning schedule
    pub ledger: Ledger,

    /// Number of candidate sequences simulated
    pub evaluated: usize,

    /// Whether the search stopped before spending its trial budget
    pub interrupted: bool,
}

/// Two-phase randomized search driven by the simulator.
#[derive(Debug, Clone, Default)]
pub struct NeighbourhoodSearch {
    settings: Settings,
    cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug)]
struct Incumbent {
    indexes: IndexSequence,
    profit: Decimal,
    inventory_left: u64,
    feasible: bool,
}

struct Budget {
    started: Instant,
    time_limit: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Budget {
    fn exhausted(&self) -> bool {
        let cancelled = self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));

        let timed_out = self
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit);

        cancelled || timed_out
    }
}

impl NeighbourhoodSearch {
    /// Search using the given planning rules and search budgets.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            cancel: None,
        }
    }

    /// Stop searching once `flag` is set. The best schedule found so far is still reported.
    #[must_use]
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Planning rules.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Search one group, drawing every random number from `rng`.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if a week has no eligible discount or the simulator rejects a
    /// sequence.
    pub fn search_with_rng<R: Rng + ?Sized>(
        &self,
        group: &ProductGroup,
        horizon: &PlanningHorizon,
        rng: &mut R,
    ) -> Result<SearchOutcome, SolverError> {
        ensure_schedulable(group, horizon)?;

        let search = &self.settings.search;
        let ladder = TierLadder::new(group);
        let max_step = self.settings.max_tier_step();
        let cap = self
            .settings
            .ending_inventory_cap(group.total_initial_inventory());

        let budget = Budget {
            started: Instant::now(),
            time_limit: search.time_limit(),
            cancel: self.cancel.clone(),
        };

        let mut best = Incumbent {
            indexes: ladder.lowest(),
            profit: Decimal::ZERO,
            inventory_left: group.total_initial_inventory(),
            feasible: false,
        };

        let mut evaluated = 0;
        let mut interrupted = false;

        info!(
            group = group.name(),
            trials = search.exploration_trials,
            "exploration phase started"
        );

        for trial in 0..search.exploration_trials {
            if budget.exhausted() {
                interrupted = true;
                break;
            }

            let candidate = ladder.random_walk(rng, max_step);
            evaluated += 1;

            if try_improve(&ladder, candidate, cap, &mut best)? {
                debug!(trial, profit = %best.profit, "exploration improved");
            }
        }

        if !interrupted {
            info!(
                group = group.name(),
                trials = search.local_search_trials,
                profit = %best.profit,
                feasible = best.feasible,
                "local search phase started"
            );

            for trial in 0..search.local_search_trials {
                if budget.exhausted() {
                    interrupted = true;
                    break;
                }

                let candidate =
                    ladder.neighbour(&best.indexes, rng, search.move_probability, max_step);

                if candidate == best.indexes {
                    continue;
                }

                evaluated += 1;

                if try_improve(&ladder, candidate, cap, &mut best)? {
                    debug!(trial, profit = %best.profit, "local search improved");
                }
            }
        }

        if interrupted {
            warn!(
                group = group.name(),
                evaluated, "search stopped early, reporting best schedule so far"
            );
        }

        let discounts = ladder.discounts(&best.indexes);
        let ledger = simulator::ledger(group, horizon, &discounts)?;

        // Without a feasible candidate the lowest tiers are reported as a baseline.
        if !best.feasible {
            let baseline = simulator::simulate(group, &discounts)?;

            best.profit = baseline.total_profit;
            best.inventory_left = baseline.total_inventory_left;
            best.feasible = baseline.within_ending_inventory(cap);

            if !best.feasible {
                warn!(
                    group = group.name(),
                    "no schedule met the minimum sell-through, reporting the lowest tiers"
                );
            }
        }

        info!(
            group = group.name(),
            profit = %best.profit,
            feasible = best.feasible,
            evaluated,
            elapsed = ?budget.started.elapsed(),
            "search finished"
        );

        Ok(SearchOutcome {
            schedule: GroupSchedule {
                group: group.name().to_string(),
                discounts,
                profit: best.profit,
                inventory_left: best.inventory_left,
                feasible: best.feasible,
            },
            indexes: best.indexes,
            ledger,
            evaluated,
            interrupted,
        })
    }

    /// Search one group with a generator seeded from the settings.
    ///
    /// # Errors
    ///
    /// See [`NeighbourhoodSearch::search_with_rng`].
    pub fn search(
        &self,
        group: &ProductGroup,
        horizon: &PlanningHorizon,
    ) -> Result<SearchOutcome, SolverError> {
        let mut rng = StdRng::seed_from_u64(self.settings.search.seed);

        self.search_with_rng(group, horizon, &mut rng)
    }
}

/// Simulate `candidate` and replace `best` if it is feasible and strictly more profitable.
fn try_improve(
    ladder: &TierLadder<'_>,
    candidate: IndexSequence,
    cap: Decimal,
    best: &mut Incumbent,
) -> Result<bool, SolverError> {
    let discounts = ladder.discounts(&candidate);
    let result = simulator::simulate(ladder.group, &discounts)?;

    if !result.within_ending_inventory(cap) {
        return Ok(false);
    }

    // The first feasible candidate is adopted whatever its profit.
    if best.feasible && result.total_profit <= best.profit {
        return Ok(false);
    }

    *best = Incumbent {
        indexes: candidate,
        profit: result.total_profit,
        inventory_left: result.total_inventory_left,
        feasible: true,
    };

    Ok(true)
}

impl Solver for NeighbourhoodSearch {
    /// Search every group in model order, sharing one seeded generator.
    fn solve(&self, model: &DemandModel) -> Result<Plan, SolverError> {
        if model.groups().is_empty() {
            return Err(SolverError::NoGroups);
        }

        let mut rng = StdRng::seed_from_u64(self.settings.search.seed);
        let mut schedules = Vec::with_capacity(model.groups().len());
        let mut ledger = Ledger::default();

        for group in model.groups() {
            let outcome = self.search_with_rng(group, model.horizon(), &mut rng)?;

            schedules.push(outcome.schedule);
            ledger.extend(outcome.ledger);
        }

        Ok(Plan { schedules, ledger })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;
    use testresult::TestResult;

    use crate::{
        discounts::Discount,
        products::{PriceDemand, Product, ProductId},
        settings::SearchSettings,
        test_support::{elastic_model, single_product_group, two_week_horizon},
    };

    use super::*;

    fn quick_settings(seed: u64) -> Settings {
        Settings {
            search: SearchSettings {
                seed,
                exploration_trials: 200,
                local_search_trials: 500,
                ..SearchSettings::default()
            },
            ..Settings::default()
        }
    }

    /// Full price sells too little to meet the sell-through rule but earns the most.
    fn clearance_trap() -> ProductGroup {
        let mut product = Product::new(ProductId(1), 100, Decimal::ONE, "g", 2);

        for week in 0..2 {
            product.curve.insert(
                week,
                Discount::ZERO,
                PriceDemand::new(Decimal::ONE_HUNDRED, 25),
            );
            product.curve.insert(
                week,
                Discount::from_points(50),
                PriceDemand::new(Decimal::TWO, 100),
            );
        }

        ProductGroup::new("g", vec![product], 2)
    }

    /// Every discount sells below cost, so each schedule that clears the stock loses money.
    fn loss_making_clearance() -> ProductGroup {
        let mut product = Product::new(ProductId(1), 100, Decimal::from(20), "g", 2);

        for week in 0..2 {
            product
                .curve
                .insert(week, Discount::ZERO, PriceDemand::new(Decimal::TEN, 80));
            product.curve.insert(
                week,
                Discount::from_points(20),
                PriceDemand::new(Decimal::from(8), 100),
            );
        }

        ProductGroup::new("g", vec![product], 2)
    }

    #[test]
    fn same_seed_gives_same_schedule() -> TestResult {
        let model = elastic_model(3, &[0, 10, 20, 30, 40], 4)?;
        let group = model.group("g").ok_or("missing group")?;
        let search = NeighbourhoodSearch::new(quick_settings(42));

        let first = search.search(group, model.horizon())?;
        let second = search.search(group, model.horizon())?;

        assert_eq!(first, second);
        assert!(first.schedule.feasible);

        Ok(())
    }

    #[test]
    fn infeasible_candidates_are_rejected_despite_higher_profit() -> TestResult {
        let group = clearance_trap();
        let horizon = two_week_horizon()?;

        let everything_at_full_price = simulator::simulate(&group, &[Discount::ZERO; 2])?;
        assert_eq!(everything_at_full_price.total_profit, Decimal::from(4950));

        let outcome = NeighbourhoodSearch::new(quick_settings(7)).search(&group, &horizon)?;

        assert!(outcome.schedule.feasible);
        assert_eq!(outcome.indexes.as_slice(), &[0, 1]);
        assert_eq!(outcome.schedule.profit, Decimal::from(2550));
        assert_eq!(outcome.schedule.inventory_left, 0);
        assert_eq!(outcome.ledger.total_profit(), outcome.schedule.profit);

        Ok(())
    }

    #[test]
    fn first_feasible_candidate_is_adopted_at_a_loss() -> TestResult {
        let group = loss_making_clearance();
        let ladder = TierLadder::new(&group);

        let mut best = Incumbent {
            indexes: ladder.lowest(),
            profit: Decimal::ZERO,
            inventory_left: group.total_initial_inventory(),
            feasible: false,
        };

        assert!(try_improve(&ladder, smallvec![1, 1], Decimal::from(40), &mut best)?);
        assert!(best.feasible);
        assert_eq!(best.profit, Decimal::from(-1200));

        assert!(try_improve(&ladder, smallvec![0, 1], Decimal::from(40), &mut best)?);
        assert_eq!(best.profit, Decimal::from(-1040));

        assert!(try_improve(&ladder, smallvec![0, 0], Decimal::from(40), &mut best)?);
        assert_eq!(best.profit, Decimal::from(-1000));
        assert!(!try_improve(&ladder, smallvec![1, 0], Decimal::from(40), &mut best)?);

        Ok(())
    }

    #[test]
    fn loss_making_group_still_reports_a_feasible_schedule() -> TestResult {
        let group = loss_making_clearance();

        let outcome =
            NeighbourhoodSearch::new(quick_settings(9)).search(&group, &two_week_horizon()?)?;

        assert!(outcome.schedule.feasible);
        assert_eq!(outcome.indexes.as_slice(), &[0, 0]);
        assert_eq!(outcome.schedule.profit, Decimal::from(-1000));
        assert_eq!(outcome.schedule.inventory_left, 0);
        assert_eq!(outcome.ledger.total_profit(), outcome.schedule.profit);

        Ok(())
    }

    #[test]
    fn reports_baseline_when_nothing_is_feasible() -> TestResult {
        let group = single_product_group(100, &[(10, 5), (10, 5)], 4);

        let outcome =
            NeighbourhoodSearch::new(quick_settings(0)).search(&group, &two_week_horizon()?)?;

        assert!(!outcome.schedule.feasible);
        assert_eq!(outcome.indexes.as_slice(), &[0, 0]);
        assert_eq!(outcome.schedule.profit, Decimal::from(60));
        assert_eq!(outcome.schedule.inventory_left, 90);

        Ok(())
    }

    #[test]
    fn cancelled_search_stops_before_the_first_trial() -> TestResult {
        let model = elastic_model(2, &[0, 10, 20], 3)?;
        let group = model.group("g").ok_or("missing group")?;

        let outcome = NeighbourhoodSearch::new(quick_settings(1))
            .with_cancellation(Arc::new(AtomicBool::new(true)))
            .search(group, model.horizon())?;

        assert!(outcome.interrupted);
        assert_eq!(outcome.evaluated, 0);
        assert!(!outcome.schedule.feasible);

        Ok(())
    }

    #[test]
    fn local_search_moves_respect_the_band() -> TestResult {
        let model = elastic_model(1, &[0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50], 6)?;
        let group = model.group("g").ok_or("missing group")?;
        let ladder = TierLadder::new(group);
        let mut rng = StdRng::seed_from_u64(3);

        let current: IndexSequence = smallvec![0, 4, 8, 10, 6, 2];

        for _ in 0..200 {
            let next = ladder.neighbour(&current, &mut rng, 0.3, 4);

            assert_eq!(next.len(), current.len());

            for pair in next.windows(2) {
                if let [before, after] = pair {
                    assert!(before.abs_diff(*after) <= 4);
                }
            }

            assert!(next.iter().all(|idx| *idx <= 10));
        }

        Ok(())
    }

    #[test]
    fn random_walk_stays_in_range() -> TestResult {
        let model = elastic_model(1, &[0, 10, 20], 8)?;
        let group = model.group("g").ok_or("missing group")?;
        let ladder = TierLadder::new(group);

        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..100 {
            let walk = ladder.random_walk(&mut rng, 4);

            assert_eq!(walk.len(), 8);
            assert!(walk.iter().all(|idx| *idx <= 2));
        }

        // An all-zero stream always draws the largest downward step.
        let walk = ladder.random_walk(&mut StepRng::new(0, 0), 4);
        assert!(walk.windows(2).all(|pair| pair.first() >= pair.last()));

        Ok(())
    }

    #[test]
    fn solver_trait_matches_group_search() -> TestResult {
        let model = elastic_model(2, &[0, 10, 20, 30], 4)?;
        let group = model.group("g").ok_or("missing group")?;
        let search = NeighbourhoodSearch::new(quick_settings(5));

        let plan = search.solve(&model)?;
        let outcome = search.search(group, model.horizon())?;

        assert_eq!(plan.schedules, vec![outcome.schedule]);
        assert_eq!(plan.ledger, outcome.ledger);

        Ok(())
    }
}
