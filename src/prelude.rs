//! Clearance prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    discounts::{Discount, DiscountError},
    groups::ProductGroup,
    horizon::{HorizonError, PlanningHorizon, WeekId},
    input::{DemandRecord, InputError, load_records, read_records},
    ledger::{Ledger, LedgerEntry, LedgerError},
    model::{DemandModel, DemandModelBuilder, ModelError},
    products::{DemandCurve, PriceDemand, Product, ProductId},
    report::{ReportError, ScheduleReport},
    settings::{SearchSettings, Settings, SettingsError},
    simulator::{SimulationError, SimulationResult, simulate},
    solvers::{
        GroupSchedule, Plan, Solver, SolverError,
        heuristic::{NeighbourhoodSearch, SearchOutcome},
        milp::{
            MilpSolver,
            backend::{GoodLpBackend, MipBackend, SolveStatus},
            observer::{MilpObserver, NoopObserver},
            renderers::lp::{LpRenderError, LpRenderer},
        },
    },
};
