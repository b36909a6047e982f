//! Command line interface.

use std::{
    fs,
    io::{self, BufRead, IsTerminal, Write},
    path::PathBuf,
    str::FromStr,
    time::Instant,
};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use tracing::info;

use clearance::{
    input::load_records,
    model::DemandModel,
    report::ScheduleReport,
    settings::Settings,
    solvers::{
        Plan, Solver,
        heuristic::NeighbourhoodSearch,
        milp::{MilpSolver, renderers::lp::LpRenderer},
    },
};

use crate::logging::LoggingConfig;

/// Schedule engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Engine {
    /// Exact MILP formulation
    Milp,

    /// Simulation-driven neighbourhood search
    Heuristic,
}

impl Engine {
    fn name(self) -> &'static str {
        match self {
            Engine::Milp => "MILP",
            Engine::Heuristic => "heuristic search",
        }
    }
}

impl FromStr for Engine {
    type Err = ();

    /// Menu answers: the option number or the engine name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "milp" => Ok(Engine::Milp),
            "2" | "heuristic" => Ok(Engine::Heuristic),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "clearance",
    about = "Plan weekly clearance discounts that maximise profit",
    long_about = None
)]
pub(crate) struct Cli {
    /// Demand CSV, one row per product, week and discount
    #[arg(short, long, env = "CLEARANCE_INPUT")]
    input: PathBuf,

    /// YAML settings file
    #[arg(short, long, env = "CLEARANCE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Engine to run; asked interactively when omitted
    #[arg(short, long, value_enum)]
    engine: Option<Engine>,

    /// Maximum number of products considered per group; asked interactively when omitted
    #[arg(short, long)]
    max_products: Option<usize>,

    /// Cap on the number of planning weeks
    #[arg(long)]
    weeks: Option<usize>,

    /// Seed of the heuristic search
    #[arg(long)]
    seed: Option<u64>,

    /// Directory receiving the output files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    #[command(flatten)]
    pub(crate) logging: LoggingConfig,
}

impl Cli {
    pub(crate) fn run(self) -> anyhow::Result<()> {
        let mut settings = match &self.settings {
            Some(path) => Settings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        let interactive = io::stdin().is_terminal();
        let mut prompter = Prompter::new(io::stdin().lock(), io::stderr());

        settings.max_products = match self.max_products {
            Some(max_products) => max_products,
            None if interactive => prompter
                .max_products()?
                .unwrap_or(settings.max_products),
            None => settings.max_products,
        };

        let engine = match self.engine {
            Some(engine) => engine,
            None if interactive => match prompter.engine()? {
                Some(engine) => engine,
                None => bail!("no engine chosen"),
            },
            None => bail!("--engine is required when stdin is not a terminal"),
        };

        if self.weeks.is_some() {
            settings.weeks = self.weeks;
        }

        if let Some(seed) = self.seed {
            settings.search.seed = seed;
        }

        settings.validate()?;

        let records = load_records(&self.input)
            .with_context(|| format!("failed to load demand from {}", self.input.display()))?;

        let model = DemandModel::from_records(&records, &settings)?;

        fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("failed to create output directory {}", self.out_dir.display())
        })?;

        let started = Instant::now();

        let plan = match engine {
            Engine::Milp => self.run_milp(&model, settings)?,
            Engine::Heuristic => self.run_heuristic(&model, settings)?,
        };

        let elapsed = started.elapsed();

        info!(
            engine = engine.name(),
            profit = %plan.total_profit(),
            elapsed = ?elapsed,
            "schedule computed"
        );

        ScheduleReport::new(&plan, model.horizon(), engine.name(), elapsed)
            .write_to(io::stdout().lock())?;

        Ok(())
    }

    fn run_milp(&self, model: &DemandModel, settings: Settings) -> anyhow::Result<Plan> {
        let mut renderer = LpRenderer::new(self.out_dir.join("model.lp"));

        let solved = MilpSolver::new(settings).solve_with_observer(model, &mut renderer);

        // Written even when the solve fails.
        renderer.write()?;

        info!(path = %renderer.output_path().display(), "LP model written");

        let plan = solved?;
        let path = self.out_dir.join("quantity_sold.csv");

        plan.ledger.save_csv(&path)?;

        info!(path = %path.display(), rows = plan.ledger.len(), "ledger written");

        Ok(plan)
    }

    fn run_heuristic(&self, model: &DemandModel, settings: Settings) -> anyhow::Result<Plan> {
        let plan = NeighbourhoodSearch::new(settings).solve(model)?;
        let path = self.out_dir.join("output.csv");

        plan.ledger.save_csv(&path)?;

        info!(path = %path.display(), rows = plan.ledger.len(), "ledger written");

        Ok(plan)
    }
}

/// Line-based prompts that repeat until the answer is valid.
pub(crate) struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask for the product cap. `None` once input ends.
    pub(crate) fn max_products(&mut self) -> io::Result<Option<usize>> {
        self.ask("Max products to consider per group: ", |answer| {
            answer.trim().parse::<usize>().ok().filter(|n| *n > 0)
        })
    }

    /// Ask for the engine. `None` once input ends.
    pub(crate) fn engine(&mut self) -> io::Result<Option<Engine>> {
        self.ask(
            "Choose an engine:\n  1) MILP\n  2) Heuristic search\n> ",
            |answer| answer.parse().ok(),
        )
    }

    fn ask<T>(
        &mut self,
        question: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> io::Result<Option<T>> {
        let mut line = String::new();

        loop {
            write!(self.output, "{question}")?;
            self.output.flush()?;

            line.clear();

            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            if let Some(value) = parse(&line) {
                return Ok(Some(value));
            }

            writeln!(self.output, "Invalid choice: {}", line.trim())?;
        }
    }
}
