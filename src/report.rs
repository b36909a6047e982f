//! Schedule Report
//!
//! Human-readable summary printed after a run: the discount chosen for each week and group,
//! each group's profit and leftover stock, and the elapsed time.

use std::{io, time::Duration};

use humanize_duration::{Truncate, prelude::DurationExt};
use tabled::{
    builder::Builder,
    settings::{Alignment, Style, object::Columns},
};
use thiserror::Error;

use crate::{horizon::PlanningHorizon, solvers::Plan};

/// Errors that can occur when writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Error writing to the output.
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

/// Summary of a solved plan.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleReport<'a> {
    plan: &'a Plan,
    horizon: &'a PlanningHorizon,
    engine: &'a str,
    elapsed: Duration,
}

impl<'a> ScheduleReport<'a> {
    /// Report on `plan`, produced by `engine` in `elapsed`.
    pub fn new(
        plan: &'a Plan,
        horizon: &'a PlanningHorizon,
        engine: &'a str,
        elapsed: Duration,
    ) -> Self {
        Self {
            plan,
            horizon,
            engine,
            elapsed,
        }
    }

    /// Render the discount table, one row per week and one column per group.
    pub fn schedule_table(&self) -> String {
        let mut builder = Builder::default();

        let mut header = vec!["Week".to_string()];
        header.extend(self.plan.schedules.iter().map(|s| s.group.clone()));
        builder.push_record(header);

        for (week, week_id) in self.horizon.iter() {
            let mut row = vec![week_id.to_string()];

            row.extend(self.plan.schedules.iter().map(|schedule| {
                schedule
                    .discounts
                    .get(week)
                    .map_or_else(|| "-".to_string(), |discount| format!("{discount}%"))
            }));

            builder.push_record(row);
        }

        let mut table = builder.build();

        table.with(Style::modern_rounded());
        table.modify(Columns::new(1..), Alignment::right());

        table.to_string()
    }

    /// Write the table followed by per-group and overall totals.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the output cannot be written.
    pub fn write_to(&self, mut out: impl io::Write) -> Result<(), ReportError> {
        writeln!(out, "\n{}", self.schedule_table())?;

        for schedule in &self.plan.schedules {
            let note = if schedule.feasible {
                ""
            } else {
                " (minimum sell-through not met)"
            };

            writeln!(
                out,
                " {}: profit {}, {} units left{note}",
                schedule.group,
                schedule.profit.round_dp(2),
                schedule.inventory_left,
            )?;
        }

        writeln!(
            out,
            " Total profit: {}",
            self.plan.total_profit().round_dp(2)
        )?;

        writeln!(
            out,
            " Solved by {} in {}",
            self.engine,
            self.elapsed.human(Truncate::Nano)
        )?;

        Ok(())
    }
}
