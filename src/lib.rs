//! Clearance
//!
//! Clearance computes a promotional discount schedule for groups of products that share a weekly
//! discount calendar. Two engines solve the same problem: an exact MILP formulation delegated to a
//! MIP backend, and a simulation-driven randomised local search.

pub mod discounts;
pub mod groups;
pub mod horizon;
pub mod input;
pub mod ledger;
pub mod model;
pub mod prelude;
pub mod products;
pub mod report;
pub mod settings;
pub mod simulator;
pub mod solvers;

#[cfg(test)]
pub(crate) mod test_support;
