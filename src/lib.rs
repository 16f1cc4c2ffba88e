//! MTOP Solver Library
//!
//! A solver for the multi-day team orienteering problem with fixed main
//! tasks: every (day, cohort) pair runs one bounded-duration route from the
//! depot, main tasks must be served at their start time on their day, and
//! optional tasks are picked to maximize the collected profit.
//!
//! # Features
//!
//! - Route feasibility and slack simulation
//! - Attractiveness-ranked greedy construction, run over several parameter tuples
//! - Six move families (intra/inter-route swap, 2-opt, insertion, two replacements)
//! - Sequential descent and iterated local search with random and block removal
//! - Benchmarking over seeds, JSON/CSV export
//!
//! # Example
//!
//! ```no_run
//! use mtop_solver::config::SolverConfig;
//! use mtop_solver::instance::Instance;
//! use mtop_solver::solver::Solver;
//!
//! let instance = Instance::from_json_file("instance.json").unwrap();
//! let outcome = Solver::new(SolverConfig::default())
//!     .unwrap()
//!     .solve(&instance)
//!     .unwrap();
//!
//! println!("Total profit: {}", outcome.best.total_profit);
//! ```

pub mod instance;
pub mod error;
pub mod config;
pub mod feasibility;
pub mod solution;
pub mod evaluator;
pub mod heuristics;
pub mod solver;
pub mod benchmark;
pub mod report;

#[cfg(test)]
mod test_support;

pub use error::{Result, SolverError};
pub use instance::Instance;
pub use solution::{RoutePlan, Solution, SolutionPool};
