//! Error types shared by the solver.
//!
//! Infeasible candidate moves and exhausted neighborhoods are not errors:
//! they surface as `None`/`false` from the search routines. Only bad input
//! and bad configuration end up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown {kind} '{name}'")]
    UnknownStrategy { kind: &'static str, name: String },

    #[error("malformed main-task allocation: {0}")]
    MalformedAllocation(String),

    #[error("main task {main} is not in the route of day {day}, cohort {cohort}")]
    MainTaskNotInRoute {
        main: usize,
        day: usize,
        cohort: usize,
    },
}

pub type Result<T> = std::result::Result<T, SolverError>;
