//! Heuristics module.
//!
//! Main-task allocation, greedy construction, the neighborhood engine and
//! the improvement loops built on top of it.

pub mod allocation;
pub mod construction;
pub mod neighborhood;
pub mod local_search;

pub use allocation::*;
pub use construction::*;
pub use neighborhood::*;
pub use local_search::*;
