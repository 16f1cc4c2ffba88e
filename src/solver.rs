//! End-to-end pipeline: allocate main tasks, build the initial plan with
//! every configured construction variant, then improve it with iterated
//! local search.

use crate::config::{AllocationStrategy, SolverConfig};
use crate::error::Result;
use crate::heuristics::allocation::{self, Allocation};
use crate::heuristics::construction::{ConstructionHeuristic, MultiStartConstruction};
use crate::heuristics::local_search::{ImprovementHeuristic, IteratedLocalSearch};
use crate::instance::Instance;
use crate::solution::{Solution, SolutionPool};
use indicatif::ProgressBar;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Result of a full run
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub best: Solution,
    pub initial: Solution,
    /// Solutions registered in the pool during the run
    pub pool_size: usize,
    /// Invariant violations found in `best` (expected empty)
    pub violations: Vec<String>,
}

pub struct Solver {
    config: SolverConfig,
    external: Option<Allocation>,
    progress: Option<ProgressBar>,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Solver {
            config,
            external: None,
            progress: None,
        })
    }

    /// Supply the allocation used by the `external` strategy
    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.external = Some(allocation);
        self
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Greedy multi-start only
    pub fn construct(&self, instance: &Instance) -> Result<Solution> {
        let construction = &self.config.construction;
        let allocation = allocation::resolve(construction.allocation, instance, self.external.as_ref())?;
        MultiStartConstruction::from_params(&construction.variants, &allocation, construction.proximity_radius)
            .construct(instance)
    }

    pub fn solve(&self, instance: &Instance) -> Result<SolveOutcome> {
        let start = std::time::Instant::now();
        let initial = self.construct(instance)?;
        log::info!(
            "initial plan: profit {}, {} unused tasks, feasible {}",
            initial.total_profit,
            initial.unused.len(),
            initial.feasible
        );

        let mut pool = SolutionPool::new();
        pool.push(initial.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut ils = IteratedLocalSearch::from_config(&self.config);
        if let Some(bar) = &self.progress {
            ils = ils.with_progress(bar.clone());
        }
        let (mut best, search) = ils.run(instance, initial.clone(), &mut pool, &mut rng);

        if let Some(pooled) = pool.best_feasible() {
            if pooled.total_profit > best.total_profit {
                let iterations = best.iterations;
                best = pooled.clone();
                best.iterations = iterations;
            }
        }
        best.algorithm = format!("{} + {}", initial.algorithm, ils.name());
        best.computation_time = start.elapsed().as_secs_f64();

        let require_mains = self.config.construction.allocation != AllocationStrategy::None;
        let violations = best.validate(instance, require_mains);
        for violation in &violations {
            log::warn!("{}", violation);
        }
        log::info!(
            "best plan: profit {} after {} iterations, {} improvements, {} restarts ({} pooled solutions)",
            best.total_profit,
            search.iterations,
            search.improvements,
            search.restarts,
            pool.len()
        );

        Ok(SolveOutcome {
            best,
            initial,
            pool_size: pool.len(),
            violations,
        })
    }
}
