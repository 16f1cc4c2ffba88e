//! Improvement heuristics.
//!
//! This module implements:
//! - Sequential descent over an ordered list of neighborhoods
//! - Iterated local search: perturb (random removal or block removal),
//!   descend again, restart from the best plan after too many misses

use crate::config::{EvaluationStrategy, PerturbationConfig, SolverConfig};
use crate::heuristics::neighborhood::Neighborhood;
use crate::instance::Instance;
use crate::solution::{RoutePlan, Solution, SolutionPool};
use indicatif::ProgressBar;
use rand::prelude::*;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Trait for improvement methods
pub trait ImprovementHeuristic {
    /// Improve `solution`, registering every accepted plan in `pool`
    fn improve(
        &self,
        instance: &Instance,
        solution: Solution,
        pool: &mut SolutionPool,
        rng: &mut ChaCha8Rng,
    ) -> Solution;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Improving,
    Converged,
}

/// What a descent did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescentOutcome {
    pub state: SearchState,
    pub moves_applied: usize,
    pub passes: usize,
}

/// Sequential descent.
///
/// Each neighborhood is applied until it has no improving feasible move
/// left, then the next one takes over. A full pass without any move means
/// the search has converged.
pub struct LocalSearch {
    neighborhoods: Vec<Neighborhood>,
    pub strategy: EvaluationStrategy,
    /// Upper bound on full passes over the neighborhood list
    pub max_passes: usize,
}

impl LocalSearch {
    pub fn new(neighborhoods: Vec<Neighborhood>, strategy: EvaluationStrategy, max_passes: usize) -> Self {
        LocalSearch {
            neighborhoods,
            strategy,
            max_passes,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        LocalSearch::new(
            Neighborhood::build_all(&config.neighborhoods, &config.neighborhood),
            config.evaluation,
            config.max_local_search_passes,
        )
    }

    /// Descend from `solution` and report how it went.
    ///
    /// A task taken out by a replacement cannot come back through another
    /// replacement during the same descent; insertion may still reuse it.
    /// Returns the most profitable feasible plan visited.
    pub fn descend(
        &self,
        instance: &Instance,
        solution: Solution,
        pool: &mut SolutionPool,
        rng: &mut ChaCha8Rng,
    ) -> (Solution, DescentOutcome) {
        let mut best = solution.feasible.then(|| solution.clone());
        let mut current = solution;
        let mut dropped = BTreeSet::new();
        let mut outcome = DescentOutcome {
            state: SearchState::Idle,
            moves_applied: 0,
            passes: 0,
        };

        while outcome.passes < self.max_passes {
            outcome.passes += 1;
            let mut moved = false;

            for neighborhood in &self.neighborhoods {
                while let Some(mv) =
                    neighborhood.find_improving_move_keeping_out(instance, &current, self.strategy, rng, &dropped)
                {
                    outcome.state = SearchState::Improving;
                    log::debug!(
                        "{}: profit {:+}, time {:+}",
                        mv.kind,
                        mv.profit_delta,
                        mv.time_delta
                    );
                    if let Some(task) = mv.candidate.replaced_task(&current) {
                        dropped.insert(task);
                    }
                    current = mv.apply(instance, &current);
                    pool.push(current.clone());
                    if current.feasible && best.as_ref().map_or(true, |b| current.total_profit > b.total_profit) {
                        best = Some(current.clone());
                    }
                    outcome.moves_applied += 1;
                    moved = true;
                }
            }

            if !moved {
                outcome.state = SearchState::Converged;
                break;
            }
        }

        if outcome.state != SearchState::Converged {
            log::debug!("descent stopped after {} passes without converging", outcome.passes);
        }
        match best {
            Some(best) if best.total_profit > current.total_profit => (best, outcome),
            _ => (current, outcome),
        }
    }
}

impl ImprovementHeuristic for LocalSearch {
    fn improve(
        &self,
        instance: &Instance,
        solution: Solution,
        pool: &mut SolutionPool,
        rng: &mut ChaCha8Rng,
    ) -> Solution {
        self.descend(instance, solution, pool, rng).0
    }

    fn name(&self) -> &str {
        "LocalSearch"
    }
}

/// (day, cohort, index) of every scheduled optional task
fn optional_slots(instance: &Instance, plan: &RoutePlan) -> Vec<(usize, usize, usize)> {
    plan.iter_routes()
        .flat_map(|(day, cohort, route)| {
            route
                .iter()
                .enumerate()
                .filter(|&(_, &p)| instance.is_optional(p))
                .map(move |(i, _)| (day, cohort, i))
        })
        .collect()
}

/// Plan without the given (day, cohort, index) entries
fn without(plan: &RoutePlan, removed: &BTreeSet<(usize, usize, usize)>) -> RoutePlan {
    let mut next = RoutePlan::empty(plan.days(), plan.cohorts());
    for (day, cohort, route) in plan.iter_routes() {
        let kept = route
            .iter()
            .enumerate()
            .filter(|&(i, _)| !removed.contains(&(day, cohort, i)))
            .map(|(_, &p)| p)
            .collect();
        next.set_route(day, cohort, kept);
    }
    next
}

/// Drop `k` scheduled optional tasks chosen uniformly; main tasks stay
pub fn remove_random_tasks(instance: &Instance, solution: &Solution, k: usize, rng: &mut ChaCha8Rng) -> Solution {
    let slots = optional_slots(instance, &solution.plan);
    let amount = k.min(slots.len());
    let removed: BTreeSet<_> = index::sample(rng, slots.len(), amount)
        .into_iter()
        .map(|s| slots[s])
        .collect();
    Solution::from_plan(instance, without(&solution.plan, &removed), &solution.algorithm)
}

/// Cut a block of `m` consecutive optional tasks out of each of
/// `route_count` randomly chosen routes. Main tasks inside a block are
/// skipped over, not removed.
pub fn remove_random_block(
    instance: &Instance,
    solution: &Solution,
    m: usize,
    route_count: usize,
    rng: &mut ChaCha8Rng,
) -> Solution {
    let routes: Vec<(usize, usize, Vec<usize>)> = solution
        .plan
        .iter_routes()
        .map(|(day, cohort, route)| {
            let idx = route
                .iter()
                .enumerate()
                .filter(|&(_, &p)| instance.is_optional(p))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            (day, cohort, idx)
        })
        .filter(|(_, _, idx)| !idx.is_empty())
        .collect();

    let mut removed = BTreeSet::new();
    let chosen = index::sample(rng, routes.len(), route_count.min(routes.len()));
    for r in chosen.into_iter() {
        let (day, cohort, idx) = &routes[r];
        let len = m.min(idx.len());
        let start = rng.gen_range(0..=idx.len() - len);
        for &i in &idx[start..start + len] {
            removed.insert((*day, *cohort, i));
        }
    }
    Solution::from_plan(instance, without(&solution.plan, &removed), &solution.algorithm)
}

/// What happened to the working solution after one perturbation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Improved,
    Moved,
    Restarted,
}

/// Working and best solution of the perturbation loop
#[derive(Debug, Clone)]
pub struct Walk {
    pub current: Solution,
    pub best: Solution,
    non_improving: usize,
    restart_after: usize,
}

impl Walk {
    pub fn new(current: Solution, best: Solution, restart_after: usize) -> Self {
        Walk {
            current,
            best,
            non_improving: 0,
            restart_after,
        }
    }

    /// Move to `candidate`; only a feasible, strictly more profitable plan
    /// becomes the best. After `restart_after` misses in a row the walk
    /// resumes from the best plan.
    pub fn step(&mut self, candidate: Solution) -> Step {
        if candidate.feasible && candidate.total_profit > self.best.total_profit {
            self.best = candidate.clone();
            self.current = candidate;
            self.non_improving = 0;
            return Step::Improved;
        }

        self.current = candidate;
        self.non_improving += 1;
        if self.non_improving >= self.restart_after {
            self.current = self.best.clone();
            self.non_improving = 0;
            return Step::Restarted;
        }
        Step::Moved
    }
}

/// Counters of one perturbation loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IlsOutcome {
    pub iterations: usize,
    pub improvements: usize,
    pub restarts: usize,
}

/// Iterated local search under a wall-clock budget
pub struct IteratedLocalSearch {
    pub local_search: LocalSearch,
    pub perturbation: PerturbationConfig,
    pub time_limit: Duration,
    pub max_iterations: Option<usize>,
    progress: Option<ProgressBar>,
}

impl IteratedLocalSearch {
    pub fn new(
        local_search: LocalSearch,
        perturbation: PerturbationConfig,
        time_limit: Duration,
        max_iterations: Option<usize>,
    ) -> Self {
        IteratedLocalSearch {
            local_search,
            perturbation,
            time_limit,
            max_iterations,
            progress: None,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        IteratedLocalSearch::new(
            LocalSearch::from_config(config),
            config.perturbation.clone(),
            Duration::from_secs_f64(config.time_limit_secs),
            config.max_iterations,
        )
    }

    /// Report iterations and the best profit on `bar`
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    fn perturb(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Solution {
        if rng.gen_bool(0.5) {
            remove_random_tasks(instance, solution, self.perturbation.removal_count, rng)
        } else {
            remove_random_block(
                instance,
                solution,
                self.perturbation.block_size,
                self.perturbation.block_routes,
                rng,
            )
        }
    }

    fn budget_left(&self, start: Instant, iteration: usize) -> bool {
        start.elapsed() < self.time_limit && self.max_iterations.map_or(true, |max| iteration < max)
    }

    /// Run the loop and report its counters along with the best plan
    pub fn run(
        &self,
        instance: &Instance,
        solution: Solution,
        pool: &mut SolutionPool,
        rng: &mut ChaCha8Rng,
    ) -> (Solution, IlsOutcome) {
        let start = Instant::now();

        let initial = solution.clone();
        let (current, _) = self.local_search.descend(instance, solution, pool, rng);
        // time-driven replacements may trade profit away
        let best = if initial.feasible && initial.total_profit > current.total_profit {
            initial
        } else {
            current.clone()
        };
        let mut walk = Walk::new(current, best, self.perturbation.restart_after);
        let mut outcome = IlsOutcome::default();

        // the budget is only polled between iterations
        while self.budget_left(start, outcome.iterations) {
            outcome.iterations += 1;

            let perturbed = self.perturb(instance, &walk.current, rng);
            let (candidate, _) = self.local_search.descend(instance, perturbed, pool, rng);

            let previous = walk.best.total_profit;
            match walk.step(candidate) {
                Step::Improved => {
                    log::info!(
                        "iteration {}: profit {} -> {}",
                        outcome.iterations,
                        previous,
                        walk.best.total_profit
                    );
                    outcome.improvements += 1;
                }
                Step::Restarted => {
                    log::info!(
                        "iteration {}: {} iterations without improvement, restarting from best",
                        outcome.iterations,
                        self.perturbation.restart_after
                    );
                    outcome.restarts += 1;
                }
                Step::Moved => {}
            }

            if let Some(bar) = &self.progress {
                bar.inc(1);
                bar.set_message(format!("best profit {}", walk.best.total_profit));
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_with_message(format!("best profit {}", walk.best.total_profit));
        }

        let mut best = walk.best;
        best.algorithm = self.name().to_string();
        best.iterations = Some(outcome.iterations);
        best.computation_time = start.elapsed().as_secs_f64();
        (best, outcome)
    }
}

impl ImprovementHeuristic for IteratedLocalSearch {
    fn improve(
        &self,
        instance: &Instance,
        solution: Solution,
        pool: &mut SolutionPool,
        rng: &mut ChaCha8Rng,
    ) -> Solution {
        self.run(instance, solution, pool, rng).0
    }

    fn name(&self) -> &str {
        "ILS"
    }
}
