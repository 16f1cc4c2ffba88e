//! Greedy construction of an initial plan.
//!
//! Routes are filled one (day, cohort) at a time. Each route starts from
//! its pre-allocated main tasks; optional tasks are ranked by an
//! attractiveness score and the best one that still reaches the next main
//! task (or the depot) in time is appended to the current segment.

use crate::config::ConstructionParams;
use crate::error::{Result, SolverError};
use crate::heuristics::allocation::Allocation;
use crate::instance::Instance;
use crate::solution::Solution;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::BTreeSet;

pub trait ConstructionHeuristic {
    fn construct(&self, instance: &Instance) -> Result<Solution>;
    fn name(&self) -> &str;
}

/// Nearby unplanned profitable tasks per task.
///
/// Entries shrink as tasks get planned, so density scores decay as a
/// neighbourhood empties.
#[derive(Debug, Clone)]
pub struct Scoreboard {
    nearby: Vec<BTreeSet<usize>>,
}

impl Scoreboard {
    pub fn new(instance: &Instance, radius: i64) -> Self {
        let optional = instance.optional_positions();
        let mut nearby = vec![BTreeSet::new(); instance.len()];
        for &t in &optional {
            for &u in &optional {
                if u != t && instance.profit(u) > 0 && instance.distance(t, u) <= radius {
                    nearby[t].insert(u);
                }
            }
        }
        Scoreboard { nearby }
    }

    #[inline]
    pub fn density(&self, task: usize) -> usize {
        self.nearby[task].len()
    }

    /// Forget a task that has just been planned
    pub fn remove(&mut self, task: usize) {
        self.nearby[task].clear();
        for set in &mut self.nearby {
            set.remove(&task);
        }
    }
}

/// Attractiveness-ranked greedy insertion
#[derive(Debug, Clone)]
pub struct GreedyConstruction {
    pub params: ConstructionParams,
    pub allocation: Allocation,
    /// Travel time under which two tasks count as neighbours
    pub proximity_radius: i64,
    label: String,
}

impl GreedyConstruction {
    pub fn new(params: ConstructionParams, allocation: Allocation, proximity_radius: i64) -> Self {
        let label = format!(
            "Greedy-{:?}(a={}, b={})",
            params.attractiveness, params.a, params.b
        );
        GreedyConstruction {
            params,
            allocation,
            proximity_radius,
            label,
        }
    }

    /// Score of appending `task` after `prev` at the current point of a route
    pub fn score(
        &self,
        instance: &Instance,
        prev: usize,
        task: usize,
        next_main: Option<usize>,
        scoreboard: Option<&Scoreboard>,
    ) -> f64 {
        let profit = instance.profit(task).max(0) as f64;
        let cost = (instance.service_time(task) + instance.distance(prev, task)).max(1) as f64;
        let mut score = profit.powf(self.params.a) / cost;

        if self.params.attractiveness.uses_density() {
            if let Some(board) = scoreboard {
                score += board.density(task) as f64 / self.params.b;
            }
        }
        if self.params.attractiveness.uses_detour() {
            if let Some(main) = next_main {
                let detour = instance.distance(prev, task) + instance.distance(task, main)
                    - instance.distance(prev, main);
                score -= self.params.detour_weight * detour as f64;
            }
        }
        score
    }

    /// Can `task` follow `prev` at `elapsed` and still make the next deadline?
    #[inline]
    fn fits(instance: &Instance, elapsed: i64, prev: usize, task: usize, next_main: Option<usize>) -> bool {
        let ready = elapsed + instance.distance(prev, task) + instance.service_time(task);
        match next_main {
            Some(main) => ready + instance.distance(task, main) <= instance.task(main).start_time,
            None => ready + instance.distance(task, 0) <= instance.max_route_duration,
        }
    }

    /// Unplanned tasks in descending score order (stable on ties)
    fn ranked(
        &self,
        instance: &Instance,
        unplanned: &BTreeSet<usize>,
        prev: usize,
        next_main: Option<usize>,
        scoreboard: Option<&Scoreboard>,
    ) -> Vec<usize> {
        let mut scored: Vec<(usize, f64)> = unplanned
            .iter()
            .map(|&t| (t, self.score(instance, prev, t, next_main, scoreboard)))
            .collect();
        scored.sort_by_key(|&(_, s)| std::cmp::Reverse(OrderedFloat(s)));
        scored.into_iter().map(|(t, _)| t).collect()
    }

    /// Fill one route in place, consuming tasks from `unplanned`
    fn fill_route(
        &self,
        instance: &Instance,
        day: usize,
        cohort: usize,
        route: &mut Vec<usize>,
        unplanned: &mut BTreeSet<usize>,
        scoreboard: &mut Option<Scoreboard>,
    ) -> Result<()> {
        let mains: Vec<usize> = route.clone();
        let mut elapsed = 0i64;
        let mut prev = 0usize;

        for next_main in mains.iter().copied().map(Some).chain(std::iter::once(None)) {
            while !unplanned.is_empty() {
                let ranked = self.ranked(instance, unplanned, prev, next_main, scoreboard.as_ref());
                let Some(task) = ranked
                    .into_iter()
                    .find(|&t| Self::fits(instance, elapsed, prev, t, next_main))
                else {
                    break;
                };

                insert_before(route, next_main, task, day, cohort)?;
                elapsed += instance.distance(prev, task) + instance.service_time(task);
                prev = task;
                unplanned.remove(&task);
                if let Some(board) = scoreboard.as_mut() {
                    board.remove(task);
                }
            }

            if let Some(main) = next_main {
                let start = instance.task(main).start_time;
                if elapsed + instance.distance(prev, main) > start {
                    log::warn!(
                        "main task {} is reached late on day {} cohort {}",
                        instance.task(main).id,
                        day,
                        cohort
                    );
                }
                elapsed = start + instance.service_time(main);
                prev = main;
            }
        }
        Ok(())
    }
}

/// Insert `task` right before `main`, or at the end when there is no main
/// task left. A main task missing from the route is reported, not skipped.
fn insert_before(
    route: &mut Vec<usize>,
    main: Option<usize>,
    task: usize,
    day: usize,
    cohort: usize,
) -> Result<()> {
    match main {
        None => route.push(task),
        Some(main) => match route.iter().position(|&p| p == main) {
            Some(index) => route.insert(index, task),
            None => {
                log::error!(
                    "main task {} missing from route of day {} cohort {}; nothing inserted",
                    main,
                    day,
                    cohort
                );
                return Err(SolverError::MainTaskNotInRoute { main, day, cohort });
            }
        },
    }
    Ok(())
}

impl ConstructionHeuristic for GreedyConstruction {
    fn construct(&self, instance: &Instance) -> Result<Solution> {
        let start = std::time::Instant::now();

        let mut plan = self.allocation.skeleton();
        let mut unplanned: BTreeSet<usize> = instance.optional_positions().into_iter().collect();
        let mut scoreboard = self
            .params
            .attractiveness
            .uses_density()
            .then(|| Scoreboard::new(instance, self.proximity_radius));

        'days: for day in 0..instance.days {
            for cohort in 0..instance.cohort_no {
                if unplanned.is_empty() {
                    break 'days;
                }
                let mut route = plan.route(day, cohort).to_vec();
                self.fill_route(instance, day, cohort, &mut route, &mut unplanned, &mut scoreboard)?;
                plan.set_route(day, cohort, route);
            }
        }

        let mut solution = Solution::from_plan(instance, plan, self.name());
        solution.computation_time = start.elapsed().as_secs_f64();
        Ok(solution)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Runs several parameter tuples and keeps the most profitable plan
pub struct MultiStartConstruction {
    variants: Vec<GreedyConstruction>,
}

impl MultiStartConstruction {
    pub fn new(variants: Vec<GreedyConstruction>) -> Self {
        MultiStartConstruction { variants }
    }

    pub fn from_params(params: &[ConstructionParams], allocation: &Allocation, proximity_radius: i64) -> Self {
        let variants = params
            .iter()
            .map(|&p| GreedyConstruction::new(p, allocation.clone(), proximity_radius))
            .collect();
        MultiStartConstruction { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

impl ConstructionHeuristic for MultiStartConstruction {
    fn construct(&self, instance: &Instance) -> Result<Solution> {
        let start = std::time::Instant::now();

        let solutions = self
            .variants
            .par_iter()
            .map(|v| v.construct(instance))
            .collect::<Result<Vec<_>>>()?;

        let mut best: Option<Solution> = None;
        for solution in solutions {
            log::debug!("{}: profit {}", solution.algorithm, solution.total_profit);
            // strict comparison: the first of equally good variants wins
            if best.as_ref().map_or(true, |b| solution.total_profit > b.total_profit) {
                best = Some(solution);
            }
        }

        let mut best = best.ok_or_else(|| {
            SolverError::InvalidConfig("multi-start construction has no variants".to_string())
        })?;
        log::info!(
            "construction: best variant {} with profit {}",
            best.algorithm,
            best.total_profit
        );
        best.computation_time = start.elapsed().as_secs_f64();
        Ok(best)
    }

    fn name(&self) -> &str {
        "MultiStart"
    }
}
