//! Neighborhood engine.
//!
//! Each move family discovers candidate moves against a solution, and the
//! [`Neighborhood`] driver evaluates them under an evaluation strategy and
//! selects the best-ranked one whose routes pass the feasibility check.
//! Candidates are plain indices into the current plan; evaluating one
//! builds fresh owned routes and never touches the plan itself.

use crate::config::{DiscoveryMode, EvaluationStrategy, NeighborhoodKind, NeighborhoodSettings};
use crate::evaluator;
use crate::feasibility;
use crate::instance::Instance;
use crate::solution::{RouteChange, Solution};
use rand::prelude::*;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Range;

/// A candidate move, before evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// Exchange `route[i]` and `route[j]`
    SwapIntra {
        day: usize,
        cohort: usize,
        i: usize,
        j: usize,
    },
    /// Exchange `route_a[i]` and `route_b[j]`
    SwapInter {
        a: (usize, usize),
        i: usize,
        b: (usize, usize),
        j: usize,
    },
    /// Reverse `route[i..=j]`
    TwoOpt {
        day: usize,
        cohort: usize,
        i: usize,
        j: usize,
    },
    /// Insert unused `task` before `route[index]`
    Insert {
        day: usize,
        cohort: usize,
        index: usize,
        task: usize,
    },
    /// Put unused `task` in place of `route[index]`
    Replace {
        day: usize,
        cohort: usize,
        index: usize,
        task: usize,
    },
}

impl Candidate {
    /// Compute the resulting routes and deltas.
    ///
    /// `None` when a cheap slack test already rules the move out.
    pub fn evaluate(&self, kind: NeighborhoodKind, instance: &Instance, solution: &Solution) -> Option<Move> {
        let (changes, time_delta, profit_delta) = match *self {
            Candidate::SwapIntra { day, cohort, i, j } => {
                let (route, delta) = evaluator::swap_intra_delta(
                    instance,
                    solution.route(day, cohort),
                    solution.route_slack(day, cohort),
                    i,
                    j,
                );
                (vec![RouteChange { day, cohort, route }], delta, 0)
            }
            Candidate::SwapInter { a, i, b, j } => {
                let (route_a, route_b, delta) = evaluator::swap_inter_delta(
                    instance,
                    solution.route(a.0, a.1),
                    solution.route_slack(a.0, a.1),
                    i,
                    solution.route(b.0, b.1),
                    solution.route_slack(b.0, b.1),
                    j,
                );
                let changes = vec![
                    RouteChange {
                        day: a.0,
                        cohort: a.1,
                        route: route_a,
                    },
                    RouteChange {
                        day: b.0,
                        cohort: b.1,
                        route: route_b,
                    },
                ];
                (changes, delta, 0)
            }
            Candidate::TwoOpt { day, cohort, i, j } => {
                let (route, delta) = evaluator::two_opt_delta(
                    instance,
                    solution.route(day, cohort),
                    solution.route_slack(day, cohort),
                    i,
                    j,
                );
                (vec![RouteChange { day, cohort, route }], delta, 0)
            }
            Candidate::Insert {
                day,
                cohort,
                index,
                task,
            } => {
                let route = solution.route(day, cohort);
                let extra = evaluator::insert_extra_time(instance, route, index, task);
                let route = evaluator::insert_route(route, index, task);
                (
                    vec![RouteChange { day, cohort, route }],
                    extra,
                    instance.profit(task) as i64,
                )
            }
            Candidate::Replace {
                day,
                cohort,
                index,
                task,
            } => {
                let replaced = evaluator::replace_delta(
                    instance,
                    solution.route(day, cohort),
                    solution.route_slack(day, cohort),
                    index,
                    task,
                )?;
                (
                    vec![RouteChange {
                        day,
                        cohort,
                        route: replaced.route,
                    }],
                    replaced.time_delta,
                    replaced.profit_delta,
                )
            }
        };

        Some(Move {
            kind,
            candidate: *self,
            changes,
            time_delta,
            profit_delta,
        })
    }

    /// Task a replacement takes out of `solution`
    pub fn replaced_task(&self, solution: &Solution) -> Option<usize> {
        match *self {
            Candidate::Replace { day, cohort, index, .. } => solution.route(day, cohort).get(index).copied(),
            _ => None,
        }
    }

    /// A replacement bringing back a task listed in `dropped`
    pub fn restores(&self, dropped: &BTreeSet<usize>) -> bool {
        matches!(*self, Candidate::Replace { task, .. } if dropped.contains(&task))
    }
}

/// An evaluated move: the routes it would substitute and what it changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub kind: NeighborhoodKind,
    pub candidate: Candidate,
    pub changes: Vec<RouteChange>,
    /// Extra time consumed over the touched routes (negative frees time)
    pub time_delta: i64,
    pub profit_delta: i64,
}

impl Move {
    /// Every resulting route passes the feasibility check
    pub fn is_feasible(&self, instance: &Instance) -> bool {
        self.changes
            .iter()
            .all(|c| feasibility::is_feasible(instance, &c.route))
    }

    /// New solution with this move's routes substituted
    pub fn apply(&self, instance: &Instance, solution: &Solution) -> Solution {
        solution.with_changes(instance, &self.changes)
    }
}

/// One family of moves: how candidates are found and how they compare
pub trait MoveFamily {
    fn kind(&self) -> NeighborhoodKind;

    /// Enumerate candidates (bounded subsets where the family samples)
    fn discover(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Vec<Candidate>;

    /// Draw one uniformly random valid candidate, if any exists
    fn sample(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Option<Candidate>;

    fn improves(&self, mv: &Move) -> bool;

    /// Natural order, best first
    fn rank(&self, a: &Move, b: &Move) -> Ordering;
}

#[inline]
fn by_time(a: &Move, b: &Move) -> Ordering {
    a.time_delta.cmp(&b.time_delta)
}

#[inline]
fn by_profit_then_time(a: &Move, b: &Move) -> Ordering {
    b.profit_delta
        .cmp(&a.profit_delta)
        .then(a.time_delta.cmp(&b.time_delta))
}

/// Indices of the optional tasks of a route
fn optional_indices(instance: &Instance, route: &[usize]) -> Vec<usize> {
    route
        .iter()
        .enumerate()
        .filter(|&(_, &p)| instance.is_optional(p))
        .map(|(i, _)| i)
        .collect()
}

/// Maximal runs of consecutive optional tasks, at least two long
fn optional_runs(instance: &Instance, route: &[usize]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 0..=route.len() {
        if i == route.len() || !instance.is_optional(route[i]) {
            if i >= start + 2 {
                runs.push(start..i);
            }
            start = i + 1;
        }
    }
    runs
}

/// Unused tasks, down-sampled to `limit` when there are more
fn sample_unused(solution: &Solution, limit: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let unused: Vec<usize> = solution.unused.iter().copied().collect();
    if unused.len() <= limit {
        return unused;
    }
    index::sample(rng, unused.len(), limit)
        .into_iter()
        .map(|k| unused[k])
        .collect()
}

/// Two distinct indices below `len`, in increasing order
fn two_distinct(rng: &mut ChaCha8Rng, len: usize) -> (usize, usize) {
    let picks = index::sample(rng, len, 2);
    let (x, y) = (picks.index(0), picks.index(1));
    (x.min(y), x.max(y))
}

pub struct SwapIntraRoute;

impl MoveFamily for SwapIntraRoute {
    fn kind(&self) -> NeighborhoodKind {
        NeighborhoodKind::SwapIntraRoute
    }

    fn discover(&self, instance: &Instance, solution: &Solution, _rng: &mut ChaCha8Rng) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (day, cohort, route) in solution.plan.iter_routes() {
            let idx = optional_indices(instance, route);
            for a in 0..idx.len() {
                for b in a + 1..idx.len() {
                    candidates.push(Candidate::SwapIntra {
                        day,
                        cohort,
                        i: idx[a],
                        j: idx[b],
                    });
                }
            }
        }
        candidates
    }

    fn sample(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Option<Candidate> {
        let slots: Vec<(usize, usize, Vec<usize>)> = solution
            .plan
            .iter_routes()
            .map(|(d, c, r)| (d, c, optional_indices(instance, r)))
            .filter(|(_, _, idx)| idx.len() >= 2)
            .collect();
        let (day, cohort, idx) = slots.choose(rng)?;
        let (x, y) = two_distinct(rng, idx.len());
        Some(Candidate::SwapIntra {
            day: *day,
            cohort: *cohort,
            i: idx[x],
            j: idx[y],
        })
    }

    fn improves(&self, mv: &Move) -> bool {
        mv.time_delta < 0
    }

    fn rank(&self, a: &Move, b: &Move) -> Ordering {
        by_time(a, b)
    }
}

/// Swap across routes, restricted to a sample of route pairs
pub struct SwapInterRoute {
    pub pair_samples: usize,
}

impl SwapInterRoute {
    /// Both routes can absorb the service-time change
    fn slack_allows(instance: &Instance, solution: &Solution, a: (usize, usize), i: usize, b: (usize, usize), j: usize) -> bool {
        let task_a = solution.route(a.0, a.1)[i];
        let task_b = solution.route(b.0, b.1)[j];
        evaluator::service_fits(instance, solution.route_slack(a.0, a.1), task_a, task_b)
            && evaluator::service_fits(instance, solution.route_slack(b.0, b.1), task_b, task_a)
    }
}

impl MoveFamily for SwapInterRoute {
    fn kind(&self) -> NeighborhoodKind {
        NeighborhoodKind::SwapInterRoute
    }

    fn discover(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Vec<Candidate> {
        let slots: Vec<((usize, usize), Vec<usize>)> = solution
            .plan
            .iter_routes()
            .map(|(d, c, r)| ((d, c), optional_indices(instance, r)))
            .filter(|(_, idx)| !idx.is_empty())
            .collect();

        let mut pairs = Vec::new();
        for x in 0..slots.len() {
            for y in x + 1..slots.len() {
                pairs.push((x, y));
            }
        }
        if pairs.len() > self.pair_samples {
            pairs = index::sample(rng, pairs.len(), self.pair_samples)
                .into_iter()
                .map(|k| pairs[k])
                .collect();
        }

        let mut candidates = Vec::new();
        for (x, y) in pairs {
            let (a, idx_a) = &slots[x];
            let (b, idx_b) = &slots[y];
            for &i in idx_a {
                for &j in idx_b {
                    if Self::slack_allows(instance, solution, *a, i, *b, j) {
                        candidates.push(Candidate::SwapInter { a: *a, i, b: *b, j });
                    }
                }
            }
        }
        candidates
    }

    fn sample(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Option<Candidate> {
        let slots: Vec<((usize, usize), Vec<usize>)> = solution
            .plan
            .iter_routes()
            .map(|(d, c, r)| ((d, c), optional_indices(instance, r)))
            .filter(|(_, idx)| !idx.is_empty())
            .collect();
        if slots.len() < 2 {
            return None;
        }
        let (x, y) = two_distinct(rng, slots.len());
        let (a, idx_a) = &slots[x];
        let (b, idx_b) = &slots[y];
        let i = *idx_a.choose(rng)?;
        let j = *idx_b.choose(rng)?;
        Self::slack_allows(instance, solution, *a, i, *b, j).then_some(Candidate::SwapInter {
            a: *a,
            i,
            b: *b,
            j,
        })
    }

    fn improves(&self, mv: &Move) -> bool {
        mv.time_delta < 0
    }

    fn rank(&self, a: &Move, b: &Move) -> Ordering {
        by_time(a, b)
    }
}

/// 2-opt inside runs of optional tasks; main tasks never move
pub struct TwoEdgeExchange;

impl MoveFamily for TwoEdgeExchange {
    fn kind(&self) -> NeighborhoodKind {
        NeighborhoodKind::TwoEdgeExchange
    }

    fn discover(&self, instance: &Instance, solution: &Solution, _rng: &mut ChaCha8Rng) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (day, cohort, route) in solution.plan.iter_routes() {
            for run in optional_runs(instance, route) {
                for i in run.clone() {
                    for j in i + 1..run.end {
                        candidates.push(Candidate::TwoOpt { day, cohort, i, j });
                    }
                }
            }
        }
        candidates
    }

    fn sample(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Option<Candidate> {
        let runs: Vec<(usize, usize, Range<usize>)> = solution
            .plan
            .iter_routes()
            .flat_map(|(d, c, r)| {
                optional_runs(instance, r)
                    .into_iter()
                    .map(move |run| (d, c, run))
            })
            .collect();
        let (day, cohort, run) = runs.choose(rng)?;
        let (x, y) = two_distinct(rng, run.len());
        Some(Candidate::TwoOpt {
            day: *day,
            cohort: *cohort,
            i: run.start + x,
            j: run.start + y,
        })
    }

    fn improves(&self, mv: &Move) -> bool {
        mv.time_delta < 0
    }

    fn rank(&self, a: &Move, b: &Move) -> Ordering {
        by_time(a, b)
    }
}

/// Insertion of unused tasks, ranked by profit.
///
/// A position is only tried when the segment it falls into has room for
/// the task's service time.
pub struct Insert {
    pub sample_limit: usize,
}

impl MoveFamily for Insert {
    fn kind(&self) -> NeighborhoodKind {
        NeighborhoodKind::Insert
    }

    fn discover(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Vec<Candidate> {
        let tasks = sample_unused(solution, self.sample_limit, rng);
        let mut candidates = Vec::new();
        for &task in &tasks {
            let service = instance.service_time(task);
            for (day, cohort, route) in solution.plan.iter_routes() {
                if solution.route_slack(day, cohort) < service {
                    continue;
                }
                for index in 0..=route.len() {
                    if feasibility::segment_slack_at(instance, route, index) < service {
                        continue;
                    }
                    candidates.push(Candidate::Insert {
                        day,
                        cohort,
                        index,
                        task,
                    });
                }
            }
        }
        candidates
    }

    fn sample(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Option<Candidate> {
        let unused: Vec<usize> = solution.unused.iter().copied().collect();
        let task = *unused.choose(rng)?;
        let service = instance.service_time(task);
        let slots: Vec<(usize, usize, usize)> = solution
            .plan
            .iter_routes()
            .filter(|&(d, c, _)| solution.route_slack(d, c) >= service)
            .map(|(d, c, r)| (d, c, r.len()))
            .collect();
        let &(day, cohort, len) = slots.choose(rng)?;
        let index = rng.gen_range(0..=len);
        (feasibility::segment_slack_at(instance, solution.route(day, cohort), index) >= service).then_some(
            Candidate::Insert {
                day,
                cohort,
                index,
                task,
            },
        )
    }

    fn improves(&self, mv: &Move) -> bool {
        mv.profit_delta > 0
    }

    fn rank(&self, a: &Move, b: &Move) -> Ordering {
        by_profit_then_time(a, b)
    }
}

/// Replacement of a scheduled task by an unused one.
///
/// With `profit_improving` the incoming task must be worth strictly more
/// (ReplaceProfit); otherwise at most as much, and the move is judged on
/// the time it frees (ReplaceDelta).
pub struct Replace {
    pub profit_improving: bool,
    pub sample_limit: usize,
}

impl Replace {
    #[inline]
    fn accepts(&self, instance: &Instance, outgoing: usize, incoming: usize) -> bool {
        let (p_in, p_out) = (instance.profit(incoming), instance.profit(outgoing));
        if self.profit_improving {
            p_in > p_out
        } else {
            p_in <= p_out
        }
    }
}

impl MoveFamily for Replace {
    fn kind(&self) -> NeighborhoodKind {
        if self.profit_improving {
            NeighborhoodKind::ReplaceProfit
        } else {
            NeighborhoodKind::ReplaceDelta
        }
    }

    fn discover(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Vec<Candidate> {
        let tasks = sample_unused(solution, self.sample_limit, rng);
        let mut candidates = Vec::new();
        for (day, cohort, route) in solution.plan.iter_routes() {
            let slack = solution.route_slack(day, cohort);
            for index in optional_indices(instance, route) {
                let outgoing = route[index];
                for &task in &tasks {
                    if self.accepts(instance, outgoing, task)
                        && evaluator::service_fits(instance, slack, outgoing, task)
                    {
                        candidates.push(Candidate::Replace {
                            day,
                            cohort,
                            index,
                            task,
                        });
                    }
                }
            }
        }
        candidates
    }

    fn sample(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Option<Candidate> {
        let slots: Vec<(usize, usize, Vec<usize>)> = solution
            .plan
            .iter_routes()
            .map(|(d, c, r)| (d, c, optional_indices(instance, r)))
            .filter(|(_, _, idx)| !idx.is_empty())
            .collect();
        let (day, cohort, idx) = slots.choose(rng)?;
        let index = *idx.choose(rng)?;
        let outgoing = solution.route(*day, *cohort)[index];
        let incoming: Vec<usize> = solution
            .unused
            .iter()
            .copied()
            .filter(|&t| self.accepts(instance, outgoing, t))
            .collect();
        let task = *incoming.choose(rng)?;
        Some(Candidate::Replace {
            day: *day,
            cohort: *cohort,
            index,
            task,
        })
    }

    fn improves(&self, mv: &Move) -> bool {
        if self.profit_improving {
            mv.profit_delta > 0
        } else {
            mv.time_delta < 0
        }
    }

    fn rank(&self, a: &Move, b: &Move) -> Ordering {
        if self.profit_improving {
            by_profit_then_time(a, b)
        } else {
            by_time(a, b)
        }
    }
}

/// A move family plus the discovery settings it runs with
pub struct Neighborhood {
    family: Box<dyn MoveFamily + Send + Sync>,
    discovery: DiscoveryMode,
    sample_attempts: usize,
}

impl Neighborhood {
    pub fn new(family: Box<dyn MoveFamily + Send + Sync>, settings: &NeighborhoodSettings) -> Self {
        Neighborhood {
            family,
            discovery: settings.discovery,
            sample_attempts: settings.sample_attempts,
        }
    }

    /// Neighborhood for a configured kind
    pub fn build(kind: NeighborhoodKind, settings: &NeighborhoodSettings) -> Self {
        let family: Box<dyn MoveFamily + Send + Sync> = match kind {
            NeighborhoodKind::SwapIntraRoute => Box::new(SwapIntraRoute),
            NeighborhoodKind::SwapInterRoute => Box::new(SwapInterRoute {
                pair_samples: settings.inter_route_pair_samples,
            }),
            NeighborhoodKind::TwoEdgeExchange => Box::new(TwoEdgeExchange),
            NeighborhoodKind::Insert => Box::new(Insert {
                sample_limit: settings.insert_sample_limit,
            }),
            NeighborhoodKind::ReplaceDelta => Box::new(Replace {
                profit_improving: false,
                sample_limit: settings.replace_sample_limit,
            }),
            NeighborhoodKind::ReplaceProfit => Box::new(Replace {
                profit_improving: true,
                sample_limit: settings.replace_sample_limit,
            }),
        };
        Neighborhood::new(family, settings)
    }

    /// Neighborhoods for a descent order
    pub fn build_all(kinds: &[NeighborhoodKind], settings: &NeighborhoodSettings) -> Vec<Neighborhood> {
        kinds.iter().map(|&k| Neighborhood::build(k, settings)).collect()
    }

    pub fn kind(&self) -> NeighborhoodKind {
        self.family.kind()
    }

    /// Candidates in shuffled order
    pub fn discover_moves(&self, instance: &Instance, solution: &Solution, rng: &mut ChaCha8Rng) -> Vec<Candidate> {
        let mut candidates = match self.discovery {
            DiscoveryMode::Exhaustive => self.family.discover(instance, solution, rng),
            DiscoveryMode::Sampled => (0..self.sample_attempts)
                .filter_map(|_| self.family.sample(instance, solution, rng))
                .collect(),
        };
        candidates.shuffle(rng);
        candidates
    }

    /// Evaluate candidates and keep the improving ones.
    ///
    /// First improvement stops at the first candidate that improves and is
    /// feasible, returning only that move.
    pub fn evaluate_moves(
        &self,
        instance: &Instance,
        solution: &Solution,
        candidates: &[Candidate],
        strategy: EvaluationStrategy,
    ) -> Vec<Move> {
        let kind = self.kind();
        let mut moves = Vec::new();
        for candidate in candidates {
            let Some(mv) = candidate.evaluate(kind, instance, solution) else {
                continue;
            };
            if !self.family.improves(&mv) {
                continue;
            }
            if strategy == EvaluationStrategy::FirstImprovement {
                if mv.is_feasible(instance) {
                    return vec![mv];
                }
                continue;
            }
            moves.push(mv);
        }
        match strategy {
            EvaluationStrategy::FirstImprovement => Vec::new(),
            EvaluationStrategy::BestImprovement => moves,
        }
    }

    /// First move in ranking order whose routes are all feasible
    pub fn select_best_feasible(&self, instance: &Instance, mut moves: Vec<Move>) -> Option<Move> {
        moves.sort_by(|a, b| self.family.rank(a, b));
        moves.into_iter().find(|mv| mv.is_feasible(instance))
    }

    /// Discover, evaluate and select in one go
    pub fn find_improving_move(
        &self,
        instance: &Instance,
        solution: &Solution,
        strategy: EvaluationStrategy,
        rng: &mut ChaCha8Rng,
    ) -> Option<Move> {
        self.find_improving_move_keeping_out(instance, solution, strategy, rng, &BTreeSet::new())
    }

    /// Same as [`Neighborhood::find_improving_move`], but replacements may
    /// not bring back any task of `dropped`
    pub fn find_improving_move_keeping_out(
        &self,
        instance: &Instance,
        solution: &Solution,
        strategy: EvaluationStrategy,
        rng: &mut ChaCha8Rng,
        dropped: &BTreeSet<usize>,
    ) -> Option<Move> {
        let mut candidates = self.discover_moves(instance, solution, rng);
        candidates.retain(|c| !c.restores(dropped));
        let moves = self.evaluate_moves(instance, solution, &candidates, strategy);
        self.select_best_feasible(instance, moves)
    }

    /// A random feasible move, improving or not, within `attempts` draws
    pub fn sample_one_random_move(
        &self,
        instance: &Instance,
        solution: &Solution,
        rng: &mut ChaCha8Rng,
        attempts: usize,
    ) -> Option<Move> {
        let kind = self.kind();
        (0..attempts).find_map(|_| {
            self.family
                .sample(instance, solution, rng)
                .and_then(|c| c.evaluate(kind, instance, solution))
                .filter(|mv| mv.is_feasible(instance))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Attractiveness, ConstructionParams};
    use crate::heuristics::allocation::Allocation;
    use crate::heuristics::construction::{ConstructionHeuristic, GreedyConstruction};
    use crate::instance::Task;
    use crate::solution::RoutePlan;
    use crate::test_support::{matrix_instance, random_instance};
    use proptest::prelude::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    /// Depot plus two candidates: A (profit 50, close) and B (profit 80, far)
    fn two_candidates(service_b: i64) -> Instance {
        matrix_instance(
            vec![
                Task::optional("a", 10, 50, 0.0, 0.0),
                Task::optional("b", service_b, 80, 0.0, 0.0),
            ],
            vec![vec![0, 10, 30], vec![10, 0, 25], vec![30, 25, 0]],
            1,
            1,
            100,
        )
    }

    fn empty_solution(instance: &Instance) -> Solution {
        Solution::from_plan(
            instance,
            RoutePlan::empty(instance.days, instance.cohort_no),
            "test",
        )
    }

    /// depot=0, a@10, b@20, c@30, d@40 on a line
    fn line() -> Instance {
        let coords = [0i64, 10, 20, 30, 40];
        let matrix = coords
            .iter()
            .map(|a| coords.iter().map(|b| (a - b).abs()).collect())
            .collect();
        matrix_instance(
            vec![
                Task::optional("a", 5, 10, 0.0, 0.0),
                Task::optional("b", 5, 20, 0.0, 0.0),
                Task::optional("c", 5, 30, 0.0, 0.0),
                Task::optional("d", 15, 40, 0.0, 0.0),
            ],
            matrix,
            1,
            2,
            200,
        )
    }

    #[test]
    fn test_insert_prefers_higher_profit() {
        let instance = two_candidates(20);
        let solution = empty_solution(&instance);
        let insert = Neighborhood::build(NeighborhoodKind::Insert, &NeighborhoodSettings::default());

        let mv = insert
            .find_improving_move(&instance, &solution, EvaluationStrategy::BestImprovement, &mut rng())
            .unwrap();
        // b costs 80 extra seconds against 30 for a, but is worth more
        assert_eq!(mv.profit_delta, 80);
        assert_eq!(mv.time_delta, 80);
        assert_eq!(mv.changes[0].route, vec![2]);
    }

    #[test]
    fn test_insert_falls_back_when_best_is_infeasible() {
        // slack 100 covers b's service of 60, but 30 + 60 + 30 does not fit
        let instance = two_candidates(60);
        let solution = empty_solution(&instance);
        let insert = Neighborhood::build(NeighborhoodKind::Insert, &NeighborhoodSettings::default());

        for strategy in [EvaluationStrategy::BestImprovement, EvaluationStrategy::FirstImprovement] {
            let mv = insert
                .find_improving_move(&instance, &solution, strategy, &mut rng())
                .unwrap();
            assert_eq!(mv.profit_delta, 50);
            assert_eq!(mv.changes[0].route, vec![1]);
        }
    }

    #[test]
    fn test_insert_skips_routes_without_slack() {
        let instance = two_candidates(20);
        let plan = RoutePlan::from_routes(vec![vec![vec![1]]]);
        let solution = Solution::from_plan(&instance, plan, "test");
        // slack is 100 - 30 = 70 >= 20, so b can still be tried at both ends
        let candidates = Insert { sample_limit: 250 }.discover(&instance, &solution, &mut rng());
        assert_eq!(candidates.len(), 2);

        let full = two_candidates(75);
        let solution = Solution::from_plan(&full, RoutePlan::from_routes(vec![vec![vec![1]]]), "test");
        assert!(Insert { sample_limit: 250 }
            .discover(&full, &solution, &mut rng())
            .is_empty());
    }

    #[test]
    fn test_insert_checks_the_segment_not_the_route() {
        // a then m (start 50): 30s of room before m, 120s after
        let instance = matrix_instance(
            vec![
                Task::main("m", 0, 50, 10, 0.0, 0.0),
                Task::optional("a", 10, 7, 0.0, 0.0),
                Task::optional("b", 40, 3, 0.0, 0.0),
            ],
            vec![vec![0, 20, 5, 5], vec![20, 0, 5, 5], vec![5, 5, 0, 5], vec![5, 5, 5, 0]],
            1,
            1,
            200,
        );
        let plan = RoutePlan::from_routes(vec![vec![vec![2, 1]]]);
        let solution = Solution::from_plan(&instance, plan, "test");
        assert_eq!(solution.route_slack(0, 0), 150);

        let candidates = Insert { sample_limit: 250 }.discover(&instance, &solution, &mut rng());
        assert_eq!(
            candidates,
            vec![Candidate::Insert {
                day: 0,
                cohort: 0,
                index: 2,
                task: 3
            }]
        );
    }

    #[test]
    fn test_swap_intra_finds_shorter_order() {
        let instance = line();
        let plan = RoutePlan::from_routes(vec![vec![vec![2, 1, 3], vec![]]]);
        let solution = Solution::from_plan(&instance, plan, "test");
        let swap = Neighborhood::build(NeighborhoodKind::SwapIntraRoute, &NeighborhoodSettings::default());

        let mv = swap
            .find_improving_move(&instance, &solution, EvaluationStrategy::BestImprovement, &mut rng())
            .unwrap();
        assert_eq!(mv.time_delta, -20);

        let next = mv.apply(&instance, &solution);
        assert_eq!(next.route_slack(0, 0), solution.route_slack(0, 0) + 20);
        assert_eq!(next.total_profit, solution.total_profit);
    }

    #[test]
    fn test_converged_route_has_no_move() {
        let instance = line();
        let plan = RoutePlan::from_routes(vec![vec![vec![1, 2, 3], vec![]]]);
        let solution = Solution::from_plan(&instance, plan, "test");

        for kind in [NeighborhoodKind::SwapIntraRoute, NeighborhoodKind::TwoEdgeExchange] {
            let neighborhood = Neighborhood::build(kind, &NeighborhoodSettings::default());
            for strategy in [EvaluationStrategy::BestImprovement, EvaluationStrategy::FirstImprovement] {
                assert!(neighborhood
                    .find_improving_move(&instance, &solution, strategy, &mut rng())
                    .is_none());
            }
        }
    }

    #[test]
    fn test_replace_profit_ordering() {
        let instance = line();
        // b (profit 20) scheduled; a (10), c (30), d (40) unused
        let plan = RoutePlan::from_routes(vec![vec![vec![2], vec![]]]);
        let solution = Solution::from_plan(&instance, plan, "test");

        let incoming = |family: &Replace| -> Vec<usize> {
            let mut tasks: Vec<usize> = family
                .discover(&instance, &solution, &mut rng())
                .into_iter()
                .map(|c| match c {
                    Candidate::Replace { task, .. } => task,
                    other => panic!("unexpected candidate {other:?}"),
                })
                .collect();
            tasks.sort();
            tasks
        };

        let profit = Replace {
            profit_improving: true,
            sample_limit: 100,
        };
        let delta = Replace {
            profit_improving: false,
            sample_limit: 100,
        };
        assert_eq!(incoming(&profit), vec![3, 4]);
        assert_eq!(incoming(&delta), vec![1]);

        let mv = Neighborhood::build(NeighborhoodKind::ReplaceProfit, &NeighborhoodSettings::default())
            .find_improving_move(&instance, &solution, EvaluationStrategy::BestImprovement, &mut rng())
            .unwrap();
        assert_eq!(mv.profit_delta, 20);
        assert_eq!(mv.changes[0].route, vec![4]);

        // a is closer than b: same profit ordering, less time
        let mv = Neighborhood::build(NeighborhoodKind::ReplaceDelta, &NeighborhoodSettings::default())
            .find_improving_move(&instance, &solution, EvaluationStrategy::BestImprovement, &mut rng())
            .unwrap();
        assert_eq!(mv.time_delta, -20);
        assert_eq!(mv.profit_delta, -10);
    }

    #[test]
    fn test_swap_inter_prunes_on_slack() {
        let instance = line();
        // cohort 0 holds d, cohort 1 holds a with almost no slack left
        let plan = RoutePlan::from_routes(vec![vec![vec![4], vec![1]]]);
        let solution = Solution::from_plan(&instance, plan, "test");
        let family = SwapInterRoute { pair_samples: 16 };
        assert_eq!(family.discover(&instance, &solution, &mut rng()).len(), 1);

        let tight = matrix_instance(
            vec![
                Task::optional("a", 5, 10, 0.0, 0.0),
                Task::optional("d", 40, 40, 0.0, 0.0),
            ],
            vec![vec![0, 10, 5], vec![10, 0, 10], vec![5, 10, 0]],
            1,
            2,
            50,
        );
        // a's route has 50 - 25 = 25 slack, too little for d's extra 35
        let plan = RoutePlan::from_routes(vec![vec![vec![1], vec![2]]]);
        let solution = Solution::from_plan(&tight, plan, "test");
        assert!(family.discover(&tight, &solution, &mut rng()).is_empty());
        assert!(family.sample(&tight, &solution, &mut rng()).is_none());
    }

    #[test]
    fn test_two_opt_never_moves_main_tasks() {
        let instance = random_instance(21, 30, 4, 1, 2);
        let allocation = Allocation::from_task_days(&instance).unwrap();
        let params = ConstructionParams::new(Attractiveness::Base, 1.0, 1.0);
        let solution = GreedyConstruction::new(params, allocation, 50)
            .construct(&instance)
            .unwrap();

        let candidates = TwoEdgeExchange.discover(&instance, &solution, &mut rng());
        for candidate in candidates {
            let Candidate::TwoOpt { day, cohort, i, j } = candidate else {
                panic!("unexpected candidate {candidate:?}");
            };
            let route = solution.route(day, cohort);
            assert!(i < j);
            assert!(route[i..=j].iter().all(|&p| instance.is_optional(p)));
        }
    }

    #[test]
    fn test_optional_runs() {
        let instance = random_instance(1, 6, 2, 1, 1);
        // positions 1 and 2 are main tasks
        assert_eq!(optional_runs(&instance, &[3, 4, 1, 5, 2, 6, 7, 8]), vec![0..2, 5..8]);
        assert!(optional_runs(&instance, &[3, 1, 4]).is_empty());
    }

    #[test]
    fn test_sampling_on_empty_plan() {
        let instance = line();
        let solution = empty_solution(&instance);
        let settings = NeighborhoodSettings::default();
        let mut rng = rng();

        for kind in [
            NeighborhoodKind::SwapIntraRoute,
            NeighborhoodKind::SwapInterRoute,
            NeighborhoodKind::TwoEdgeExchange,
            NeighborhoodKind::ReplaceDelta,
            NeighborhoodKind::ReplaceProfit,
        ] {
            let neighborhood = Neighborhood::build(kind, &settings);
            assert!(neighborhood
                .sample_one_random_move(&instance, &solution, &mut rng, 10)
                .is_none());
        }
        let insert = Neighborhood::build(NeighborhoodKind::Insert, &settings);
        let mv = insert
            .sample_one_random_move(&instance, &solution, &mut rng, 10)
            .unwrap();
        assert!(mv.is_feasible(&instance));
    }

    #[test]
    fn test_sampled_discovery_is_bounded() {
        let instance = random_instance(4, 30, 0, 1, 2);
        let solution = empty_solution(&instance);
        let settings = NeighborhoodSettings {
            discovery: DiscoveryMode::Sampled,
            sample_attempts: 12,
            ..NeighborhoodSettings::default()
        };
        let insert = Neighborhood::build(NeighborhoodKind::Insert, &settings);
        let candidates = insert.discover_moves(&instance, &solution, &mut rng());
        assert_eq!(candidates.len(), 12);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_random_moves_keep_plan_consistent(seed in any::<u64>()) {
            let instance = random_instance(seed, 25, 0, 2, 2);
            let params = ConstructionParams::new(Attractiveness::Base, 1.0, 1.0);
            let mut solution = GreedyConstruction::new(params, Allocation::empty(&instance), 50)
                .construct(&instance)
                .unwrap();
            let neighborhoods = Neighborhood::build_all(&NeighborhoodKind::ALL, &NeighborhoodSettings::default());
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            for _ in 0..30 {
                let neighborhood = neighborhoods.choose(&mut rng).unwrap();
                if let Some(mv) = neighborhood.sample_one_random_move(&instance, &solution, &mut rng, 10) {
                    solution = mv.apply(&instance, &solution);
                }
                prop_assert!(solution.feasible);
                let violations = solution.validate(&instance, true);
                prop_assert!(violations.is_empty(), "{:?}", violations);
            }
        }
    }
}
