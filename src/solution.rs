//! Route plans, evaluated solutions and the solution pool.
//!
//! A [`Solution`] is evaluated once, when it is built from a [`RoutePlan`],
//! and never mutated afterwards: moves and perturbations produce a modified
//! copy of the plan and a fresh solution.

use crate::evaluator;
use crate::feasibility;
use crate::instance::Instance;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Day -> cohort -> ordered task positions (depot implicit at both ends)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutePlan {
    routes: Vec<Vec<Vec<usize>>>,
}

/// Replacement of one route, the unit every move is expressed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteChange {
    pub day: usize,
    pub cohort: usize,
    pub route: Vec<usize>,
}

impl RoutePlan {
    /// `days` x `cohort_no` empty routes
    pub fn empty(days: usize, cohort_no: usize) -> Self {
        RoutePlan {
            routes: vec![vec![Vec::new(); cohort_no]; days],
        }
    }

    pub fn from_routes(routes: Vec<Vec<Vec<usize>>>) -> Self {
        RoutePlan { routes }
    }

    pub fn days(&self) -> usize {
        self.routes.len()
    }

    pub fn cohorts(&self) -> usize {
        self.routes.first().map(|d| d.len()).unwrap_or(0)
    }

    #[inline]
    pub fn route(&self, day: usize, cohort: usize) -> &[usize] {
        &self.routes[day][cohort]
    }

    pub fn set_route(&mut self, day: usize, cohort: usize, route: Vec<usize>) {
        self.routes[day][cohort] = route;
    }

    /// Copy of the plan with the given routes substituted
    pub fn with_changes(&self, changes: &[RouteChange]) -> RoutePlan {
        let mut plan = self.clone();
        for change in changes {
            plan.routes[change.day][change.cohort] = change.route.clone();
        }
        plan
    }

    /// All `(day, cohort, route)` triples in day-major order
    pub fn iter_routes(&self) -> impl Iterator<Item = (usize, usize, &[usize])> {
        self.routes.iter().enumerate().flat_map(|(day, cohorts)| {
            cohorts
                .iter()
                .enumerate()
                .map(move |(cohort, route)| (day, cohort, route.as_slice()))
        })
    }

    /// Every `(day, cohort)` slot
    pub fn slots(&self) -> Vec<(usize, usize)> {
        self.iter_routes().map(|(d, c, _)| (d, c)).collect()
    }

    /// Every scheduled position, main tasks included
    pub fn scheduled_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.routes.iter().flatten().flatten().copied()
    }

    pub fn routes(&self) -> &[Vec<Vec<usize>>] {
        &self.routes
    }
}

/// An evaluated route plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub plan: RoutePlan,
    /// Profit over all scheduled optional tasks
    pub total_profit: i64,
    /// Slack per (day, cohort)
    pub slack: Vec<Vec<i64>>,
    /// Whether every route passes the feasibility check
    pub feasible: bool,
    /// Optional tasks not scheduled anywhere
    pub unused: BTreeSet<usize>,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Solution {
    /// Evaluate a plan
    pub fn from_plan(instance: &Instance, plan: RoutePlan, algorithm: &str) -> Self {
        let evaluation = evaluator::evaluate(instance, &plan);

        Solution {
            plan,
            total_profit: evaluation.total_profit,
            slack: evaluation.slack,
            feasible: evaluation.feasible,
            unused: evaluation.unused,
            algorithm: algorithm.to_string(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// New solution with `changes` applied to a copy of this plan
    pub fn with_changes(&self, instance: &Instance, changes: &[RouteChange]) -> Self {
        let mut next = Solution::from_plan(instance, self.plan.with_changes(changes), &self.algorithm);
        next.computation_time = self.computation_time;
        next
    }

    #[inline]
    pub fn route(&self, day: usize, cohort: usize) -> &[usize] {
        self.plan.route(day, cohort)
    }

    #[inline]
    pub fn route_slack(&self, day: usize, cohort: usize) -> i64 {
        self.slack[day][cohort]
    }

    /// Waiting time summed over all routes
    pub fn total_slack(&self) -> i64 {
        self.slack.iter().flatten().sum()
    }

    /// Number of scheduled optional tasks
    pub fn scheduled_optional(&self, instance: &Instance) -> usize {
        self.plan
            .scheduled_positions()
            .filter(|&p| instance.is_optional(p))
            .count()
    }

    /// Check every structural invariant and return the violations found.
    ///
    /// With `require_main_tasks` each main task must appear exactly once on
    /// its mandated day; otherwise main tasks may be absent.
    pub fn validate(&self, instance: &Instance, require_main_tasks: bool) -> Vec<String> {
        let mut violations = Vec::new();
        let mut seen: HashMap<usize, (usize, usize)> = HashMap::new();

        if self.plan.days() != instance.days || self.plan.cohorts() != instance.cohort_no {
            violations.push(format!(
                "plan is {}x{} but the instance has {} days and {} cohorts",
                self.plan.days(),
                self.plan.cohorts(),
                instance.days,
                instance.cohort_no
            ));
        }

        for (day, cohort, route) in self.plan.iter_routes() {
            for &pos in route {
                if pos == 0 || pos >= instance.len() {
                    violations.push(format!("day {day} cohort {cohort}: invalid position {pos}"));
                    continue;
                }
                if let Some((d, c)) = seen.insert(pos, (day, cohort)) {
                    violations.push(format!(
                        "task {} scheduled twice (day {d} cohort {c} and day {day} cohort {cohort})",
                        instance.task(pos).id
                    ));
                }
                let task = instance.task(pos);
                if task.is_main() {
                    if let Some(mandated) = task.day {
                        if mandated != day {
                            violations.push(format!(
                                "main task {} is on day {day}, mandated day {mandated}",
                                task.id
                            ));
                        }
                    }
                }
            }
            if !feasibility::is_feasible(instance, route) {
                violations.push(format!("day {day} cohort {cohort}: route is infeasible"));
            }
        }

        if require_main_tasks {
            for main in instance.main_positions() {
                if !seen.contains_key(&main) {
                    violations.push(format!("main task {} is not scheduled", instance.task(main).id));
                }
            }
        }

        let recomputed: i64 = seen
            .keys()
            .filter(|&&p| p < instance.len() && instance.is_optional(p))
            .map(|&p| instance.profit(p) as i64)
            .sum();
        if recomputed != self.total_profit {
            violations.push(format!(
                "cached profit {} differs from recomputed {}",
                self.total_profit, recomputed
            ));
        }

        violations
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Profit: {}", self.total_profit)?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Unused tasks: {}", self.unused.len())?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        for (day, cohort, route) in self.plan.iter_routes() {
            writeln!(
                f,
                "  Day {} cohort {}: {:?} (slack {}s)",
                day, cohort, route, self.slack[day][cohort]
            )?;
        }
        Ok(())
    }
}

/// Append-only store of every accepted solution
#[derive(Debug, Clone, Default)]
pub struct SolutionPool {
    solutions: Vec<Solution>,
}

impl SolutionPool {
    pub fn new() -> Self {
        SolutionPool {
            solutions: Vec::new(),
        }
    }

    pub fn push(&mut self, solution: Solution) {
        self.solutions.push(solution);
    }

    /// Highest total profit; on ties the earliest inserted wins
    pub fn best(&self) -> Option<&Solution> {
        let mut best: Option<&Solution> = None;
        for solution in &self.solutions {
            match best {
                Some(b) if solution.total_profit <= b.total_profit => {}
                _ => best = Some(solution),
            }
        }
        best
    }

    /// Like [`best`](Self::best), among feasible solutions only
    pub fn best_feasible(&self) -> Option<&Solution> {
        let mut best: Option<&Solution> = None;
        for solution in self.solutions.iter().filter(|s| s.feasible) {
            match best {
                Some(b) if solution.total_profit <= b.total_profit => {}
                _ => best = Some(solution),
            }
        }
        best
    }

    pub fn best_profit(&self) -> Option<i64> {
        self.best().map(|s| s.total_profit)
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Solution> {
        self.solutions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Task;
    use crate::test_support::matrix_instance;

    fn three_tasks() -> Instance {
        matrix_instance(
            vec![
                Task::optional("a", 10, 5, 0.0, 0.0),
                Task::optional("b", 10, 7, 0.0, 0.0),
                Task::optional("c", 10, 11, 0.0, 0.0),
            ],
            vec![
                vec![0, 10, 10, 10],
                vec![10, 0, 5, 5],
                vec![10, 5, 0, 5],
                vec![10, 5, 5, 0],
            ],
            1,
            2,
            100,
        )
    }

    #[test]
    fn test_solution_evaluation() {
        let instance = three_tasks();
        let mut plan = RoutePlan::empty(1, 2);
        plan.set_route(0, 0, vec![1, 2]);

        let solution = Solution::from_plan(&instance, plan, "test");
        assert_eq!(solution.total_profit, 12);
        assert_eq!(solution.unused.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(solution.route_slack(0, 0), 100 - 45);
        assert_eq!(solution.route_slack(0, 1), 100);
        assert!(solution.feasible);
        assert!(solution.validate(&instance, true).is_empty());
    }

    #[test]
    fn test_with_changes_copies_plan() {
        let instance = three_tasks();
        let mut plan = RoutePlan::empty(1, 2);
        plan.set_route(0, 0, vec![1, 2]);
        let solution = Solution::from_plan(&instance, plan, "test");

        let next = solution.with_changes(
            &instance,
            &[RouteChange {
                day: 0,
                cohort: 1,
                route: vec![3],
            }],
        );
        assert_eq!(solution.route(0, 1), &[] as &[usize]);
        assert_eq!(next.route(0, 1), &[3]);
        assert_eq!(next.total_profit, 23);
        assert!(next.unused.is_empty());
    }

    #[test]
    fn test_validate_reports_double_booking() {
        let instance = three_tasks();
        let plan = RoutePlan::from_routes(vec![vec![vec![1, 2], vec![2]]]);
        let solution = Solution::from_plan(&instance, plan, "test");

        let violations = solution.validate(&instance, true);
        assert!(violations.iter().any(|v| v.contains("scheduled twice")));
    }

    #[test]
    fn test_pool_best_prefers_first_on_ties() {
        let instance = three_tasks();
        let mut pool = SolutionPool::new();
        assert!(pool.best().is_none());

        let first = Solution::from_plan(&instance, RoutePlan::from_routes(vec![vec![vec![3], vec![]]]), "first");
        let second = Solution::from_plan(&instance, RoutePlan::from_routes(vec![vec![vec![], vec![3]]]), "second");
        let worse = Solution::from_plan(&instance, RoutePlan::from_routes(vec![vec![vec![1], vec![]]]), "worse");
        pool.push(worse);
        pool.push(first);
        pool.push(second);

        assert_eq!(pool.len(), 3);
        assert_eq!(pool.best().unwrap().algorithm, "first");
        assert_eq!(pool.best_profit(), Some(11));
    }
}
