//! Aggregate evaluation of a plan and per-move deltas.
//!
//! Time deltas are `old_slack - new_slack` over the touched routes: the extra
//! time a move consumes. Negative means the move frees time. Every function
//! here reads the instance and the routes it is given and returns freshly
//! owned routes; nothing is mutated in place.

use crate::feasibility;
use crate::instance::Instance;
use crate::solution::RoutePlan;
use std::collections::BTreeSet;

/// Metrics derived from a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub total_profit: i64,
    pub slack: Vec<Vec<i64>>,
    pub feasible: bool,
    pub unused: BTreeSet<usize>,
}

pub fn evaluate(instance: &Instance, plan: &RoutePlan) -> Evaluation {
    let mut slack = vec![vec![0i64; plan.cohorts()]; plan.days()];
    let mut feasible = true;
    for (day, cohort, route) in plan.iter_routes() {
        let timing = feasibility::simulate(instance, route);
        slack[day][cohort] = timing.slack;
        feasible &= timing.feasible;
    }

    let mut unused: BTreeSet<usize> = instance.optional_positions().into_iter().collect();
    for pos in plan.scheduled_positions() {
        unused.remove(&pos);
    }

    Evaluation {
        total_profit: total_profit(instance, plan),
        slack,
        feasible,
        unused,
    }
}

/// Profit of every scheduled optional task
pub fn total_profit(instance: &Instance, plan: &RoutePlan) -> i64 {
    plan.scheduled_positions()
        .filter(|&p| instance.is_optional(p))
        .map(|p| instance.profit(p) as i64)
        .sum()
}

/// Exchange positions `i` and `j` of one route.
pub fn swap_intra_delta(
    instance: &Instance,
    route: &[usize],
    old_slack: i64,
    i: usize,
    j: usize,
) -> (Vec<usize>, i64) {
    let mut new_route = route.to_vec();
    new_route.swap(i, j);
    let new_slack = feasibility::route_slack(instance, &new_route);
    (new_route, old_slack - new_slack)
}

/// Exchange `route_a[i]` with `route_b[j]`; both routes are re-simulated.
pub fn swap_inter_delta(
    instance: &Instance,
    route_a: &[usize],
    slack_a: i64,
    i: usize,
    route_b: &[usize],
    slack_b: i64,
    j: usize,
) -> (Vec<usize>, Vec<usize>, i64) {
    let mut new_a = route_a.to_vec();
    let mut new_b = route_b.to_vec();
    std::mem::swap(&mut new_a[i], &mut new_b[j]);
    let delta = (slack_a - feasibility::route_slack(instance, &new_a))
        + (slack_b - feasibility::route_slack(instance, &new_b));
    (new_a, new_b, delta)
}

/// Reverse `route[i..=j]`.
pub fn two_opt_delta(
    instance: &Instance,
    route: &[usize],
    old_slack: i64,
    i: usize,
    j: usize,
) -> (Vec<usize>, i64) {
    let mut new_route = route.to_vec();
    new_route[i..=j].reverse();
    let new_slack = feasibility::route_slack(instance, &new_route);
    (new_route, old_slack - new_slack)
}

#[inline]
fn neighbours_at(route: &[usize], index: usize) -> (usize, usize) {
    let prev = if index == 0 { 0 } else { route[index - 1] };
    let next = route.get(index).copied().unwrap_or(0);
    (prev, next)
}

/// Extra time consumed by inserting `task` before `route[index]`
/// (`index == route.len()` appends).
///
/// Only the segment receiving the task changes, so this is the detour plus
/// the service time and needs no simulation.
pub fn insert_extra_time(instance: &Instance, route: &[usize], index: usize, task: usize) -> i64 {
    let (prev, next) = neighbours_at(route, index);
    instance.distance(prev, task) + instance.service_time(task) + instance.distance(task, next)
        - instance.distance(prev, next)
}

/// Route with `task` inserted at `index`
pub fn insert_route(route: &[usize], index: usize, task: usize) -> Vec<usize> {
    let mut new_route = Vec::with_capacity(route.len() + 1);
    new_route.extend_from_slice(&route[..index]);
    new_route.push(task);
    new_route.extend_from_slice(&route[index..]);
    new_route
}

/// Result of replacing one scheduled task with an unused one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceDelta {
    pub route: Vec<usize>,
    /// `profit(incoming) - profit(outgoing)`
    pub profit_delta: i64,
    pub time_delta: i64,
}

/// Replace `route[index]` with `incoming`.
///
/// Returns `None` without simulating when the route's slack cannot absorb
/// the service-time difference.
pub fn replace_delta(
    instance: &Instance,
    route: &[usize],
    old_slack: i64,
    index: usize,
    incoming: usize,
) -> Option<ReplaceDelta> {
    let outgoing = route[index];
    if !service_fits(instance, old_slack, outgoing, incoming) {
        return None;
    }
    let mut new_route = route.to_vec();
    new_route[index] = incoming;
    let new_slack = feasibility::route_slack(instance, &new_route);

    Some(ReplaceDelta {
        route: new_route,
        profit_delta: instance.profit(incoming) as i64 - instance.profit(outgoing) as i64,
        time_delta: old_slack - new_slack,
    })
}

/// Cheap necessary condition for swapping `outgoing` for `incoming` in a
/// route with `slack`: the slack covers the growth in service time.
#[inline]
pub fn service_fits(instance: &Instance, slack: i64, outgoing: usize, incoming: usize) -> bool {
    slack >= instance.service_time(incoming) - instance.service_time(outgoing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feasibility::route_slack;
    use crate::instance::Task;
    use crate::test_support::{matrix_instance, random_instance};

    /// Four optional tasks on a line: depot=0, 1@10, 2@20, 3@30, 4@40
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
    fn test_evaluate_is_idempotent() {
        let instance = random_instance(3, 15, 2, 2, 2);
        let plan = RoutePlan::from_routes(vec![vec![vec![3, 4], vec![5]], vec![vec![6, 7, 8], vec![]]]);

        let first = evaluate(&instance, &plan);
        let second = evaluate(&instance, &plan);
        assert_eq!(first, second);
    }

    #[test]
    fn test_swap_intra_delta_and_inverse() {
        let instance = line();
        let route = vec![2, 1, 3];
        let slack = route_slack(&instance, &route);

        let (swapped, delta) = swap_intra_delta(&instance, &route, slack, 0, 1);
        assert_eq!(swapped, vec![1, 2, 3]);
        // 20+10+20+30 = 80 travel before, 10+10+10+30 = 60 after
        assert_eq!(delta, -20);

        let swapped_slack = route_slack(&instance, &swapped);
        let (back, back_delta) = swap_intra_delta(&instance, &swapped, swapped_slack, 0, 1);
        assert_eq!(back, route);
        assert_eq!(route_slack(&instance, &back), slack);
        assert_eq!(back_delta, 20);
    }

    #[test]
    fn test_two_opt_delta() {
        let instance = line();
        let route = vec![3, 2, 1];
        let slack = route_slack(&instance, &route);

        let (reversed, delta) = two_opt_delta(&instance, &route, slack, 0, 2);
        assert_eq!(reversed, vec![1, 2, 3]);
        assert_eq!(delta, 0);

        let route = vec![1, 3, 2, 4];
        let slack = route_slack(&instance, &route);
        let (reversed, delta) = two_opt_delta(&instance, &route, slack, 1, 2);
        assert_eq!(reversed, vec![1, 2, 3, 4]);
        assert_eq!(delta, -20);
    }

    #[test]
    fn test_swap_inter_delta() {
        let instance = line();
        let a = vec![1, 4];
        let b = vec![3];
        let (sa, sb) = (route_slack(&instance, &a), route_slack(&instance, &b));

        let (new_a, new_b, delta) = swap_inter_delta(&instance, &a, sa, 1, &b, sb, 0);
        assert_eq!(new_a, vec![1, 3]);
        assert_eq!(new_b, vec![4]);
        let expected = (sa + sb) - (route_slack(&instance, &new_a) + route_slack(&instance, &new_b));
        assert_eq!(delta, expected);
    }

    #[test]
    fn test_insert_extra_time_matches_simulation() {
        let instance = random_instance(11, 12, 3, 1, 1);
        let route = vec![1, 5, 7];
        let slack = route_slack(&instance, &route);

        for index in 0..=route.len() {
            for task in [9usize, 10, 12] {
                let new_route = insert_route(&route, index, task);
                let expected = slack - route_slack(&instance, &new_route);
                assert_eq!(insert_extra_time(&instance, &route, index, task), expected);
            }
        }
    }

    #[test]
    fn test_replace_delta_prefilter() {
        let instance = line();
        // route [1]: 10 + 5 + 10 = 25 -> slack 175
        let route = vec![1];
        let slack = route_slack(&instance, &route);

        let replaced = replace_delta(&instance, &route, slack, 0, 4).unwrap();
        assert_eq!(replaced.route, vec![4]);
        assert_eq!(replaced.profit_delta, 30);
        assert_eq!(replaced.time_delta, (40 + 15 + 40) - 25);

        // no slack left to absorb the longer service
        assert!(replace_delta(&instance, &route, 5, 0, 4).is_none());
    }
}
