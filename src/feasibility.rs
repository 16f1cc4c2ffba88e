//! Route feasibility and timing.
//!
//! A route is the ordered list of task positions one cohort visits on one
//! day; the depot is implicit at both ends. The route splits into segments,
//! each ending at a main task (deadline: its fixed start time) or, for the
//! last one, back at the depot (deadline: the route budget). After a main
//! task the clock restarts at `start_time + service_time`.

use crate::instance::Instance;

/// Outcome of simulating a single route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTiming {
    /// Every segment reached its deadline in time
    pub feasible: bool,
    /// Sum over segments of `deadline - arrival`; negative parts mark violations
    pub slack: i64,
    /// Time at which the cohort is back at the depot
    pub end_time: i64,
}

/// Simulate `route` and report its slack, feasible or not.
///
/// Deadlines are fixed, so the difference of two slacks for the same set of
/// main tasks is exactly the difference in travel plus service time.
pub fn simulate(instance: &Instance, route: &[usize]) -> RouteTiming {
    let mut elapsed = 0i64;
    let mut prev = 0usize;
    let mut slack = 0i64;
    let mut feasible = true;

    for &pos in route {
        let task = instance.task(pos);
        let arrival = elapsed + instance.distance(prev, pos);
        if task.is_main() {
            let gap = task.start_time - arrival;
            if gap < 0 {
                feasible = false;
            }
            slack += gap;
            elapsed = task.start_time + task.service_time;
        } else {
            elapsed = arrival + task.service_time;
        }
        prev = pos;
    }

    let end_time = elapsed + instance.distance(prev, 0);
    let gap = instance.max_route_duration - end_time;
    if gap < 0 {
        feasible = false;
    }
    slack += gap;

    RouteTiming {
        feasible,
        slack,
        end_time,
    }
}

/// Check a route against main-task start times and the route budget.
///
/// Stops at the first violated segment.
pub fn is_feasible(instance: &Instance, route: &[usize]) -> bool {
    let mut elapsed = 0i64;
    let mut prev = 0usize;

    for &pos in route {
        let task = instance.task(pos);
        elapsed += instance.distance(prev, pos);
        if task.is_main() {
            if elapsed > task.start_time {
                return false;
            }
            elapsed = task.start_time + task.service_time;
        } else {
            elapsed += task.service_time;
        }
        prev = pos;
    }

    elapsed + instance.distance(prev, 0) <= instance.max_route_duration
}

/// Timing of one stop of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub position: usize,
    pub arrival: i64,
    /// Service start: the fixed start time for a main task, arrival otherwise
    pub start: i64,
    pub departure: i64,
}

/// Per-stop timeline of a route, depot excluded
pub fn schedule(instance: &Instance, route: &[usize]) -> Vec<Visit> {
    let mut visits = Vec::with_capacity(route.len());
    let mut elapsed = 0i64;
    let mut prev = 0usize;

    for &pos in route {
        let task = instance.task(pos);
        let arrival = elapsed + instance.distance(prev, pos);
        let start = if task.is_main() { task.start_time } else { arrival };
        elapsed = start + task.service_time;
        visits.push(Visit {
            position: pos,
            arrival,
            start,
            departure: elapsed,
        });
        prev = pos;
    }
    visits
}

/// Slack of a route (see [`simulate`])
#[inline]
pub fn route_slack(instance: &Instance, route: &[usize]) -> i64 {
    simulate(instance, route).slack
}

/// Room left in the segment a task inserted at `index` would fall into.
///
/// `index` is the insertion index in `route` (0..=len). Returns the gap
/// between the segment's arrival and its deadline before the insertion.
pub fn segment_slack_at(instance: &Instance, route: &[usize], index: usize) -> i64 {
    let mut elapsed = 0i64;
    let mut prev = 0usize;

    for (i, &pos) in route.iter().enumerate() {
        let task = instance.task(pos);
        elapsed += instance.distance(prev, pos);
        if task.is_main() {
            if i >= index {
                return task.start_time - elapsed;
            }
            elapsed = task.start_time + task.service_time;
        } else {
            elapsed += task.service_time;
        }
        prev = pos;
    }

    instance.max_route_duration - (elapsed + instance.distance(prev, 0))
}
