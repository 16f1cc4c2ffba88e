//! Main-task pre-assignment.
//!
//! Before the greedy fill every main task is placed in a (day, cohort)
//! route. The assignment either follows each task's own day field, comes
//! from an external allocator (for example an exact model), or is empty.

use crate::config::AllocationStrategy;
use crate::error::{Result, SolverError};
use crate::feasibility;
use crate::instance::Instance;
use crate::solution::RoutePlan;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Anything that can pin main tasks to days and cohorts
pub trait MainTaskAllocator {
    fn allocate(&self, instance: &Instance) -> Result<Allocation>;
    fn name(&self) -> &str;
}

/// Main tasks per day and cohort, each list ordered by start time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    routes: Vec<Vec<Vec<usize>>>,
}

impl Allocation {
    /// No main tasks anywhere
    pub fn empty(instance: &Instance) -> Self {
        Allocation {
            routes: vec![vec![Vec::new(); instance.cohort_no]; instance.days],
        }
    }

    /// Validate an allocation given as task positions.
    ///
    /// Every listed position must be a main task listed once, on its
    /// mandated day when it has one, and every main task must be listed.
    pub fn from_positions(instance: &Instance, mut routes: Vec<Vec<Vec<usize>>>) -> Result<Self> {
        if routes.len() != instance.days || routes.iter().any(|d| d.len() != instance.cohort_no) {
            return Err(SolverError::MalformedAllocation(format!(
                "expected {} days x {} cohorts",
                instance.days, instance.cohort_no
            )));
        }

        let mut seen = HashSet::new();
        for (day, cohorts) in routes.iter_mut().enumerate() {
            for (cohort, route) in cohorts.iter_mut().enumerate() {
                for &pos in route.iter() {
                    if pos >= instance.len() || !instance.is_main(pos) {
                        return Err(SolverError::MalformedAllocation(format!(
                            "position {pos} (day {day}, cohort {cohort}) is not a main task"
                        )));
                    }
                    if !seen.insert(pos) {
                        return Err(SolverError::MalformedAllocation(format!(
                            "main task {} is allocated twice",
                            instance.task(pos).id
                        )));
                    }
                    if let Some(mandated) = instance.task(pos).day {
                        if mandated != day {
                            return Err(SolverError::MalformedAllocation(format!(
                                "main task {} allocated to day {day}, mandated day {mandated}",
                                instance.task(pos).id
                            )));
                        }
                    }
                }
                route.sort_by_key(|&p| (instance.task(p).start_time, p));
            }
        }

        if let Some(missing) = instance.main_positions().into_iter().find(|p| !seen.contains(p)) {
            return Err(SolverError::MalformedAllocation(format!(
                "main task {} is not allocated",
                instance.task(missing).id
            )));
        }

        Ok(Allocation { routes })
    }

    /// Validate an allocation given as task identifiers
    pub fn from_ids(instance: &Instance, ids: Vec<Vec<Vec<String>>>) -> Result<Self> {
        let mut routes = Vec::with_capacity(ids.len());
        for cohorts in ids {
            let mut day_routes = Vec::with_capacity(cohorts.len());
            for route in cohorts {
                let positions = route
                    .iter()
                    .map(|id| {
                        instance.position_of(id).ok_or_else(|| {
                            SolverError::MalformedAllocation(format!("unknown task id '{id}'"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                day_routes.push(positions);
            }
            routes.push(day_routes);
        }
        Self::from_positions(instance, routes)
    }

    /// Load `[[["m1", "m2"], []], ...]` (day -> cohort -> task ids) from JSON
    pub fn from_json_file<P: AsRef<Path>>(instance: &Instance, path: P) -> Result<Self> {
        let file = File::open(path)?;
        let ids: Vec<Vec<Vec<String>>> = serde_json::from_reader(BufReader::new(file))?;
        Self::from_ids(instance, ids)
    }

    /// Spread each day's main tasks over the cohorts.
    ///
    /// Tasks are taken in start-time order; the i-th goes to the first
    /// cohort, counting from `i % cohort_no`, whose main-task chain stays
    /// feasible. If none does it lands on cohort `i % cohort_no` anyway
    /// and a warning is logged.
    pub fn from_task_days(instance: &Instance) -> Result<Self> {
        if let Some(&pos) = instance
            .main_positions()
            .iter()
            .find(|&&p| instance.task(p).day.is_none())
        {
            return Err(SolverError::MalformedAllocation(format!(
                "main task {} has no day to allocate it to",
                instance.task(pos).id
            )));
        }

        let cohorts = instance.cohort_no;
        let mut routes = vec![vec![Vec::new(); cohorts]; instance.days];
        for (day, day_routes) in routes.iter_mut().enumerate() {
            for (i, main) in instance.main_positions_on_day(day).into_iter().enumerate() {
                let preferred = i % cohorts;
                let target = (0..cohorts)
                    .map(|offset| (preferred + offset) % cohorts)
                    .find(|&c| {
                        let mut chain: Vec<usize> = day_routes[c].clone();
                        chain.push(main);
                        feasibility::is_feasible(instance, &chain)
                    })
                    .unwrap_or_else(|| {
                        log::warn!(
                            "main task {} cannot be reached in time by any cohort on day {}",
                            instance.task(main).id,
                            day
                        );
                        preferred
                    });
                day_routes[target].push(main);
            }
        }

        Ok(Allocation { routes })
    }

    pub fn mains(&self, day: usize, cohort: usize) -> &[usize] {
        &self.routes[day][cohort]
    }

    /// Plan holding only the allocated main tasks
    pub fn skeleton(&self) -> RoutePlan {
        RoutePlan::from_routes(self.routes.clone())
    }
}

impl MainTaskAllocator for Allocation {
    fn allocate(&self, instance: &Instance) -> Result<Allocation> {
        Allocation::from_positions(instance, self.routes.clone())
    }

    fn name(&self) -> &str {
        "External"
    }
}

/// Allocates from each main task's day field
pub struct TaskDayAllocator;

impl MainTaskAllocator for TaskDayAllocator {
    fn allocate(&self, instance: &Instance) -> Result<Allocation> {
        Allocation::from_task_days(instance)
    }

    fn name(&self) -> &str {
        "TaskDay"
    }
}

/// Leaves main tasks out
pub struct NoMainTasks;

impl MainTaskAllocator for NoMainTasks {
    fn allocate(&self, instance: &Instance) -> Result<Allocation> {
        Ok(Allocation::empty(instance))
    }

    fn name(&self) -> &str {
        "None"
    }
}

/// Resolve the configured strategy into an allocation.
///
/// `External` without a supplied allocation is a configuration error.
pub fn resolve(
    strategy: AllocationStrategy,
    instance: &Instance,
    external: Option<&Allocation>,
) -> Result<Allocation> {
    let allocator: &dyn MainTaskAllocator = match strategy {
        AllocationStrategy::TaskDay => &TaskDayAllocator,
        AllocationStrategy::None => &NoMainTasks,
        AllocationStrategy::External => external.ok_or_else(|| {
            SolverError::InvalidConfig(
                "allocation strategy 'external' needs an allocation file".to_string(),
            )
        })?,
    };
    let allocation = allocator.allocate(instance)?;
    log::debug!("main tasks allocated with {}", allocator.name());
    Ok(allocation)
}
