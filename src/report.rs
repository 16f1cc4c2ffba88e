//! Solution export.
//!
//! A [`SolutionReport`] is a self-contained view of a solution with task
//! identifiers instead of positions, written as pretty JSON. The per-stop
//! timeline of every route can also be written as CSV.

use crate::error::Result;
use crate::feasibility;
use crate::instance::{Instance, TaskKind};
use crate::solution::Solution;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteReport {
    pub day: usize,
    pub cohort: usize,
    pub tasks: Vec<String>,
    pub profit: i64,
    pub slack: i64,
    /// Time back at the depot
    pub end_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionReport {
    pub instance: String,
    pub generated_at: String,
    pub algorithm: String,
    pub seed: Option<u64>,
    pub total_profit: i64,
    pub feasible: bool,
    pub computation_time: f64,
    pub iterations: Option<usize>,
    pub routes: Vec<RouteReport>,
    pub unused: Vec<String>,
    pub violations: Vec<String>,
}

/// One CSV row: a stop of a route
#[derive(Debug, Clone, Serialize)]
struct StopRecord<'a> {
    day: usize,
    cohort: usize,
    order: usize,
    task: &'a str,
    kind: TaskKind,
    profit: i32,
    arrival: i64,
    start: i64,
    departure: i64,
}

impl SolutionReport {
    pub fn new(instance: &Instance, solution: &Solution) -> Self {
        let routes = solution
            .plan
            .iter_routes()
            .map(|(day, cohort, route)| RouteReport {
                day,
                cohort,
                tasks: route.iter().map(|&p| instance.task(p).id.clone()).collect(),
                profit: route
                    .iter()
                    .filter(|&&p| instance.is_optional(p))
                    .map(|&p| instance.profit(p) as i64)
                    .sum(),
                slack: solution.route_slack(day, cohort),
                end_time: feasibility::simulate(instance, route).end_time,
            })
            .collect();

        SolutionReport {
            instance: instance.name.clone(),
            generated_at: chrono::Local::now().to_rfc3339(),
            algorithm: solution.algorithm.clone(),
            seed: None,
            total_profit: solution.total_profit,
            feasible: solution.feasible,
            computation_time: solution.computation_time,
            iterations: solution.iterations,
            routes,
            unused: solution
                .unused
                .iter()
                .map(|&p| instance.task(p).id.clone())
                .collect(),
            violations: solution.validate(instance, false),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Write one row per visited task: day, cohort, order, task, kind, profit
/// and the arrival/start/departure times
pub fn write_routes_csv<W: Write>(instance: &Instance, solution: &Solution, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for (day, cohort, route) in solution.plan.iter_routes() {
        for (order, visit) in feasibility::schedule(instance, route).into_iter().enumerate() {
            let task = instance.task(visit.position);
            writer.serialize(StopRecord {
                day,
                cohort,
                order,
                task: &task.id,
                kind: task.kind,
                profit: if task.is_optional() { task.profit } else { 0 },
                arrival: visit.arrival,
                start: visit.start,
                departure: visit.departure,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn export_routes_csv<P: AsRef<Path>>(instance: &Instance, solution: &Solution, path: P) -> Result<()> {
    write_routes_csv(instance, solution, File::create(path)?)
}
