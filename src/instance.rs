//! Task model and travel-time matrix for the multi-day orienteering problem.
//!
//! An instance is an ordered task array (depot first) together with a square,
//! symmetric matrix of integer travel times in seconds indexed by the same
//! positions. Both are immutable once built; every other module addresses
//! tasks by their position.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Scale applied to Euclidean coordinates when no explicit one is given.
pub const DEFAULT_SCALE: f64 = 1.0;

/// What a task is. Replaces any positional convention for telling main
/// tasks apart from optional ones.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Depot,
    Main,
    Optional,
}

/// A single task (or the depot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// External identifier
    pub id: String,
    pub kind: TaskKind,
    /// Mandated day of a main task; `None` when unconstrained
    pub day: Option<usize>,
    /// Window start. Exact start time for main tasks.
    pub start_time: i64,
    /// Window end
    pub end_time: i64,
    /// Service duration in seconds
    pub service_time: i64,
    /// Profit collected when scheduled (0 for depot and main tasks)
    pub profit: i32,
    /// Offset into the distance matrix
    pub position: usize,
    pub x: f64,
    pub y: f64,
}

impl Task {
    pub fn depot(x: f64, y: f64) -> Self {
        Task {
            id: "depot".to_string(),
            kind: TaskKind::Depot,
            day: None,
            start_time: 0,
            end_time: 0,
            service_time: 0,
            profit: 0,
            position: 0,
            x,
            y,
        }
    }

    pub fn main(id: &str, day: usize, start_time: i64, service_time: i64, x: f64, y: f64) -> Self {
        Task {
            id: id.to_string(),
            kind: TaskKind::Main,
            day: Some(day),
            start_time,
            end_time: start_time + service_time,
            service_time,
            profit: 0,
            position: 0,
            x,
            y,
        }
    }

    /// Optional task; its window is widened to the route budget by the instance.
    pub fn optional(id: &str, service_time: i64, profit: i32, x: f64, y: f64) -> Self {
        Task {
            id: id.to_string(),
            kind: TaskKind::Optional,
            day: None,
            start_time: 0,
            end_time: 0,
            service_time,
            profit,
            position: 0,
            x,
            y,
        }
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.kind == TaskKind::Main
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        self.kind == TaskKind::Optional
    }

    #[inline]
    pub fn is_depot(&self) -> bool {
        self.kind == TaskKind::Depot
    }
}

/// A complete problem instance
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    pub name: String,
    /// Tasks indexed by position, depot at 0
    pub tasks: Vec<Task>,
    /// Travel times in seconds
    pub distance_matrix: Vec<Vec<i64>>,
    /// Number of planning days
    pub days: usize,
    /// Number of cohorts (one route per cohort per day)
    pub cohort_no: usize,
    /// Upper bound on any single route's duration, in seconds
    pub max_route_duration: i64,
}

#[derive(Debug, Deserialize)]
struct InstanceFile {
    #[serde(default)]
    name: String,
    days: usize,
    cohort_no: usize,
    max_route_duration: i64,
    #[serde(default = "default_scale")]
    scale: f64,
    depot: DepotRecord,
    tasks: Vec<TaskRecord>,
    #[serde(default)]
    distance_matrix: Option<Vec<Vec<i64>>>,
}

#[derive(Debug, Deserialize)]
struct DepotRecord {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct TaskRecord {
    id: String,
    kind: TaskKind,
    #[serde(default)]
    day: Option<usize>,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    end_time: Option<i64>,
    service_time: i64,
    #[serde(default)]
    profit: i32,
    x: f64,
    y: f64,
}

fn default_scale() -> f64 {
    DEFAULT_SCALE
}

impl Instance {
    /// Build an instance, deriving travel times from coordinates.
    ///
    /// `tasks` must not contain the depot; it is inserted at position 0.
    pub fn from_coordinates(
        name: &str,
        depot: Task,
        tasks: Vec<Task>,
        days: usize,
        cohort_no: usize,
        max_route_duration: i64,
        scale: f64,
    ) -> Result<Self> {
        let all = Self::assemble(depot, tasks, max_route_duration);
        let distance_matrix = Self::compute_distance_matrix(&all, scale);
        Self::from_parts(name, all, distance_matrix, days, cohort_no, max_route_duration)
    }

    /// Build an instance from an explicit travel-time matrix (depot row first).
    pub fn from_matrix(
        name: &str,
        depot: Task,
        tasks: Vec<Task>,
        distance_matrix: Vec<Vec<i64>>,
        days: usize,
        cohort_no: usize,
        max_route_duration: i64,
    ) -> Result<Self> {
        let all = Self::assemble(depot, tasks, max_route_duration);
        Self::from_parts(name, all, distance_matrix, days, cohort_no, max_route_duration)
    }

    /// Parse an instance from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let raw: InstanceFile = serde_json::from_reader(BufReader::new(file))?;
        Self::from_file_record(raw)
    }

    /// Parse an instance from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: InstanceFile = serde_json::from_str(json)?;
        Self::from_file_record(raw)
    }

    fn from_file_record(raw: InstanceFile) -> Result<Self> {
        let depot = Task::depot(raw.depot.x, raw.depot.y);
        let mut tasks = Vec::with_capacity(raw.tasks.len());
        for record in raw.tasks {
            let mut task = match record.kind {
                TaskKind::Main => {
                    let start = record.start_time.ok_or_else(|| {
                        SolverError::InvalidInstance(format!(
                            "main task '{}' has no start_time",
                            record.id
                        ))
                    })?;
                    let day = record.day.ok_or_else(|| {
                        SolverError::InvalidInstance(format!("main task '{}' has no day", record.id))
                    })?;
                    Task::main(&record.id, day, start, record.service_time, record.x, record.y)
                }
                TaskKind::Optional => Task::optional(
                    &record.id,
                    record.service_time,
                    record.profit,
                    record.x,
                    record.y,
                ),
                TaskKind::Depot => {
                    return Err(SolverError::InvalidInstance(format!(
                        "task '{}' declares kind depot; the depot is given separately",
                        record.id
                    )))
                }
            };
            if let Some(end) = record.end_time {
                task.end_time = end;
            }
            tasks.push(task);
        }

        match raw.distance_matrix {
            Some(matrix) => Self::from_matrix(
                &raw.name,
                depot,
                tasks,
                matrix,
                raw.days,
                raw.cohort_no,
                raw.max_route_duration,
            ),
            None => Self::from_coordinates(
                &raw.name,
                depot,
                tasks,
                raw.days,
                raw.cohort_no,
                raw.max_route_duration,
                raw.scale,
            ),
        }
    }

    fn assemble(mut depot: Task, tasks: Vec<Task>, max_route_duration: i64) -> Vec<Task> {
        depot.position = 0;
        depot.end_time = max_route_duration;
        let mut all = Vec::with_capacity(tasks.len() + 1);
        all.push(depot);
        for (offset, mut task) in tasks.into_iter().enumerate() {
            task.position = offset + 1;
            if task.is_optional() {
                task.start_time = 0;
                task.end_time = max_route_duration;
            }
            all.push(task);
        }
        all
    }

    fn from_parts(
        name: &str,
        tasks: Vec<Task>,
        distance_matrix: Vec<Vec<i64>>,
        days: usize,
        cohort_no: usize,
        max_route_duration: i64,
    ) -> Result<Self> {
        let instance = Instance {
            name: name.to_string(),
            tasks,
            distance_matrix,
            days,
            cohort_no,
            max_route_duration,
        };
        instance.check()?;
        Ok(instance)
    }

    fn check(&self) -> Result<()> {
        let n = self.tasks.len();
        if self.days == 0 || self.cohort_no == 0 {
            return Err(SolverError::InvalidInstance(
                "days and cohort_no must be positive".to_string(),
            ));
        }
        if self.max_route_duration <= 0 {
            return Err(SolverError::InvalidInstance(
                "max_route_duration must be positive".to_string(),
            ));
        }
        if self.tasks.iter().skip(1).any(Task::is_depot) {
            return Err(SolverError::InvalidInstance(
                "only position 0 may be the depot".to_string(),
            ));
        }
        if self.distance_matrix.len() != n || self.distance_matrix.iter().any(|row| row.len() != n) {
            return Err(SolverError::InvalidInstance(format!(
                "distance matrix must be {n}x{n}"
            )));
        }
        for i in 0..n {
            if self.distance_matrix[i][i] != 0 {
                return Err(SolverError::InvalidInstance(format!(
                    "distance[{i}][{i}] must be 0"
                )));
            }
            for j in 0..n {
                let d = self.distance_matrix[i][j];
                if d < 0 || d != self.distance_matrix[j][i] {
                    return Err(SolverError::InvalidInstance(format!(
                        "distance[{i}][{j}] must be non-negative and symmetric"
                    )));
                }
            }
        }
        for task in &self.tasks {
            if task.service_time < 0 {
                return Err(SolverError::InvalidInstance(format!(
                    "task '{}' has a negative service time",
                    task.id
                )));
            }
            if task.is_main() {
                if let Some(day) = task.day {
                    if day >= self.days {
                        return Err(SolverError::InvalidInstance(format!(
                            "main task '{}' is pinned to day {day} but the horizon has {} days",
                            task.id, self.days
                        )));
                    }
                }
                if task.start_time < 0 || task.start_time > self.max_route_duration {
                    return Err(SolverError::InvalidInstance(format!(
                        "main task '{}' starts outside the route budget",
                        task.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rounded Euclidean travel times, multiplied by `scale`
    fn compute_distance_matrix(tasks: &[Task], scale: f64) -> Vec<Vec<i64>> {
        let n = tasks.len();
        let mut matrix = vec![vec![0i64; n]; n];

        for i in 0..n {
            for j in i + 1..n {
                let dx = tasks[i].x - tasks[j].x;
                let dy = tasks[i].y - tasks[j].y;
                let d = ((dx * dx + dy * dy).sqrt() * scale).round() as i64;
                matrix[i][j] = d;
                matrix[j][i] = d;
            }
        }

        matrix
    }

    /// Travel time between two positions
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> i64 {
        self.distance_matrix[i][j]
    }

    #[inline]
    pub fn task(&self, position: usize) -> &Task {
        &self.tasks[position]
    }

    #[inline]
    pub fn is_main(&self, position: usize) -> bool {
        self.tasks[position].is_main()
    }

    #[inline]
    pub fn is_optional(&self, position: usize) -> bool {
        self.tasks[position].is_optional()
    }

    #[inline]
    pub fn service_time(&self, position: usize) -> i64 {
        self.tasks[position].service_time
    }

    #[inline]
    pub fn profit(&self, position: usize) -> i32 {
        self.tasks[position].profit
    }

    /// Number of tasks including the depot
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.len() <= 1
    }

    pub fn optional_positions(&self) -> Vec<usize> {
        self.tasks.iter().filter(|t| t.is_optional()).map(|t| t.position).collect()
    }

    pub fn main_positions(&self) -> Vec<usize> {
        self.tasks.iter().filter(|t| t.is_main()).map(|t| t.position).collect()
    }

    /// Main tasks pinned to `day`, ordered by start time
    pub fn main_positions_on_day(&self, day: usize) -> Vec<usize> {
        let mut mains: Vec<usize> = self
            .tasks
            .iter()
            .filter(|t| t.is_main() && t.day == Some(day))
            .map(|t| t.position)
            .collect();
        mains.sort_by_key(|&p| (self.tasks[p].start_time, p));
        mains
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let num_main = self.tasks.iter().filter(|t| t.is_main()).count();
        let num_optional = self.tasks.iter().filter(|t| t.is_optional()).count();
        let total_profit: i64 = self.tasks.iter().map(|t| t.profit as i64).sum();
        let total_service: i64 = self
            .tasks
            .iter()
            .filter(|t| t.is_optional())
            .map(|t| t.service_time)
            .sum();

        let n = self.tasks.len();
        let mut sum = 0i64;
        let mut count = 0i64;
        let mut max_distance = 0i64;
        for i in 0..n {
            for j in i + 1..n {
                let d = self.distance(i, j);
                sum += d;
                count += 1;
                max_distance = max_distance.max(d);
            }
        }
        let avg_distance = if count > 0 { sum as f64 / count as f64 } else { 0.0 };

        InstanceStatistics {
            name: self.name.clone(),
            num_tasks: n,
            num_main,
            num_optional,
            days: self.days,
            cohort_no: self.cohort_no,
            max_route_duration: self.max_route_duration,
            total_profit,
            total_service,
            avg_distance,
            max_distance,
        }
    }
}

/// Statistics about an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_tasks: usize,
    pub num_main: usize,
    pub num_optional: usize,
    pub days: usize,
    pub cohort_no: usize,
    pub max_route_duration: i64,
    pub total_profit: i64,
    pub total_service: i64,
    pub avg_distance: f64,
    pub max_distance: i64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(
            f,
            "  Tasks: {} (1 depot + {} main + {} optional)",
            self.num_tasks, self.num_main, self.num_optional
        )?;
        writeln!(f, "  Days x cohorts: {} x {}", self.days, self.cohort_no)?;
        writeln!(f, "  Max route duration: {}s", self.max_route_duration)?;
        writeln!(f, "  Available profit: {}", self.total_profit)?;
        writeln!(
            f,
            "  Optional service time: {}s (capacity {}s)",
            self.total_service,
            self.max_route_duration * (self.days * self.cohort_no) as i64
        )?;
        writeln!(f, "  Avg travel time: {:.2}s", self.avg_distance)?;
        writeln!(f, "  Max travel time: {}s", self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let tasks = vec![Task::optional("a", 10, 5, 3.0, 4.0)];
        let instance =
            Instance::from_coordinates("t", Task::depot(0.0, 0.0), tasks, 1, 1, 100, 2.0).unwrap();

        assert_eq!(instance.distance(0, 1), 10);
        assert_eq!(instance.distance(1, 0), 10);
        assert_eq!(instance.distance(1, 1), 0);
    }

    #[test]
    fn test_positions_and_windows() {
        let tasks = vec![
            Task::main("m", 0, 50, 10, 1.0, 0.0),
            Task::optional("a", 10, 5, 2.0, 0.0),
        ];
        let instance =
            Instance::from_coordinates("t", Task::depot(0.0, 0.0), tasks, 1, 1, 100, 1.0).unwrap();

        assert_eq!(instance.task(1).position, 1);
        assert!(instance.is_main(1));
        assert!(instance.is_optional(2));
        assert_eq!(instance.task(2).end_time, 100);
        assert_eq!(instance.main_positions_on_day(0), vec![1]);
        assert_eq!(instance.position_of("a"), Some(2));
    }

    #[test]
    fn test_rejects_asymmetric_matrix() {
        let tasks = vec![Task::optional("a", 10, 5, 0.0, 0.0)];
        let matrix = vec![vec![0, 5], vec![6, 0]];
        let result = Instance::from_matrix("t", Task::depot(0.0, 0.0), tasks, matrix, 1, 1, 100);
        assert!(matches!(result, Err(SolverError::InvalidInstance(_))));
    }

    #[test]
    fn test_rejects_main_task_outside_horizon() {
        let tasks = vec![Task::main("m", 3, 10, 10, 0.0, 0.0)];
        let result =
            Instance::from_coordinates("t", Task::depot(0.0, 0.0), tasks, 2, 1, 100, 1.0);
        assert!(matches!(result, Err(SolverError::InvalidInstance(_))));
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "name": "tiny",
            "days": 2,
            "cohort_no": 1,
            "max_route_duration": 1000,
            "scale": 10.0,
            "depot": {"x": 0.0, "y": 0.0},
            "tasks": [
                {"id": "m1", "kind": "main", "day": 1, "start_time": 300, "service_time": 60, "x": 1.0, "y": 0.0},
                {"id": "o1", "kind": "optional", "service_time": 30, "profit": 7, "x": 0.0, "y": 2.0}
            ]
        }"#;
        let instance = Instance::from_json_str(json).unwrap();

        assert_eq!(instance.len(), 3);
        assert_eq!(instance.distance(0, 2), 20);
        assert_eq!(instance.task(1).day, Some(1));
        assert_eq!(instance.profit(2), 7);
        assert_eq!(instance.statistics().num_optional, 1);
    }

    #[test]
    fn test_from_json_rejects_unknown_kind() {
        let json = r#"{
            "days": 1, "cohort_no": 1, "max_route_duration": 10,
            "depot": {"x": 0.0, "y": 0.0},
            "tasks": [{"id": "x", "kind": "bonus", "service_time": 1, "x": 0.0, "y": 0.0}]
        }"#;
        assert!(matches!(Instance::from_json_str(json), Err(SolverError::Json(_))));
    }
}
