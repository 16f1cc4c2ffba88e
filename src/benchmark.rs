//! Benchmarking module.
//!
//! Runs the full pipeline over several seeds (and instances), collects
//! one record per run and aggregates profit and time statistics.

use crate::config::SolverConfig;
use crate::error::Result;
use crate::heuristics::allocation::Allocation;
use crate::instance::Instance;
use crate::solver::Solver;

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Result of one seeded run on one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub instance: String,
    pub seed: u64,
    /// Profit of the constructed plan
    pub initial_profit: i64,
    pub profit: i64,
    pub feasible: bool,
    /// Optional tasks left out
    pub unused: usize,
    /// Computation time in seconds
    pub time: f64,
    pub iterations: Option<usize>,
    pub pool_size: usize,
}

/// Aggregated statistics for one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance: String,
    pub runs: usize,
    pub feasible_runs: usize,
    pub mean_profit: f64,
    pub std_profit: f64,
    pub best_profit: f64,
    pub worst_profit: f64,
    /// Mean gain of the local search over the constructed plan
    pub mean_improvement: f64,
    pub mean_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Seeded runs per instance
    pub num_runs: usize,
    /// Seeds are `first_seed..first_seed + num_runs`
    pub first_seed: u64,
    /// Configuration of every run (its seed is overridden)
    pub solver: SolverConfig,
    /// Run the seeds in parallel
    pub parallel: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            first_seed: 0,
            solver: SolverConfig::default(),
            parallel: true,
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<RunResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    fn run_seed(&self, instance: &Instance, allocation: Option<&Allocation>, seed: u64) -> Result<RunResult> {
        let mut config = self.config.solver.clone();
        config.seed = seed;
        let mut solver = Solver::new(config)?;
        if let Some(allocation) = allocation {
            solver = solver.with_allocation(allocation.clone());
        }
        let outcome = solver.solve(instance)?;

        Ok(RunResult {
            instance: instance.name.clone(),
            seed,
            initial_profit: outcome.initial.total_profit,
            profit: outcome.best.total_profit,
            feasible: outcome.best.feasible,
            unused: outcome.best.unused.len(),
            time: outcome.best.computation_time,
            iterations: outcome.best.iterations,
            pool_size: outcome.pool_size,
        })
    }

    /// Run every seed on `instance`. Each run owns its generator and pool.
    pub fn run_instance(
        &mut self,
        instance: &Instance,
        allocation: Option<&Allocation>,
        progress: Option<&ProgressBar>,
    ) -> Result<()> {
        log::info!("Running benchmark on instance: {}", instance.name);
        let seeds: Vec<u64> = (0..self.config.num_runs as u64)
            .map(|k| self.config.first_seed + k)
            .collect();

        let run = |&seed: &u64| {
            let result = self.run_seed(instance, allocation, seed);
            if let Some(bar) = progress {
                bar.inc(1);
            }
            result
        };
        let mut results = if self.config.parallel {
            seeds.par_iter().map(run).collect::<Result<Vec<_>>>()?
        } else {
            seeds.iter().map(run).collect::<Result<Vec<_>>>()?
        };

        self.results.append(&mut results);
        Ok(())
    }

    /// Run on multiple instances
    pub fn run_on_instances(&mut self, instances: &[Instance], progress: Option<&ProgressBar>) -> Result<()> {
        for instance in instances {
            self.run_instance(instance, None, progress)?;
        }
        Ok(())
    }

    /// Per-instance statistics over feasible runs, by instance name
    pub fn compute_statistics(&self) -> Vec<InstanceSummary> {
        let mut by_instance: BTreeMap<&str, Vec<&RunResult>> = BTreeMap::new();
        for result in &self.results {
            by_instance.entry(result.instance.as_str()).or_default().push(result);
        }

        let mut statistics = Vec::new();
        for (instance, results) in by_instance {
            let feasible: Vec<&RunResult> = results.iter().copied().filter(|r| r.feasible).collect();
            if feasible.is_empty() {
                continue;
            }

            let profits: Vec<f64> = feasible.iter().map(|r| r.profit as f64).collect();
            let gains: Vec<f64> = feasible
                .iter()
                .map(|r| (r.profit - r.initial_profit) as f64)
                .collect();
            let times: Vec<f64> = feasible.iter().map(|r| r.time).collect();

            let std_profit = if profits.len() > 1 {
                Statistics::std_dev(&profits)
            } else {
                0.0
            };

            statistics.push(InstanceSummary {
                instance: instance.to_string(),
                runs: results.len(),
                feasible_runs: feasible.len(),
                mean_profit: Statistics::mean(&profits),
                std_profit,
                best_profit: Statistics::max(&profits),
                worst_profit: Statistics::min(&profits),
                mean_improvement: Statistics::mean(&gains),
                mean_time: Statistics::mean(&times),
            });
        }
        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("        MTOP Benchmark Report\n");
        report.push_str("========================================\n\n");

        report.push_str(&format!(
            "Runs per instance: {} (seeds {}..{})\n\n",
            self.config.num_runs,
            self.config.first_seed,
            self.config.first_seed + self.config.num_runs as u64
        ));

        report.push_str("-".repeat(92).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<20} {:>10} {:>12} {:>10} {:>10} {:>10} {:>8} {:>8}\n",
            "Instance", "Feasible", "Mean", "Std", "Best", "Worst", "Gain", "Time"
        ));
        report.push_str("-".repeat(92).as_str());
        report.push('\n');

        for stat in self.compute_statistics() {
            report.push_str(&format!(
                "{:<20} {:>10} {:>12.2} {:>10.2} {:>10.0} {:>10.0} {:>8.1} {:>8.2}\n",
                stat.instance,
                format!("{}/{}", stat.feasible_runs, stat.runs),
                stat.mean_profit,
                stat.std_profit,
                stat.best_profit,
                stat.worst_profit,
                stat.mean_improvement,
                stat.mean_time
            ));
        }

        report.push_str("-".repeat(92).as_str());
        report.push('\n');
        report
    }

    pub fn results(&self) -> &[RunResult] {
        &self.results
    }
}

/// Load every `.json` instance of a directory, sorted by name.
///
/// Files that fail to load are skipped with a warning.
pub fn load_instances_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Instance>> {
    let mut instances = Vec::new();

    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            match Instance::from_json_file(&path) {
                Ok(instance) => instances.push(instance),
                Err(e) => log::warn!("skipping {:?}: {}", path, e),
            }
        }
    }

    instances.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(instances)
}
