//! MTOP Solver - Command Line Interface
//!
//! Multi-day team orienteering with fixed main tasks: greedy construction
//! followed by neighborhood-based iterated local search.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mtop_solver::benchmark::{load_instances_from_dir, Benchmark, BenchmarkConfig};
use mtop_solver::config::{EvaluationStrategy, NeighborhoodKind, SolverConfig};
use mtop_solver::error::Result;
use mtop_solver::heuristics::allocation::Allocation;
use mtop_solver::instance::Instance;
use mtop_solver::report::{export_routes_csv, SolutionReport};
use mtop_solver::solver::Solver;

use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mtop-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Multi-day team orienteering solver with fixed main tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one instance
    Solve {
        #[arg(short, long)]
        instance: PathBuf,

        /// JSON solver configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Main-task allocation (day -> cohort -> task ids), for the external strategy
        #[arg(short, long)]
        allocation: Option<PathBuf>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Cap on perturbation iterations
        #[arg(long)]
        max_iterations: Option<usize>,

        /// best_improvement or first_improvement
        #[arg(short, long)]
        evaluation: Option<EvaluationStrategy>,

        /// Descent order, comma separated (e.g. insert,replace_profit,swap_intra_route)
        #[arg(short, long, value_delimiter = ',')]
        neighborhoods: Option<Vec<NeighborhoodKind>>,

        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the per-stop route timeline here
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run several seeds on one instance or on a directory of instances
    Benchmark {
        /// Instance file or directory of .json instances
        #[arg(short, long)]
        instance: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Number of seeded runs per instance
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// First seed
        #[arg(long, default_value = "0")]
        first_seed: u64,

        /// Time limit per run
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Run seeds one after the other
        #[arg(long)]
        sequential: bool,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Solve {
            instance,
            config,
            allocation,
            seed,
            time_limit,
            max_iterations,
            evaluation,
            neighborhoods,
            output,
            csv,
            verbose,
        } => {
            let overrides = Overrides {
                seed,
                time_limit,
                max_iterations,
                evaluation,
                neighborhoods,
            };
            solve_instance(
                &instance,
                config.as_deref(),
                allocation.as_deref(),
                overrides,
                output,
                csv,
                verbose,
            )
        }

        Commands::Benchmark {
            instance,
            config,
            output,
            runs,
            first_seed,
            time_limit,
            sequential,
        } => run_benchmark(
            &instance,
            config.as_deref(),
            &output,
            runs,
            first_seed,
            time_limit,
            sequential,
        ),

        Commands::Analyze { instance, config } => analyze_instance(&instance, config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Command-line values that take precedence over the configuration file
struct Overrides {
    seed: Option<u64>,
    time_limit: Option<f64>,
    max_iterations: Option<usize>,
    evaluation: Option<EvaluationStrategy>,
    neighborhoods: Option<Vec<NeighborhoodKind>>,
}

fn load_config(path: Option<&Path>) -> Result<SolverConfig> {
    match path {
        Some(path) => SolverConfig::from_file(path),
        None => Ok(SolverConfig::default()),
    }
}

fn iteration_bar(max_iterations: Option<usize>) -> ProgressBar {
    let bar = match max_iterations {
        Some(n) => ProgressBar::new(n as u64),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} iterations, {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn solve_instance(
    path: &Path,
    config_path: Option<&Path>,
    allocation_path: Option<&Path>,
    overrides: Overrides,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    println!("Loading instance from {:?}...", path);
    let instance = Instance::from_json_file(path)?;

    let mut config = load_config(config_path)?;
    if let Some(seed) = overrides.seed {
        config.seed = seed;
    }
    if let Some(limit) = overrides.time_limit {
        config.time_limit_secs = limit;
    }
    if overrides.max_iterations.is_some() {
        config.max_iterations = overrides.max_iterations;
    }
    if let Some(evaluation) = overrides.evaluation {
        config.evaluation = evaluation;
    }
    if let Some(neighborhoods) = overrides.neighborhoods {
        config.neighborhoods = neighborhoods;
    }

    if verbose {
        println!("{}", instance.statistics());
        println!("Configuration: {}", serde_json::to_string_pretty(&config)?);
    }

    let seed = config.seed;
    let bar = iteration_bar(config.max_iterations);
    let mut solver = Solver::new(config)?.with_progress(bar);
    if let Some(allocation_path) = allocation_path {
        solver = solver.with_allocation(Allocation::from_json_file(&instance, allocation_path)?);
    }

    println!("Solving {}...", instance.name);
    let outcome = solver.solve(&instance)?;
    let best = &outcome.best;

    println!("\n========== Results ==========");
    println!("Algorithm: {}", best.algorithm);
    println!("Initial profit: {}", outcome.initial.total_profit);
    println!("Total profit: {}", best.total_profit);
    println!("Feasible: {}", best.feasible);
    println!(
        "Scheduled optional tasks: {} ({} unused)",
        best.scheduled_optional(&instance),
        best.unused.len()
    );
    println!("Total slack: {}s", best.total_slack());
    println!("Time: {:.4}s", best.computation_time);
    if let Some(iter) = best.iterations {
        println!("Iterations: {}", iter);
    }
    println!("Pooled solutions: {}", outcome.pool_size);
    for violation in &outcome.violations {
        println!("  violation: {}", violation);
    }

    if verbose {
        println!("\n{}", best);
    }

    if let Some(out_path) = output {
        SolutionReport::new(&instance, best)
            .with_seed(seed)
            .to_json_file(&out_path)?;
        println!("\nSolution saved to {:?}", out_path);
    }

    if let Some(csv_path) = csv {
        export_routes_csv(&instance, best, &csv_path)?;
        println!("Routes saved to {:?}", csv_path);
    }

    Ok(())
}

fn run_benchmark(
    path: &Path,
    config_path: Option<&Path>,
    output: &Path,
    runs: usize,
    first_seed: u64,
    time_limit: Option<f64>,
    sequential: bool,
) -> Result<()> {
    let instances = if path.is_dir() {
        println!("Loading instances from {:?}...", path);
        load_instances_from_dir(path)?
    } else {
        vec![Instance::from_json_file(path)?]
    };
    println!("Found {} instances", instances.len());

    if instances.is_empty() {
        eprintln!("No instances found!");
        return Ok(());
    }

    std::fs::create_dir_all(output)?;

    let mut solver = load_config(config_path)?;
    if let Some(limit) = time_limit {
        solver.time_limit_secs = limit;
    }
    let config = BenchmarkConfig {
        num_runs: runs,
        first_seed,
        solver,
        parallel: !sequential,
    };

    let bar = ProgressBar::new((runs * instances.len()) as u64);
    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} runs")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);

    let mut benchmark = Benchmark::new(config);
    benchmark.run_on_instances(&instances, Some(&bar))?;
    bar.finish();

    let results_path = output.join("results.csv");
    benchmark.export_to_csv(&results_path)?;
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    benchmark.export_statistics_csv(&stats_path)?;
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    std::fs::write(&report_path, &report)?;
    println!("Report saved to {:?}", report_path);

    Ok(())
}

fn analyze_instance(path: &Path, config_path: Option<&Path>) -> Result<()> {
    let instance = Instance::from_json_file(path)?;
    let config = load_config(config_path)?;

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    println!("\nMain tasks per day:");
    for day in 0..instance.days {
        let mains = instance.main_positions_on_day(day);
        let busy: i64 = mains.iter().map(|&m| instance.service_time(m)).sum();
        println!("  Day {}: {} main tasks, {}s of service", day, mains.len(), busy);
    }

    let solver = Solver::new(config)?;
    let initial = solver.construct(&instance)?;

    println!("\nQuick Solution Estimate:");
    println!(
        "  {}: profit {} ({} of {} optional tasks, feasible: {})",
        initial.algorithm,
        initial.total_profit,
        initial.scheduled_optional(&instance),
        instance.optional_positions().len(),
        initial.feasible
    );

    Ok(())
}
