use mtop_solver::config::{AllocationStrategy, EvaluationStrategy, SolverConfig};
use mtop_solver::heuristics::allocation::Allocation;
use mtop_solver::report::{write_routes_csv, SolutionReport};
use mtop_solver::solver::Solver;
use mtop_solver::{Instance, SolverError};

const INSTANCE: &str = r#"{
    "name": "pipeline",
    "days": 2,
    "cohort_no": 2,
    "max_route_duration": 500,
    "depot": { "x": 0.0, "y": 0.0 },
    "tasks": [
        { "id": "m0", "kind": "main", "day": 0, "start_time": 200, "service_time": 30, "x": 50.0, "y": 0.0 },
        { "id": "m1", "kind": "main", "day": 1, "start_time": 150, "service_time": 30, "x": 0.0, "y": 60.0 },
        { "id": "o1", "kind": "optional", "service_time": 20, "profit": 8, "x": 20.0, "y": 10.0 },
        { "id": "o2", "kind": "optional", "service_time": 20, "profit": 5, "x": 40.0, "y": 30.0 },
        { "id": "o3", "kind": "optional", "service_time": 25, "profit": 9, "x": -30.0, "y": 20.0 },
        { "id": "o4", "kind": "optional", "service_time": 15, "profit": 3, "x": 10.0, "y": -40.0 },
        { "id": "o5", "kind": "optional", "service_time": 20, "profit": 6, "x": 70.0, "y": 20.0 },
        { "id": "o6", "kind": "optional", "service_time": 30, "profit": 12, "x": -50.0, "y": -10.0 },
        { "id": "o7", "kind": "optional", "service_time": 10, "profit": 2, "x": 5.0, "y": 45.0 },
        { "id": "o8", "kind": "optional", "service_time": 20, "profit": 7, "x": 60.0, "y": -30.0 }
    ]
}"#;

fn config(seed: u64) -> SolverConfig {
    SolverConfig {
        seed,
        time_limit_secs: 30.0,
        max_iterations: Some(10),
        ..SolverConfig::default()
    }
}

#[test]
fn test_solve_from_json() {
    let instance = Instance::from_json_str(INSTANCE).unwrap();
    assert_eq!(instance.len(), 11);

    let outcome = Solver::new(config(3)).unwrap().solve(&instance).unwrap();
    let best = &outcome.best;

    assert!(best.feasible);
    assert!(outcome.violations.is_empty(), "{:?}", outcome.violations);
    assert!(best.total_profit >= outcome.initial.total_profit);
    assert!(best.total_profit > 0);
    assert_eq!(best.iterations, Some(10));

    let report = SolutionReport::new(&instance, best).with_seed(3);
    assert_eq!(report.routes.len(), 4);
    let tasks: Vec<&String> = report.routes.iter().flat_map(|r| r.tasks.iter()).collect();
    assert!(tasks.iter().any(|t| t.as_str() == "m0"));
    assert!(tasks.iter().any(|t| t.as_str() == "m1"));
    assert_eq!(tasks.len() + report.unused.len(), 10);
    assert_eq!(
        report.routes.iter().map(|r| r.profit).sum::<i64>(),
        best.total_profit
    );

    let path = std::env::temp_dir().join(format!("mtop-pipeline-{}.json", std::process::id()));
    report.to_json_file(&path).unwrap();
    let back = SolutionReport::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(back.total_profit, best.total_profit);
    assert_eq!(back.seed, Some(3));

    let mut buffer = Vec::new();
    write_routes_csv(&instance, best, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert_eq!(text.lines().count(), tasks.len() + 1);
}

#[test]
fn test_first_improvement_pipeline() {
    let instance = Instance::from_json_str(INSTANCE).unwrap();
    let mut config = config(5);
    config.evaluation = EvaluationStrategy::FirstImprovement;

    let outcome = Solver::new(config).unwrap().solve(&instance).unwrap();
    assert!(outcome.best.feasible);
    assert!(outcome.violations.is_empty(), "{:?}", outcome.violations);
}

#[test]
fn test_external_allocation() {
    let instance = Instance::from_json_str(INSTANCE).unwrap();
    let allocation = Allocation::from_ids(
        &instance,
        vec![vec![vec![], vec!["m0".to_string()]], vec![vec!["m1".to_string()], vec![]]],
    )
    .unwrap();

    let mut config = config(7);
    config.construction.allocation = AllocationStrategy::External;
    let outcome = Solver::new(config)
        .unwrap()
        .with_allocation(allocation)
        .solve(&instance)
        .unwrap();

    let report = SolutionReport::new(&instance, &outcome.best);
    let day0_cohort1 = report
        .routes
        .iter()
        .find(|r| r.day == 0 && r.cohort == 1)
        .unwrap();
    assert!(day0_cohort1.tasks.iter().any(|t| t == "m0"));
    assert!(outcome.violations.is_empty(), "{:?}", outcome.violations);
}

#[test]
fn test_depot_kind_is_rejected() {
    let json = INSTANCE.replace(r#""id": "o1", "kind": "optional""#, r#""id": "o1", "kind": "depot""#);
    let err = Instance::from_json_str(&json).unwrap_err();
    assert!(matches!(err, SolverError::InvalidInstance(_)));
}
