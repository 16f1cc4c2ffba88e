//! Instance builders shared by the unit tests.

use crate::instance::{Instance, Task};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Instance over an explicit matrix; the depot sits at the origin.
pub fn matrix_instance(
    tasks: Vec<Task>,
    matrix: Vec<Vec<i64>>,
    days: usize,
    cohort_no: usize,
    max_route_duration: i64,
) -> Instance {
    Instance::from_matrix(
        "test",
        Task::depot(0.0, 0.0),
        tasks,
        matrix,
        days,
        cohort_no,
        max_route_duration,
    )
    .unwrap()
}

/// Seeded random instance on a 100x100 square.
///
/// Main tasks come first (positions `1..=num_main`), optional tasks after.
pub fn random_instance(
    seed: u64,
    num_optional: usize,
    num_main: usize,
    days: usize,
    cohort_no: usize,
) -> Instance {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let max_route_duration = 600;
    let mut tasks = Vec::with_capacity(num_optional + num_main);

    for i in 0..num_main {
        let day = rng.gen_range(0..days);
        let start = rng.gen_range(60..max_route_duration - 120);
        let service = rng.gen_range(10..40);
        let x = rng.gen_range(0.0..100.0);
        let y = rng.gen_range(0.0..100.0);
        tasks.push(Task::main(&format!("m{i}"), day, start, service, x, y));
    }
    for i in 0..num_optional {
        let service = rng.gen_range(5..40);
        let profit = rng.gen_range(1..60);
        let x = rng.gen_range(0.0..100.0);
        let y = rng.gen_range(0.0..100.0);
        tasks.push(Task::optional(&format!("o{i}"), service, profit, x, y));
    }

    Instance::from_coordinates(
        "random",
        Task::depot(50.0, 50.0),
        tasks,
        days,
        cohort_no,
        max_route_duration,
        1.0,
    )
    .unwrap()
}
