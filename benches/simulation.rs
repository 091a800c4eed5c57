use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use biosim::prelude::*;
use biosim::sbml::reader::read_sbml;

fn setup_task(algorithm: &str) -> SimulationTask {
    let model = read_sbml(include_str!("../tests/data/model.xml")).expect("Failed to read model");

    SimulationTask {
        id: "decay".to_string(),
        model_source: "model.xml".to_string(),
        model,
        time_course: TimeCourse::new(0.0, 0.0, 100.0, 1000).expect("Invalid time course"),
        algorithm: Algorithm::new(algorithm),
        outputs: ["A", "B", "total"]
            .into_iter()
            .map(OutputVariable::element)
            .collect(),
    }
}

fn benchmark_simulation(c: &mut Criterion) {
    let executor = OdeExecutor::default();
    let rk5 = setup_task("KISAO:0000019");
    let rk4 = setup_task("KISAO:0000032");

    c.bench_function("decay_rk5", |b| {
        b.iter(|| {
            let _ = black_box(executor.execute(black_box(&rk5)));
        });
    });

    c.bench_function("decay_rk4", |b| {
        b.iter(|| {
            let _ = black_box(executor.execute(black_box(&rk4)));
        });
    });
}

criterion_group!(benches, benchmark_simulation);
criterion_main!(benches);
