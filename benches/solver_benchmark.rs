//! Solver and logger benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DVector;
use sigflow::logger::{Logger, OutputGroup};
use sigflow::solvers::{Integrator, Tableau, RK4, RKBS32, RKDP54};

/// Simple exponential decay: dx/dt = -k*x
fn exponential_decay(x: &DVector<f64>, _t: f64, k: f64) -> DVector<f64> {
    -k * x
}

/// Integrate to t=1 in ticks of `dt`, stepping to each boundary
fn integrate(method: &'static Tableau, size: usize, dt: f64, first_step: Option<f64>) -> DVector<f64> {
    let mut integrator = Integrator::new(method, 0.0, DVector::from_element(size, 1.0), 1.0).with_first_step(first_step);
    let ticks = (1.0 / dt).round() as u64;
    for n in 1..=ticks {
        let boundary = n as f64 * dt;
        while integrator.t() < boundary {
            integrator.limit_to(boundary);
            if integrator.step(|x, t| exponential_decay(x, t, 0.5)).is_err() {
                integrator.recover();
                break;
            }
        }
    }
    integrator.y().clone()
}

/// Benchmark each method with different state vector sizes
fn bench_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("Integrate to boundary");

    for size in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("RK4", size), size, |b, &size| {
            b.iter(|| integrate(&RK4, black_box(size), 0.01, Some(0.001)));
        });
        group.bench_with_input(BenchmarkId::new("RK23", size), size, |b, &size| {
            b.iter(|| integrate(&RKBS32, black_box(size), 0.01, None));
        });
        group.bench_with_input(BenchmarkId::new("RK45", size), size, |b, &size| {
            b.iter(|| integrate(&RKDP54, black_box(size), 0.01, None));
        });
    }

    group.finish();
}

/// Benchmark merging a substep trajectory with broadcast groups
fn bench_logger(c: &mut Criterion) {
    let times: Vec<f64> = (0..8).map(|i| i as f64 * 0.001).collect();
    let states: Vec<DVector<f64>> = (0..8).map(|i| DVector::from_element(2, i as f64)).collect();
    let fields = vec![sigflow::Field::f64("phi"), sigflow::Field::f64("dphi")];

    c.bench_function("Logger 1000 ticks x 8 rows", |b| {
        b.iter(|| {
            let mut logger = Logger::new(1000);
            for n in 0..1000 {
                let groups = [
                    OutputGroup::column("t", &times),
                    OutputGroup::states(fields.clone(), &states),
                    OutputGroup::scalar("u", n as f64),
                ];
                logger.log(black_box(&groups)).ok();
            }
            black_box(logger.table().len());
        });
    });
}

criterion_group!(benches, bench_methods, bench_logger);
criterion_main!(benches);
