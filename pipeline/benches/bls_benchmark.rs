use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use transit_pipeline::algorithms::detect;
use transit_pipeline::api::{DetectionParameters, ObjectIdentifier, ProcessedSeries};

/// `days` of 2-minute cadence with a 1% dip every 3.2 days.
fn series(days: f64) -> ProcessedSeries {
    let cadence = 2.0 / 1440.0;
    let n = (days / cadence) as usize;
    let time: Vec<f64> = (0..n).map(|i| i as f64 * cadence).collect();
    let flux = time
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let dip = if t.rem_euclid(3.2) < 0.12 { 0.01 } else { 0.0 };
            1.0 - dip + 2e-4 * ((i as f64) * 0.37).sin()
        })
        .collect();
    ProcessedSeries {
        identifier: ObjectIdentifier::new("TIC 1").unwrap(),
        time,
        flux,
        flux_err: vec![1e-3; n],
    }
}

fn bench_series_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("bls_series_length");
    group.sample_size(10);

    let params = DetectionParameters::new([0.5, 10.0], [0.01, 0.1]).with_steps(200, 10);
    for days in [7.0, 27.0] {
        let s = series(days);
        group.bench_with_input(BenchmarkId::new("samples", s.len()), &s, |b, s| {
            b.iter(|| detect(black_box(s), black_box(&params)));
        });
    }

    group.finish();
}

fn bench_period_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("bls_period_grid");
    group.sample_size(10);

    let s = series(27.0);
    for steps in [100usize, 500] {
        let params = DetectionParameters::new([0.5, 30.0], [0.01, 0.1]).with_steps(steps, 10);
        group.bench_with_input(BenchmarkId::new("period_steps", steps), &params, |b, params| {
            b.iter(|| detect(black_box(&s), black_box(params)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_series_length, bench_period_grid);
criterion_main!(benches);
