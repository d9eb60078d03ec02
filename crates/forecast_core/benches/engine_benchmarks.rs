//! Criterion benchmarks for the Monte Carlo engine and its Sampler.
//!
//! Run with: cargo bench -p forecast_core
//!
//! The throughput target (≥40,000 complete-mode trials/sec,
//! ≥80,000 simple-mode trials/sec on a single modern core) is a
//! per-trial budget, not a wall-clock assertion this suite can enforce
//! directly — these benchmarks exist so a regression shows up in
//! `cargo bench` output instead of silently creeping in.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use forecast_core::config::{SimulationConfig, SimulationMode, ThroughputHistory};
use forecast_core::sampler::Sampler;
use forecast_core::{engine, burndown};

fn history() -> ThroughputHistory {
    ThroughputHistory::new(vec![5.0, 6.0, 7.0, 4.0, 8.0, 6.0, 5.0, 7.0])
}

fn simple_config(n: usize) -> SimulationConfig {
    SimulationConfig {
        tp_samples: history(),
        backlog: 200,
        n_simulations: n,
        mode: SimulationMode::Simple,
        team_size: 1,
        min_contributors: 1,
        max_contributors: 1,
        seed: Some(42),
        ..Default::default()
    }
}

fn complete_config(n: usize) -> SimulationConfig {
    SimulationConfig {
        tp_samples: history(),
        backlog: 200,
        n_simulations: n,
        mode: SimulationMode::Complete,
        team_size: 10,
        min_contributors: 2,
        max_contributors: 5,
        s_curve_pct: 20,
        seed: Some(42),
        ..Default::default()
    }
}

fn bench_sampler_batch_draw(c: &mut Criterion) {
    let hist = history();
    let mut sampler = Sampler::fit(&hist).unwrap();
    let mut rng = SmallRng::seed_from_u64(7);

    c.bench_function("sampler_draw_batch_10k", |b| {
        b.iter(|| sampler.draw_batch(black_box(&mut rng), black_box(10_000)))
    });
}

fn bench_single_trial(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_trial");
    for mode_config in [("simple", simple_config(1)), ("complete", complete_config(1))] {
        let (label, config) = mode_config;
        let cache = burndown::TrialCache::build(&config);
        let mut sampler = Sampler::fit(&config.tp_samples).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);

        group.bench_with_input(BenchmarkId::new("mode", label), &config, |b, config| {
            b.iter(|| burndown::run_trial(black_box(config), black_box(&cache), black_box(&mut sampler), black_box(&mut rng)))
        });
    }
    group.finish();
}

fn bench_engine_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_run");
    for n in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("simple", n), &n, |b, &n| {
            let config = simple_config(n);
            b.iter(|| engine::run(black_box(&config)))
        });
        group.bench_with_input(BenchmarkId::new("complete", n), &n, |b, &n| {
            let config = complete_config(n);
            b.iter(|| engine::run(black_box(&config)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sampler_batch_draw, bench_single_trial, bench_engine_run);
criterion_main!(benches);
