//! Engine performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use order_lifecycle_sim::random::{self, SeededLcg};
use order_lifecycle_sim::{ArrivalRate, Clock, Engine, Generator, ManualClock, SimulationConfig, StaticMenu};

const HOUR_MS: u64 = 3_600_000;

fn bench_simulated_rush_hour(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.bench_function("advance_one_rush_hour_at_10x", |b| {
        b.iter_batched(
            || {
                let clock = Arc::new(ManualClock::at_hour(12));
                let start = clock.now_ms();
                let mut engine = Engine::with_seed(Arc::new(StaticMenu::default_menu()), clock, 42);
                engine
                    .start(SimulationConfig::new(10.0, ArrivalRate::Rush), start)
                    .unwrap();
                (engine, start)
            },
            |(mut engine, start)| {
                let mut t = start;
                while t < start + HOUR_MS {
                    t += 1_000;
                    engine.advance_to(t);
                    let _ = engine.take_mirror_commands();
                }
                engine.stats()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_order_generation(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("order_gen");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("generate_1000", |b| {
        b.iter_batched(
            || Generator::new(7, StaticMenu::default_menu().items().to_vec()),
            |mut generator| generator.take_orders(N),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_arrival_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("random");
    group.bench_function("next_arrival_delay_all_hours", |b| {
        let mut rng = SeededLcg::new(1);
        b.iter(|| {
            (0..24u32)
                .map(|hour| random::next_arrival_delay(&mut rng, hour, ArrivalRate::Low))
                .sum::<u64>()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_simulated_rush_hour, bench_order_generation, bench_arrival_sampling);
criterion_main!(benches);
