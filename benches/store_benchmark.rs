use criterion::{
    black_box,
    criterion_group,
    criterion_main,
    BatchSize,
    Bencher,
    Criterion,
    Throughput,
};
use rand::prelude::*;
use tick_timers::{
    stores::{MinHeapStore, SortedListStore, TimingWheelStore, WheelConfig},
    TimerAction,
    TimerHandle,
    TimerStore,
    Timestamp,
};

const NUM_ELEMENTS: usize = 10000;
const MAX_DELAY: Timestamp = 3600;

#[derive(Debug)]
struct NoopAction(u64);

impl TimerAction for NoopAction {
    fn trigger(self) {
        black_box(self.0);
    }
}

fn list() -> SortedListStore<NoopAction> {
    SortedListStore::new()
}

fn heap() -> MinHeapStore<NoopAction> {
    MinHeapStore::with_capacity(64).expect("Could not create heap!")
}

fn wheel() -> TimingWheelStore<NoopAction> {
    TimingWheelStore::with_config(WheelConfig::new(512, 1)).expect("Could not create wheel!")
}

fn uniform_delays() -> Vec<Timestamp> {
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(42);
    (0..NUM_ELEMENTS)
        .map(|_| rng.gen_range(1..=MAX_DELAY))
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("store-throughput");
    group.throughput(Throughput::Elements(NUM_ELEMENTS as u64));
    // the list is O(n) per insert, so it only gets the dense workloads
    group.bench_function("list-write-dense", |b| write_dense_bench(b, list));
    group.bench_function("heap-write-dense", |b| write_dense_bench(b, heap));
    group.bench_function("wheel-write-dense", |b| write_dense_bench(b, wheel));
    group.bench_function("heap-write-uniform", |b| write_uniform_bench(b, heap));
    group.bench_function("wheel-write-uniform", |b| write_uniform_bench(b, wheel));
    group.bench_function("list-read-dense", |b| read_dense_bench(b, list));
    group.bench_function("heap-read-dense", |b| read_dense_bench(b, heap));
    group.bench_function("wheel-read-dense", |b| read_dense_bench(b, wheel));
    group.bench_function("heap-cancel-uniform", |b| cancel_uniform_bench(b, heap));
    group.bench_function("wheel-cancel-uniform", |b| cancel_uniform_bench(b, wheel));
    group.finish();
}

fn write_dense_bench<S, F>(bencher: &mut Bencher, make: F)
where
    S: TimerStore<Action = NoopAction>,
    F: Fn() -> S,
{
    bencher.iter_batched(
        &make,
        |mut store| {
            for i in 1..=NUM_ELEMENTS {
                let _ = store.schedule_after(0, i as Timestamp, NoopAction(i as u64));
            }
            store
        },
        BatchSize::PerIteration,
    );
}

fn write_uniform_bench<S, F>(bencher: &mut Bencher, make: F)
where
    S: TimerStore<Action = NoopAction>,
    F: Fn() -> S,
{
    let delays = uniform_delays();
    bencher.iter_batched(
        || (make(), delays.clone()),
        |(mut store, delays)| {
            for (i, delay) in delays.into_iter().enumerate() {
                let _ = store.schedule_after(0, delay, NoopAction(i as u64));
            }
            store
        },
        BatchSize::PerIteration,
    );
}

fn read_dense_bench<S, F>(bencher: &mut Bencher, make: F)
where
    S: TimerStore<Action = NoopAction>,
    F: Fn() -> S,
{
    bencher.iter_batched(
        || {
            let mut store = make();
            for i in 1..=NUM_ELEMENTS {
                store
                    .schedule_after(0, i as Timestamp, NoopAction(i as u64))
                    .expect("Could not insert timer!");
            }
            store
        },
        |mut store| {
            for now in 1..=NUM_ELEMENTS {
                black_box(store.tick(now as Timestamp));
            }
            store
        },
        BatchSize::PerIteration,
    );
}

fn cancel_uniform_bench<S, F>(bencher: &mut Bencher, make: F)
where
    S: TimerStore<Action = NoopAction>,
    F: Fn() -> S,
{
    let delays = uniform_delays();
    bencher.iter_batched(
        || {
            let mut store = make();
            let handles: Vec<TimerHandle> = delays
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    store
                        .schedule_after(0, *d, NoopAction(i as u64))
                        .expect("Could not insert timer!")
                })
                .collect();
            (store, handles)
        },
        |(mut store, handles)| {
            for h in handles {
                black_box(store.cancel(h));
            }
            store
        },
        BatchSize::PerIteration,
    );
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
