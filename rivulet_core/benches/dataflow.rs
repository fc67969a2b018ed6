// Benchmarks for emit fan-out and AsyncFlow throughput
// Run with: cargo bench -p rivulet_core --bench dataflow

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rivulet_core::communication::{AsyncFlow, LastValueSink, Map, Observable, Requestable, ValueFlow};

fn benchmark_value_flow_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_flow_fanout");

    for subscribers in [1usize, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, &subscribers| {
                let flow = ValueFlow::new("bench", 0u64);
                for _ in 0..subscribers {
                    flow.subscribe(&Rc::new(LastValueSink::new()));
                }
                let mut v = 0u64;
                b.iter(|| {
                    v = v.wrapping_add(1);
                    flow.set(black_box(v));
                });
            },
        );
    }

    group.finish();
}

fn benchmark_map_chain(c: &mut Criterion) {
    c.bench_function("map_chain_depth_4", |b| {
        let head = ValueFlow::new("head", 0i64);
        let tail = head
            .pipe(Rc::new(Map::new(|v: &i64| v + 1)))
            .pipe(Rc::new(Map::new(|v: &i64| v * 2)))
            .pipe(Rc::new(Map::new(|v: &i64| v - 3)))
            .pipe(Rc::new(Map::new(|v: &i64| v / 2)));
        let out = Rc::new(LastValueSink::<i64>::new());
        tail.subscribe(&out);

        b.iter(|| {
            head.set(black_box(41));
        });
    });
}

fn benchmark_async_flow_push_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("async_flow_push_drain");

    for batch in [1usize, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let flow = AsyncFlow::<u32>::new("bench", 64).unwrap();
            let out = Rc::new(LastValueSink::new());
            flow.subscribe(&out);
            let sender = flow.sender();

            b.iter(|| {
                for v in 0..batch as u32 {
                    sender.push(black_box(v));
                }
                flow.request();
            });
        });
    }

    group.finish();
}

fn benchmark_isr_push(c: &mut Criterion) {
    c.bench_function("async_flow_isr_push", |b| {
        let flow = AsyncFlow::<u32>::new("isr", 32).unwrap();
        let sender = flow.sender();
        let mut v = 0u32;

        b.iter(|| {
            v = v.wrapping_add(1);
            sender.push_from_isr(black_box(v));
        });
    });
}

criterion_group!(
    benches,
    benchmark_value_flow_fanout,
    benchmark_map_chain,
    benchmark_async_flow_push_drain,
    benchmark_isr_push
);
criterion_main!(benches);
