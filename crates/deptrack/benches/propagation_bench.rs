//! Benchmarks for observation and change propagation.
//!
//! Run with: cargo bench -p deptrack

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use deptrack::{Dep, Subscriber, Value, observe, with_active_subscriber};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tally {
    hits: Cell<u64>,
}

impl Subscriber for Tally {
    fn register_dependency(&self, _dep: &Rc<Dep>) {}
    fn notify_of_change(&self) {
        self.hits.set(self.hits.get() + 1);
    }
}

fn subscribers(count: usize) -> Vec<Rc<dyn Subscriber>> {
    (0..count)
        .map(|_| Rc::new(Tally::default()) as Rc<dyn Subscriber>)
        .collect()
}

/// `{"n0": {"n1": ... {"leaf": 0}}}` nested `depth` levels.
fn nested_doc(depth: usize) -> serde_json::Value {
    (0..depth).rev().fold(json!({"leaf": 0}), |inner, level| {
        let mut map = serde_json::Map::new();
        map.insert(format!("n{level}"), inner);
        map.insert("pad".to_string(), json!(level));
        serde_json::Value::Object(map)
    })
}

// ---------------------------------------------------------------------------
// 1. Notify fan-out
// ---------------------------------------------------------------------------

fn bench_notify_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("dep/notify");

    for count in [1usize, 16, 256, 4_096] {
        group.throughput(Throughput::Elements(count as u64));
        let dep = Dep::new();
        let subs = subscribers(count);
        for sub in &subs {
            dep.add_subscriber(sub);
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), &(), |b, _| {
            b.iter(|| dep.notify())
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Observe a fresh graph
// ---------------------------------------------------------------------------

fn bench_observe_deep(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe/deep");

    for depth in [4usize, 32, 128] {
        let doc = nested_doc(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &doc, |b, doc| {
            b.iter_batched(
                || Value::from(doc.clone()),
                |value| black_box(observe(&value, false)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_observe_wide_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe/array");

    for len in [16usize, 256, 4_096] {
        group.throughput(Throughput::Elements(len as u64));
        let doc = serde_json::Value::Array((0..len).map(|i| json!({"id": i})).collect());
        group.bench_with_input(BenchmarkId::from_parameter(len), &doc, |b, doc| {
            b.iter_batched(
                || Value::from(doc.clone()),
                |value| black_box(observe(&value, false)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Tracked read + write
// ---------------------------------------------------------------------------

fn bench_tracked_write(c: &mut Criterion) {
    let state = Value::from(json!({"count": 0}));
    observe(&state, false);
    let Some(obj) = state.as_object().cloned() else {
        return;
    };
    let sub = subscribers(1).remove(0);
    with_active_subscriber(&sub, || obj.get("count"));

    let mut next = 0i32;
    c.bench_function("interceptor/write_notify", |b| {
        b.iter(|| {
            next = next.wrapping_add(1);
            obj.set("count", Value::from(next));
        })
    });

    c.bench_function("interceptor/tracked_read", |b| {
        b.iter(|| with_active_subscriber(&sub, || black_box(obj.get("count"))))
    });
}

criterion_group!(
    benches,
    bench_notify_fanout,
    bench_observe_deep,
    bench_observe_wide_array,
    bench_tracked_write
);
criterion_main!(benches);
