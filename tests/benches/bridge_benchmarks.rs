//! # Plugin Bridge Benchmarks
//!
//! | Benchmark | Measures |
//! |-----------|----------|
//! | `codec/encode_shapes` | caller-side argument encoding |
//! | `codec/decode_shapes` | service-side argument decoding |
//! | `bridge/round_trip` | one sync call through runtime and bus |

use bridge_runtime::BridgeRuntime;
use bridge_service::InMemoryHost;
use bridge_tests::fixtures::{spheres, wait_for_listener};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_bus::InMemoryMessageBus;
use shared_types::{ops, plugin_api, ApiValue, BridgeConfig};
use std::sync::Arc;

fn bench_shape_codec(c: &mut Criterion) {
    let registry = plugin_api().unwrap();
    let descriptor = registry.lookup(ops::UPLOAD_SHAPES).unwrap();

    let mut group = c.benchmark_group("codec");
    for count in [1usize, 100, 1_000] {
        let args = vec![ApiValue::from_typed(&spheres(count)).unwrap()];
        let wire = descriptor.encode_args(&args).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("encode_shapes", count), &args, |b, args| {
            b.iter(|| descriptor.encode_args(black_box(args)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode_shapes", count), &wire, |b, wire| {
            b.iter(|| descriptor.decode_args(black_box(wire)).unwrap())
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = Arc::new(InMemoryMessageBus::new());
    let runtime = rt.block_on(async {
        let runtime = BridgeRuntime::new(
            BridgeConfig::default(),
            bus.clone(),
            Arc::new(InMemoryHost::new()),
        )
        .unwrap();
        runtime.start().unwrap();
        wait_for_listener(&bus, &runtime.config().request_channel).await;
        runtime
    });
    let client = runtime.client();

    c.bench_function("bridge/round_trip", |b| {
        b.iter(|| rt.block_on(client.get_plugin_data()).unwrap())
    });

    rt.block_on(runtime.shutdown()).unwrap();
}

criterion_group!(benches, bench_shape_codec, bench_round_trip);
criterion_main!(benches);
