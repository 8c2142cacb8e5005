//! Tick benchmarks for Posecast.
//!
//! One tick is sample, encode and broadcast. The interval budget at
//! 30 Hz is ~33 ms; these numbers show how much of it is spent here.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use posecast_core::{
    Broadcaster, ChannelSink, ClientRegistry, ClientSession, PoseStreamer, SimulatedPoseSource,
};
use posecast_protocol::{PoseEncoder, WireFormat};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_tick(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("tick");

    for format in WireFormat::ALL {
        let registry = Arc::new(ClientRegistry::new());
        for _ in 0..32 {
            let (sink, mut rx) = ChannelSink::new(1024, Duration::from_millis(250));
            registry.register(Arc::new(ClientSession::new(sink)));
            rt.spawn(async move { while rx.recv().await.is_some() {} });
        }

        let streamer = PoseStreamer::new(
            Arc::new(SimulatedPoseSource::new("tracker_1", 1.0, Duration::from_secs(8))),
            PoseEncoder::new(format, "tracker_1"),
            "tracker_1",
            Broadcaster::new(registry),
        );

        group.bench_function(BenchmarkId::new("32_sessions", format), |b| {
            b.iter(|| rt.block_on(streamer.tick()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
