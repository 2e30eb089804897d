use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use coalesce_core::Observation;
use coalesce_infra::contact_store::InMemoryContactStore;
use coalesce_infra::resolver::Resolver;
use tokio::runtime::Runtime;

fn obs(email: Option<&str>, phone: Option<&str>) -> Observation {
    Observation::new(email.map(str::to_owned), phone.map(str::to_owned))
}

fn bench_resolution_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolution_latency");
    group.sample_size(1000);

    // Benchmark: first observation of an identity (insert path)
    group.bench_function("fresh_identity", |b| {
        let resolver = Resolver::new(InMemoryContactStore::new());
        let mut n: u64 = 0;
        b.iter(|| {
            n += 1;
            let email = format!("user{n}@example.com");
            let view = rt
                .block_on(resolver.resolve(obs(Some(black_box(email.as_str())), None)))
                .unwrap();
            black_box(view)
        });
    });

    // Benchmark: exact repeat of a known observation (read-only path)
    group.bench_function("repeat_observation", |b| {
        let resolver = Resolver::new(InMemoryContactStore::new());
        rt.block_on(resolver.resolve(obs(Some("repeat@example.com"), Some("555-0100"))))
            .unwrap();
        b.iter(|| {
            let view = rt
                .block_on(resolver.resolve(obs(Some("repeat@example.com"), Some("555-0100"))))
                .unwrap();
            black_box(view)
        });
    });

    // Benchmark: bridging observation that demotes one of two primaries
    group.bench_function("cluster_merge", |b| {
        b.iter(|| {
            let resolver = Resolver::new(InMemoryContactStore::new());
            rt.block_on(resolver.resolve(obs(Some("a@example.com"), None)))
                .unwrap();
            rt.block_on(resolver.resolve(obs(None, Some("555-0100"))))
                .unwrap();
            let view = rt
                .block_on(resolver.resolve(obs(Some("a@example.com"), Some("555-0100"))))
                .unwrap();
            black_box(view)
        });
    });

    group.finish();
}

fn bench_cluster_consolidation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cluster_consolidation");

    for cluster_size in [2, 16, 64, 256].iter() {
        group.throughput(Throughput::Elements(*cluster_size as u64));
        group.bench_with_input(
            BenchmarkId::new("resolve_known_member", cluster_size),
            cluster_size,
            |b, &size| {
                let resolver = Resolver::new(InMemoryContactStore::new());
                // Grow one cluster to the target size: a shared email with a
                // distinct phone per record.
                for i in 0..size {
                    let phone = format!("555-{i:04}");
                    rt.block_on(
                        resolver.resolve(obs(Some("anchor@example.com"), Some(phone.as_str()))),
                    )
                    .unwrap();
                }

                b.iter(|| {
                    let view = rt
                        .block_on(resolver.resolve(obs(Some("anchor@example.com"), None)))
                        .unwrap();
                    black_box(view)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_resolution_latency,
    bench_cluster_consolidation
);
criterion_main!(benches);
