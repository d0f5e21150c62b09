use criterion::{Criterion, criterion_group, criterion_main};
use std::time::Duration;
use tempo_core::trace::{MetricName, OverwritePolicy, ServerTiming, TimingMetric};

fn criterion_benchmark(c: &mut Criterion) {
    let header_value = r#"cache;desc="Cache Read";dur=23.2,db;dur=53,app;dur=47.2,miss"#;
    let metrics = [
        TimingMetric::new(
            MetricName::with_description("db", "Database").unwrap(),
            Some(Duration::from_micros(41_250)),
        ),
        TimingMetric::new(
            MetricName::new("render").unwrap(),
            Some(Duration::from_micros(2_464)),
        ),
    ];
    c.bench_function("server_timing_parse", |b| {
        b.iter(|| ServerTiming::parse(header_value))
    });
    c.bench_function("server_timing_merge_replace", |b| {
        b.iter(|| {
            let mut server_timing = ServerTiming::parse(header_value);
            server_timing.merge(&metrics, OverwritePolicy::Replace);
            server_timing.to_string()
        })
    });
    c.bench_function("server_timing_format", |b| {
        b.iter(|| metrics.iter().collect::<ServerTiming>().to_string())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
