// benches/error_performance.rs
//! Benchmarks for flagged_errors hot paths
//!
//! Covers flag lookups, status mapping, wrapping (with each trace mode),
//! merging and log rendering.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flagged_errors::{
    BoxError, ClassificationRegistry, ClassifierConfig, ErrFlag, ErrorBuilder, ErrorLog, StatusMapper,
    StructuredError, TraceMode,
};
use std::error::Error;
use std::fmt;

#[derive(Debug)]
struct RepoError;

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("row lookup failed")
    }
}

impl Error for RepoError {}

fn registry_with(mode: TraceMode) -> ClassificationRegistry {
    ClassificationRegistry::with_config(ClassifierConfig {
        trace_mode: mode,
        ..ClassifierConfig::default()
    })
    .expect("default config is valid")
}

// ============================================================================
// FLAG LOOKUP BENCHMARKS
// ============================================================================

fn bench_get_flags(c: &mut Criterion) {
    let registry = registry_with(TraceMode::Off);
    let flags = registry.flags();
    flags.set_flags_by_type::<RepoError>(ErrFlag::NOT_FOUND);

    let own = ErrorBuilder::new().with_flags(ErrFlag::CONFLICT).error("own");
    flags.set_flags_by_instance(&own, ErrFlag::BAD_REQUEST);

    let mut group = c.benchmark_group("get_flags");
    group.bench_function("by_type", |b| b.iter(|| black_box(flags.get_flags(black_box(&RepoError)))));
    group.bench_function("all_sources", |b| b.iter(|| black_box(flags.get_flags(black_box(&own)))));
    group.bench_function("matches", |b| {
        b.iter(|| black_box(flags.matches(black_box(&own), ErrFlag::BAD_REQUEST)))
    });
    group.finish();
}

fn bench_instance_registration(c: &mut Criterion) {
    let registry = registry_with(TraceMode::Off);
    let flags = registry.flags();

    c.bench_function("register_and_deregister_instance", |b| {
        b.iter(|| {
            let err = ErrorBuilder::new().error("transient");
            flags.set_flags_by_instance(&err, ErrFlag::OPERATION_TIMEOUT);
            flags.deregister_instance(&err);
        })
    });
}

// ============================================================================
// MAPPING BENCHMARKS
// ============================================================================

fn bench_status_mapping(c: &mut Criterion) {
    let mapper = StatusMapper::new();
    let mut group = c.benchmark_group("status_mapping");

    group.bench_function("to_status", |b| b.iter(|| black_box(mapper.to_status(black_box(ErrFlag::NOT_FOUND)))));
    group.bench_function("to_flags", |b| b.iter(|| black_box(mapper.to_flags(black_box(409)))));
    group.bench_function("set_mapping_default", |b| {
        b.iter(|| mapper.set_mapping(flagged_errors::default_mapping()).expect("valid mapping"))
    });

    let composite: Vec<(ErrFlag, u16)> = (0..32).map(|bit| (ErrFlag::bit(bit), 400 + bit as u16)).collect();
    group.bench_function("set_mapping_32_bits", |b| {
        b.iter(|| mapper.set_mapping(composite.iter().copied()).expect("valid mapping"))
    });
    group.finish();
}

// ============================================================================
// WRAP BENCHMARKS
// ============================================================================

fn bench_wrap_by_trace_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrap_foreign");

    for (label, mode) in [("off", TraceMode::Off), ("caller", TraceMode::Caller), ("full", TraceMode::Full)] {
        let registry = registry_with(mode);
        registry.flags().set_flags_by_type::<RepoError>(ErrFlag::NOT_FOUND);

        group.bench_with_input(BenchmarkId::from_parameter(label), &registry, |b, registry| {
            b.iter(|| black_box(registry.wrap_with_message(RepoError, "loading user")))
        });
    }
    group.finish();
}

fn bench_wrap_message_heuristics(c: &mut Criterion) {
    let registry = registry_with(TraceMode::Off);

    c.bench_function("wrap_unflagged_heuristic", |b| {
        b.iter(|| black_box(registry.wrap(black_box("request timed out after 30s"))))
    });
}

fn bench_rewrap(c: &mut Criterion) {
    let registry = registry_with(TraceMode::Caller);

    c.bench_function("rewrap_structured", |b| {
        b.iter_with_setup(
            || registry.wrap(RepoError),
            |err| black_box(registry.wrap_with_message(err, "outer")),
        )
    });
}

// ============================================================================
// MERGE BENCHMARKS
// ============================================================================

fn bench_merge(c: &mut Criterion) {
    let registry = registry_with(TraceMode::Off);
    let mut group = c.benchmark_group("merge");

    for count in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    (0..count)
                        .map(|i| {
                            let code = if i % 2 == 0 { 400 } else { 404 };
                            Some(Box::new(registry.wrap_with_code(RepoError, code, "")) as BoxError)
                        })
                        .collect::<Vec<_>>()
                },
                |errors| black_box(registry.merge(errors)),
            )
        });
    }
    group.finish();
}

// ============================================================================
// SERIALIZATION AND LOGGING BENCHMARKS
// ============================================================================

fn bench_payload(c: &mut Criterion) {
    let registry = registry_with(TraceMode::Caller);
    let err = registry.wrap(ErrorBuilder::new().with_flags(ErrFlag::CONFLICT).error("duplicate order"));

    let mut group = c.benchmark_group("payload");
    group.bench_function("to_json", |b| b.iter(|| black_box(err.to_json().expect("serializable"))));
    group.bench_function("sanitized_payload", |b| {
        b.iter(|| black_box(registry.payload(&err).expect("serializable")))
    });
    group.finish();
}

fn bench_log_truncation(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_truncation");

    for size in [100, 1024, 5000, 10000] {
        let err = StructuredError::new(500, "", "A".repeat(size));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut buffer = String::new();
                ErrorLog::new(&err).write_to(&mut buffer).expect("write to string");
                black_box(buffer);
            })
        });
    }
    group.finish();
}

criterion_group!(lookup_benches, bench_get_flags, bench_instance_registration);

criterion_group!(mapping_benches, bench_status_mapping);

criterion_group!(
    wrap_benches,
    bench_wrap_by_trace_mode,
    bench_wrap_message_heuristics,
    bench_rewrap,
);

criterion_group!(merge_benches, bench_merge);

criterion_group!(output_benches, bench_payload, bench_log_truncation);

criterion_main!(
    lookup_benches,
    mapping_benches,
    wrap_benches,
    merge_benches,
    output_benches,
);
