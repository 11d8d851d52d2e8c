//! Intent Classifier Performance Benchmarks
//!
//! Benchmarks for routing and classifying utterances against catalogs of
//! different sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeSet;
use tabletalk::IntentClassifier;

fn catalog(size: usize) -> BTreeSet<String> {
    let mut tables: BTreeSet<String> = (0..size).map(|i| format!("table_{i}")).collect();
    tables.insert("web_items".to_string());
    tables
}

fn bench_route(c: &mut Criterion) {
    let classifier = IntentClassifier::default();

    c.bench_function("route_count_records", |b| {
        b.iter(|| classifier.route(black_box("How many records are in web_items?")));
    });

    c.bench_function("route_out_of_domain", |b| {
        b.iter(|| classifier.route(black_box("Who won the football match last night?")));
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = IntentClassifier::default();
    let mut group = c.benchmark_group("classify_with_catalog");

    for size in [10, 100, 1000] {
        let tables = catalog(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tables, |b, tables| {
            b.iter(|| classifier.classify(black_box("Show me sample data from WEB_ITEMS"), tables));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_route, bench_classify);
criterion_main!(benches);
