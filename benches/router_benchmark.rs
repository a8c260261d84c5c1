//! Benchmarks for the conversion router.
//!
//! Run with: cargo bench
//!
//! Everything here runs through the in-process typeset backend with
//! in-memory output, so no external engine is needed.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use topdf::{Config, InputValidator, MemorySink, Options, Router};

/// Creates CSV content with the given number of data rows.
fn create_test_csv(rows: usize) -> String {
    let mut csv = String::from("id,name,department,salary\n");
    for i in 0..rows {
        csv.push_str(&format!("{i},Employee {i},\"Dept, {}\",{}\n", i % 7, 40_000 + i * 13));
    }
    csv
}

/// Creates plain text with the given number of paragraphs.
fn create_test_text(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| format!("Paragraph {i}. The quick brown fox jumps over the lazy dog. ").repeat(6))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn router() -> Router {
    let mut config = Config::new();
    config.set("logging", serde_json::json!({ "enabled": false }));
    Router::new(config)
        .expect("default configuration")
        .with_sink(Arc::new(MemorySink::new()))
}

/// Benchmark CSV shape validation.
fn bench_csv_validation(c: &mut Criterion) {
    let validator = InputValidator::default();
    let options = Options::new();
    let mut group = c.benchmark_group("csv_validation");

    for rows in [10, 1_000].iter() {
        let csv = create_test_csv(*rows);
        group.bench_function(format!("{rows}_rows"), |b| {
            b.iter(|| validator.validate_csv(black_box(&csv), &options).unwrap());
        });
    }

    group.finish();
}

/// Benchmark text typesetting at various sizes.
fn bench_text_conversion(c: &mut Criterion) {
    let router = router();
    let options = Options::new();
    let mut group = c.benchmark_group("text_conversion");

    for paragraphs in [1, 20, 200].iter() {
        let text = create_test_text(*paragraphs);
        group.bench_function(format!("{paragraphs}_paragraphs"), |b| {
            b.iter(|| router.convert_text(black_box(&text), None, &options).unwrap());
        });
    }

    group.finish();
}

/// Benchmark CSV table rendering.
fn bench_csv_conversion(c: &mut Criterion) {
    let router = router();
    let options = Options::new();
    let csv = create_test_csv(200);

    c.bench_function("csv_200_rows", |b| {
        b.iter(|| router.convert_csv(black_box(&csv), None, &options).unwrap());
    });
}

/// Benchmark HTML flattening and rendering.
fn bench_html_conversion(c: &mut Criterion) {
    let router = router();
    let options = Options::new();
    let html = format!(
        "<html><head><title>Bench</title></head><body><h1>Report</h1>{}</body></html>",
        "<p>Some <b>bold</b> and <i>italic</i> text.</p><ul><li>one</li><li>two</li></ul>"
            .repeat(50)
    );

    c.bench_function("html_report", |b| {
        b.iter(|| router.convert_html(black_box(&html), None, &options).unwrap());
    });
}

criterion_group!(
    benches,
    bench_csv_validation,
    bench_text_conversion,
    bench_csv_conversion,
    bench_html_conversion,
);
criterion_main!(benches);
