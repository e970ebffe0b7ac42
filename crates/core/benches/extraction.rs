use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use waymark_core::{Document, HeuristicClassifier, extract_metadata, parse_index_response};

fn bench_parse(c: &mut Criterion) {
    let small = std::fs::read_to_string("../../tests/fixtures/minimal.html").unwrap();
    let archived = std::fs::read_to_string("../../tests/fixtures/archived_page.html").unwrap();
    let large = archived.repeat(200);

    let mut group = c.benchmark_group("parse");

    group.bench_with_input(BenchmarkId::new("small", "100B"), &small, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.bench_with_input(BenchmarkId::new("archived", "2KB"), &archived, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.bench_with_input(BenchmarkId::new("large", "400KB"), &large, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.finish();
}

fn bench_metadata(c: &mut Criterion) {
    let html = std::fs::read_to_string("../../tests/fixtures/archived_page.html").unwrap();

    c.bench_function("extract_metadata", |b| b.iter(|| extract_metadata(black_box(&html))));
}

#[cfg(feature = "cleanup")]
fn bench_cleanup(c: &mut Criterion) {
    let html = std::fs::read_to_string("../../tests/fixtures/archived_page.html").unwrap();

    c.bench_function("strip_archive_chrome", |b| {
        b.iter(|| waymark_core::strip_archive_chrome(black_box(&html)))
    });
}

#[cfg(not(feature = "cleanup"))]
fn bench_cleanup(_c: &mut Criterion) {}

fn bench_index_decode(c: &mut Criterion) {
    let mut rows = vec![r#"["timestamp","original","mimetype","statuscode","digest","length"]"#.to_string()];
    for i in 0..500 {
        rows.push(format!(
            r#"["2024010100{:04}","http://example.com/","text/html","200","DIGEST{}","1024"]"#,
            i,
            i / 3
        ));
    }
    let body = format!("[{}]", rows.join(","));

    c.bench_function("parse_index_response", |b| {
        b.iter(|| parse_index_response(black_box(&body), true))
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = HeuristicClassifier::default();

    c.bench_function("heuristic_classify", |b| {
        b.iter(|| {
            classifier.classify(
                black_box("example-hardware.com"),
                black_box("Example Hardware Store | Tools & Supplies"),
                black_box("Family-run hardware store since 1962."),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_metadata,
    bench_cleanup,
    bench_index_decode,
    bench_classify
);
criterion_main!(benches);
