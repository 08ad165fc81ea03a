use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn classifier_benchmark(c: &mut Criterion) {
    c.bench_function("classify command not found", |b| {
        b.iter(|| aish::classifier::classify(black_box(127), black_box(""), black_box("bash: gti: command not found")))
    });

    c.bench_function("classify generic error", |b| {
        b.iter(|| aish::classifier::classify(black_box(1), black_box(""), black_box("something went wrong")))
    });
}

fn extractor_benchmark(c: &mut Criterion) {
    let fenced = "Here you go:\n```json\n{\"explanation\": \"typo\", \"command\": \"git status\"}\n```\nLet me know if that helps.";

    c.bench_function("extract json from fenced block", |b| {
        b.iter(|| aish::extractor::extract_json(black_box(fenced)))
    });

    c.bench_function("extract json from clean payload", |b| {
        b.iter(|| aish::extractor::extract_json(black_box(r#"{"command": "ls -la"}"#)))
    });
}

criterion_group!(benches, classifier_benchmark, extractor_benchmark);
criterion_main!(benches);
