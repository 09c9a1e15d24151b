use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use forgery::domain::entity::IdStrategy;
use forgery::engine::{ForgeOptions, GenerationEngine};
use forgery::schema::SchemaExtractor;
use std::path::PathBuf;

const SOURCE: &str = r#"
interface Address {
    /** @faker location.street */
    street: string;
    /** @faker location.city */
    city: string;
    zip: string;
}

/** @id uuid */
export interface Customer {
    /** @faker person.fullName */
    name: string;
    /** @faker internet.email */
    email: string;
    /** @faker number.int({ min: 18, max: 90 }) */
    age: number;
    address: Address;
    tags: string[];
    tier: "free" | "pro" | "enterprise";
}
"#;

fn benchmark_extraction(c: &mut Criterion) {
    let extractor = SchemaExtractor::default();
    let sources = vec![(PathBuf::from("customer.ts"), SOURCE.to_string())];

    c.bench_function("extract_customer", |b| {
        b.iter(|| extractor.extract_sources(black_box(&sources)).unwrap());
    });
}

fn benchmark_forge(c: &mut Criterion) {
    let registry = SchemaExtractor::default()
        .extract_sources(&[(PathBuf::from("customer.ts"), SOURCE.to_string())])
        .unwrap();
    let customer = registry.get("customer").unwrap();
    let engine = GenerationEngine::default();
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("forge_customer");
    for count in [1i64, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let options = ForgeOptions {
                count: Some(count),
                id_strategy: Some(IdStrategy::Uuid),
            };
            b.to_async(&rt)
                .iter(|| async { engine.forge(black_box(&customer.schema), options).await.unwrap() });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_extraction, benchmark_forge);
criterion_main!(benches);
