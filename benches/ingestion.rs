use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use txt2sqlite::config::LoadOptions;
use txt2sqlite::ingestion::{RowDecoder, ingest_reader, parse_descriptors};
use txt2sqlite::store::SqliteStore;
use txt2sqlite::types::TableSchema;

fn generate(rows: usize) -> String {
    let mut out = String::from("# id name age income\n# iu s i f\n");
    for i in 0..rows {
        out.push_str(&format!("{i} name{i} {} {}.25\n", 20 + i % 60, 1000 + i % 9000));
    }
    out
}

fn bench_decode(c: &mut Criterion) {
    let opts = LoadOptions::default();
    let columns = parse_descriptors("id name age income", "iu s i f", &opts).unwrap();
    let schema = TableSchema::new("bench", columns);
    let decoder = RowDecoder::new(&schema, &opts).unwrap();

    c.bench_function("decode_line", |b| {
        b.iter(|| decoder.decode(black_box("123456 somebody 42 52311.75")).unwrap())
    });
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_in_memory");
    for rows in [1_000usize, 10_000] {
        let input = generate(rows);
        group.throughput(Throughput::Elements(rows as u64));
        for batch_size in [1usize, 1_000] {
            let opts = LoadOptions {
                batch_size,
                ..Default::default()
            };
            group.bench_with_input(BenchmarkId::new(format!("batch_{batch_size}"), rows), &input, |b, input| {
                b.iter(|| {
                    let mut store = SqliteStore::open_in_memory(&opts).unwrap();
                    ingest_reader(&mut store, input.as_bytes(), "bench", "bench", &opts).unwrap()
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_ingest);
criterion_main!(benches);
