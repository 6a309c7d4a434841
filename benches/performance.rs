use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use evgraph::*;

fn make_source(rows: usize) -> MemorySource {
    let x = (0..rows).map(|i| Scalar::F64((i % 500) as f64)).collect();
    let w = (0..rows).map(|i| Scalar::F64(1.0 + (i % 7) as f64 / 10.0)).collect();
    let source = MemorySource::new();
    source
        .insert("events", RowBatch::new(vec![Column::new("x", x), Column::new("w", w)]))
        .expect("insert events");
    source
}

fn make_engine(rows: usize, npartitions: usize, parallel: usize) -> Engine {
    let cfg = EngineConfig {
        npartitions,
        max_parallel_tasks: parallel,
        ..Default::default()
    };
    Engine::new(cfg, Arc::new(make_source(rows)))
        .expect("engine")
        .with_sink(Arc::new(MemorySink::new()))
}

/// Filter, two varied columns, a histogram with variations and a count.
fn varied_pass(engine: &Engine) -> Arc<VariantResult> {
    let df = engine
        .dataframe(DatasetSpec::single("events"))
        .expect("dataframe");
    let sel = df
        .filter(col("x").gt(lit(25.0)))
        .and_then(|f| f.vary("w", vec![col("w").mul(lit(1.1)), col("w").mul(lit(0.9))], ["w_up", "w_down"]))
        .and_then(|f| f.vary("x", vec![col("x").add(lit(1.0))], ["x_shift"]))
        .expect("graph");
    let h = sel
        .histo1d(HistoModel::new("h_x", 50, 0.0, 500.0), "x", Some("w"))
        .expect("histo1d");
    let n = sel.count().expect("count");
    let vars = variations_for(&h).expect("variations");
    let out = vars.result().expect("trigger");
    black_box(n.value().expect("count value"));
    out
}

fn bench_partition_passes(c: &mut Criterion) {
    let inline = make_engine(20_000, 1, 1);
    let parallel = make_engine(20_000, 8, 4);

    c.bench_function("varied_pass_20k_inline", |b| {
        b.iter(|| black_box(varied_pass(&inline)))
    });
    c.bench_function("varied_pass_20k_8_partitions", |b| {
        b.iter(|| black_box(varied_pass(&parallel)))
    });
}

criterion_group!(benches, bench_partition_passes);
criterion_main!(benches);
