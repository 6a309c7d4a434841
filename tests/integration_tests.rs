//! End-to-end integration tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use evgraph::evgraph_exec::InlinePool;
use evgraph::*;

/// `x` = entry index, `w` = 1.0 + index / 100.
fn events(rows: usize) -> MemorySource {
    let source = MemorySource::new();
    let x = (0..rows).map(|i| Scalar::F64(i as f64)).collect();
    let w = (0..rows).map(|i| Scalar::F64(1.0 + i as f64 / 100.0)).collect();
    source
        .insert("events", RowBatch::new(vec![Column::new("x", x), Column::new("w", w)]))
        .expect("Failed to insert events");
    source
}

fn engine(source: MemorySource, npartitions: usize, parallel: usize) -> (Engine, MemorySink) {
    let sink = MemorySink::new();
    let cfg = EngineConfig {
        npartitions,
        max_parallel_tasks: parallel,
        ..Default::default()
    };
    let engine = Engine::new(cfg, Arc::new(source))
        .expect("Failed to build engine")
        .with_sink(Arc::new(sink.clone()));
    (engine, sink)
}

fn histogram(r: &ActionResult) -> Histogram1D {
    r.as_histogram().cloned().expect("not a histogram")
}

fn weighted_x_histogram(df: &Frame) -> ResultHandle {
    df.filter(col("x").gt(lit(25.0)))
        .and_then(|f| f.define("weight", lit(5.0)))
        .and_then(|f| f.histo1d(HistoModel::new("h_x", 25, 50.0, 550.0), "x", Some("weight")))
        .expect("Failed to build graph")
}

#[test]
fn test_filter_histogram_one_vs_four_partitions() {
    let (e1, _) = engine(events(100), 1, 1);
    let (e4, _) = engine(events(100), 4, 4);
    let df1 = e1.dataframe(DatasetSpec::single("events")).unwrap();
    let df4 = e4.dataframe(DatasetSpec::single("events")).unwrap();

    let kept = df1.filter(col("x").gt(lit(25.0))).unwrap().count().unwrap();
    let h1 = weighted_x_histogram(&df1);
    let h4 = weighted_x_histogram(&df4);

    assert_eq!(kept.value().unwrap().as_count(), Some(74));
    let a = histogram(&h1.value().unwrap());
    let b = histogram(&h4.value().unwrap());
    assert_eq!(a, b);
    // 26..50 underflows; 50..70 and 70..90 fill bins 1 and 2; 90..100 fills bin 3.
    assert_eq!(a.underflow(), 24.0 * 5.0);
    assert_eq!(a.bin_content(1), 100.0);
    assert_eq!(a.bin_content(2), 100.0);
    assert_eq!(a.bin_content(3), 50.0);
    assert_eq!(a.integral(), 250.0);
    assert_eq!(e4.partition_passes(), 4);
}

#[test]
fn test_merge_is_invariant_under_repartitioning() {
    let mut results = Vec::new();
    for policy in [
        PartitionPolicy::Count(2),
        PartitionPolicy::Count(4),
        PartitionPolicy::Explicit(vec![0..7, 7..61, 61..62, 62..100]),
    ] {
        let (e, _) = engine(events(100), 2, 3);
        let df = e.dataframe(DatasetSpec::single("events")).unwrap();
        df.set_partition_policy(policy).unwrap();
        let h = df
            .histo1d(HistoModel::new("h_w", 10, 1.0, 2.0), "w", Some("x"))
            .unwrap();
        results.push(h.value().unwrap());
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn test_inline_and_rayon_pools_agree() {
    let (inline, _) = engine(events(50), 5, 4);
    let inline = inline.with_pool(Arc::new(InlinePool));
    let (rayon, _) = engine(events(50), 5, 4);
    let read = |e: &Engine| {
        let df = e.dataframe(DatasetSpec::single("events")).unwrap();
        df.define("xw", col("x").mul(col("w")))
            .and_then(|f| f.sum("xw"))
            .and_then(|h| h.value())
            .unwrap()
    };
    assert_eq!(read(&inline), read(&rayon));
}

#[test]
fn test_two_actions_cost_one_pass_per_partition() {
    let (e, _) = engine(events(100), 4, 2);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let sel = df.filter(col("x").lt(lit(60.0))).unwrap();
    let n = sel.count().unwrap();
    let h = sel
        .histo1d(HistoModel::new("h", 6, 0.0, 60.0), "x", None)
        .unwrap();

    assert_eq!(e.partition_passes(), 0);
    assert_eq!(h.value().unwrap().as_histogram().map(|h| h.integral()), Some(60.0));
    assert_eq!(n.value().unwrap().as_count(), Some(60));
    assert_eq!(e.partition_passes(), 4);

    let runs = df.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].partitions, 4);
    assert_eq!(runs[0].actions, 2);
}

#[test]
fn test_nominal_variation_equals_graph_without_vary() {
    let (e, _) = engine(events(100), 4, 2);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let model = HistoModel::new("h_w", 20, 0.0, 100.0);

    let varied = df
        .vary(
            "w",
            vec![col("w").mul(lit(1.1)), col("w").mul(lit(0.9))],
            ["w_up", "w_down"],
        )
        .unwrap()
        .histo1d(model.clone(), "x", Some("w"))
        .unwrap();
    let plain = df.histo1d(model, "x", Some("w")).unwrap();
    let vars = variations_for(&varied).unwrap();

    assert_eq!(vars.tags(), vec!["nominal", "w_down", "w_up"]);
    let all = vars.result().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.nominal(), Some(&plain.value().unwrap()));
    let up = histogram(&vars.get("w_up").unwrap());
    let nominal = histogram(&vars.get("nominal").unwrap());
    assert!(up.integral() > nominal.integral());
    assert_eq!(up.entries, nominal.entries);
    // varied, plain and the variations sibling ran together.
    assert_eq!(e.partition_passes(), 4);
}

#[test]
fn test_two_vary_nodes_stay_linear() {
    // One partition keeps the float summation order of the expected values.
    let (e, _) = engine(events(10), 1, 1);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let s = df
        .vary("x", vec![col("x").add(lit(1.0))], ["x_up"])
        .and_then(|f| f.vary("w", vec![lit(0.0)], ["w_zero"]))
        .and_then(|f| f.define("xw", col("x").mul(col("w"))))
        .and_then(|f| f.sum("xw"))
        .unwrap();
    let vars = variations_for(&s).unwrap();
    let all = vars.result().unwrap();

    assert_eq!(all.tags(), vec!["nominal", "w_zero", "x_up"]);
    let sum = |tag: &str| all.get(tag).and_then(|r| r.as_sum()).unwrap();
    let nominal: f64 = (0..10).map(|i| i as f64 * (1.0 + i as f64 / 100.0)).sum();
    let x_up: f64 = (0..10).map(|i| (i as f64 + 1.0) * (1.0 + i as f64 / 100.0)).sum();
    assert_eq!(sum("nominal"), nominal);
    assert_eq!(sum("x_up"), x_up);
    // w_zero applies only its own alternative; x stays nominal.
    assert_eq!(sum("w_zero"), 0.0);
}

#[test]
fn test_vary_errors_are_raised_at_build_time() {
    let (e, _) = engine(events(10), 2, 1);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();

    let err = df.vary("w", vec![lit(1.0), lit(2.0)], ["only_one"]).unwrap_err();
    assert!(matches!(err, Error::TagArityMismatch { expressions: 2, tags: 1, .. }));

    let up = df.vary("w", vec![lit(1.0)], ["up"]).unwrap();
    let err = up.vary("x", vec![lit(1.0)], ["up"]).unwrap_err();
    assert!(matches!(err, Error::DuplicateTag(t) if t == "up"));
    let err = df.vary("x", vec![lit(1.0)], ["nominal"]).unwrap_err();
    assert!(matches!(err, Error::DuplicateTag(_)));

    assert!(matches!(
        df.vary("missing", vec![lit(1.0)], ["t"]),
        Err(Error::UndefinedColumn(_))
    ));
    assert!(matches!(
        df.define("y", call("nope", vec![col("x")])),
        Err(Error::UndefinedFunction(_))
    ));
    assert!(matches!(df.filter(col("x").add(lit(1.0))), Err(Error::TypeMismatch(_))));
    assert_eq!(e.partition_passes(), 0);
}

#[test]
fn test_clone_then_respec_leaves_original_result_untouched() {
    let (e, _) = engine(events(100), 2, 2);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let sum = df.sum("x").unwrap();
    let original = sum.result().unwrap();
    assert_eq!(sum.spec_version(), Some(SpecVersion(0)));

    let clone = clone_result_and_action(&sum).unwrap();
    assert!(!clone.is_ready());
    assert_eq!(clone.phase().unwrap(), Phase::Bound);
    assert_eq!(clone.change_entry_range(50..100).unwrap(), SpecVersion(1));

    let expected: f64 = (50..100).map(|i| i as f64).sum();
    assert_eq!(clone.value().unwrap().as_sum(), Some(expected));
    assert_eq!(clone.spec_version(), Some(SpecVersion(1)));

    let again = sum.result().unwrap();
    assert!(Arc::ptr_eq(&original, &again));
    assert_eq!(again.nominal().and_then(|r| r.as_sum()), Some(4950.0));
    assert_eq!(sum.spec_version(), Some(SpecVersion(0)));
}

#[test]
fn test_cloned_results_rerun_together_after_dataset_respec() {
    let (e, _) = engine(events(100), 2, 2);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let res = df
        .vary("x", vec![col("x").add(lit(1.0))], ["x_up"])
        .and_then(|f| f.sum("x"))
        .unwrap();
    let vars = variations_for(&res).unwrap();
    let original = res.result().unwrap();
    let original_vars = vars.result().unwrap();
    assert_eq!(e.partition_passes(), 2);

    let res_clone = clone_result_and_action(&res).unwrap();
    let vars_clone = variations_for(&clone_result_and_action(vars.handle()).unwrap()).unwrap();
    assert!(Arc::ptr_eq(res_clone.binding(), df.binding()));
    assert!(Arc::ptr_eq(vars_clone.handle().binding(), df.binding()));
    assert_eq!(
        df.change_spec(DatasetSpec::single("events").with_global_range(50..100))
            .unwrap(),
        SpecVersion(1)
    );

    // One trigger serves both clones.
    df.trigger().unwrap();
    assert_eq!(e.partition_passes(), 4);
    assert!(res_clone.is_ready() && vars_clone.handle().is_ready());
    assert_eq!(res_clone.spec_version(), Some(SpecVersion(1)));
    assert_eq!(vars_clone.handle().spec_version(), Some(SpecVersion(1)));
    assert_eq!(res_clone.value().unwrap().as_sum(), Some(3725.0));
    assert_eq!(vars_clone.get("x_up").unwrap().as_sum(), Some(3775.0));

    assert!(Arc::ptr_eq(&original, &res.result().unwrap()));
    assert!(Arc::ptr_eq(&original_vars, &vars.result().unwrap()));
    assert_eq!(res.spec_version(), Some(SpecVersion(0)));
    assert_eq!(original_vars.get("x_up").and_then(|r| r.as_sum()), Some(5050.0));
    assert_eq!(df.runs().unwrap().len(), 2);

    // The clones are cached now, so the new spec is pinned again.
    assert!(matches!(
        df.change_entry_range(0..10),
        Err(Error::SpecChangeWhileTriggered)
    ));
}

#[test]
fn test_new_action_next_to_clones_pins_spec() {
    let (e, _) = engine(events(40), 2, 1);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let n = df.count().unwrap();
    n.value().unwrap();

    let clone = clone_result_and_action(&n).unwrap();
    let _late = df.sum("x").unwrap();
    assert!(matches!(
        df.change_entry_range(0..10),
        Err(Error::SpecChangeWhileTriggered)
    ));
    assert_eq!(clone.value().unwrap().as_count(), Some(40));
    assert_eq!(e.partition_passes(), 4);
}

#[test]
fn test_concurrent_readers_share_one_trigger() {
    let (e, _) = engine(events(100), 4, 4);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let h = df
        .histo1d(HistoModel::new("h_x", 10, 0.0, 100.0), "x", Some("w"))
        .unwrap();

    let seen: Vec<Arc<VariantResult>> = std::thread::scope(|scope| {
        let readers: Vec<_> = (0..8).map(|_| scope.spawn(|| h.result().unwrap())).collect();
        readers.into_iter().map(|r| r.join().unwrap()).collect()
    });

    assert_eq!(e.partition_passes(), 4);
    assert!(seen.iter().all(|r| Arc::ptr_eq(r, &seen[0])));
    assert_eq!(df.runs().unwrap().len(), 1);
}

#[test]
fn test_seed_is_recorded_in_run_manifest() {
    let cfg = EngineConfig {
        npartitions: 2,
        max_parallel_tasks: 1,
        seed: Some(42),
        ..Default::default()
    };
    let e = Engine::new(cfg, Arc::new(events(10)))
        .unwrap()
        .with_sink(Arc::new(MemorySink::new()));
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    df.count().unwrap().value().unwrap();
    let runs = df.runs().unwrap();
    assert_eq!(runs[0].seed, Some(42));
}

#[test]
fn test_change_spec_on_triggered_binding_fails() {
    let (e, _) = engine(events(100), 2, 1);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let n = df.count().unwrap();
    let cached = n.result().unwrap();

    let err = df
        .change_spec(DatasetSpec::single("events").with_global_range(0..10))
        .unwrap_err();
    assert!(matches!(err, Error::SpecChangeWhileTriggered));
    assert!(matches!(
        n.change_entry_range(0..10),
        Err(Error::SpecChangeWhileTriggered)
    ));
    assert!(Arc::ptr_eq(&cached, &n.result().unwrap()));
    assert_eq!(n.binding().spec().unwrap().version, SpecVersion(0));
}

#[test]
fn test_respec_outside_dataset_is_overlap_or_gap() {
    let (e, _) = engine(events(100), 2, 1);
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let n = df.count().unwrap();
    n.value().unwrap();
    let clone = clone_result_and_action(&n).unwrap();
    assert!(matches!(
        clone.change_entry_range(50..150),
        Err(Error::OverlapOrGap(_))
    ));
    assert!(matches!(
        clone.change_entry_range(50..50),
        Err(Error::EmptyRange(_))
    ));
    assert_eq!(clone.binding().spec().unwrap().version, SpecVersion(0));
    assert_eq!(clone.value().unwrap().as_count(), Some(100));
}

#[test]
fn test_failing_user_function_fails_the_whole_trigger() {
    let source = events(100);
    let (mut e, _) = engine(source, 4, 1);
    let broken = Arc::new(AtomicBool::new(true));
    let flag = broken.clone();
    e.register_function(
        FnFunction::new("scale", DataType::Float64, move |args: &[Scalar]| {
            let x = args.first().and_then(Scalar::as_f64).unwrap_or(0.0);
            if flag.load(Ordering::SeqCst) && x > 80.0 {
                return Err(Error::Invariant(format!("cannot scale {}", x)));
            }
            Ok(Scalar::F64(x * 2.0))
        })
        .with_params(vec![DataType::Float64]),
    );
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let total = df
        .define("scaled", call("scale", vec![col("x")]))
        .and_then(|f| f.sum("scaled"))
        .unwrap();

    match total.value() {
        Err(Error::PartitionFailure { partition, cause }) => {
            assert_eq!(partition, PartitionId::new(3));
            assert!(cause.to_string().contains("cannot scale"));
        }
        other => panic!("expected partition failure, got {:?}", other),
    }
    assert!(!total.is_ready());
    assert_eq!(total.phase().unwrap(), Phase::Bound);
    assert!(df.runs().unwrap().is_empty());

    broken.store(false, Ordering::SeqCst);
    assert_eq!(total.value().unwrap().as_sum(), Some(9900.0));
    assert_eq!(total.phase().unwrap(), Phase::Triggered);
}

#[test]
fn test_snapshot_of_entry_range_with_auto_flush() {
    let (e, sink) = engine(MemorySource::new(), 4, 2);
    let df = e.empty(100).unwrap();
    let snap = df
        .filter(col("_entry").gt_eq(lit(90i64)))
        .and_then(|f| {
            f.snapshot(
                "tail.jsonl",
                &["_entry"],
                SnapshotOptions {
                    auto_flush: 4,
                    lazy: false,
                },
            )
        })
        .unwrap();

    // Not lazy: written as soon as it was declared.
    assert!(snap.is_ready());
    let out = sink.get("tail.jsonl").expect("snapshot not written");
    assert_eq!(out.stats.rows, 10);
    assert_eq!(out.stats.flushes, 3);
    let text = out.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0], r#"{"_entry":90}"#);
    assert_eq!(lines[9], r#"{"_entry":99}"#);

    let summary = snap.value().unwrap();
    assert_eq!(summary.as_snapshot().map(|s| s.rows), Some(10));
}

#[test]
fn test_lazy_snapshot_waits_and_io_failure_aborts() {
    let (e, sink) = engine(events(20), 2, 1);
    sink.fail_on("bad.jsonl");
    let df = e.dataframe(DatasetSpec::single("events")).unwrap();
    let n = df.count().unwrap();
    let snap = df
        .snapshot(
            "bad.jsonl",
            &[],
            SnapshotOptions {
                auto_flush: 0,
                lazy: true,
            },
        )
        .unwrap();
    assert!(!snap.is_ready());
    assert!(matches!(n.value(), Err(Error::IoFailure(_))));
    assert!(!n.is_ready());
    assert_eq!(df.binding().phase().unwrap(), Phase::Bound);
}

#[test]
fn test_multi_sample_spec_concatenates_samples() {
    let source = events(30);
    let extra = (0..10).map(|i| Scalar::F64(1000.0 + i as f64)).collect();
    let w = (0..10).map(|_| Scalar::F64(1.0)).collect();
    source
        .insert("more", RowBatch::new(vec![Column::new("x", extra), Column::new("w", w)]))
        .unwrap();
    let (e, _) = engine(source, 3, 2);
    let spec = DatasetSpec::new()
        .add_sample(Sample::new("first", "events").with_entries(20..30))
        .add_sample(Sample::new("second", "more"));
    let df = e.dataframe(spec).unwrap();
    let sum = df.sum("x").unwrap();
    let last_entry = df
        .filter(col("x").gt(lit(1008.0)))
        .and_then(|f| f.sum("_entry"))
        .unwrap();
    let expected: f64 = (20..30).map(|i| i as f64).sum::<f64>() + (0..10).map(|i| 1000.0 + i as f64).sum::<f64>();
    assert_eq!(sum.value().unwrap().as_sum(), Some(expected));
    assert_eq!(last_entry.value().unwrap().as_sum(), Some(19.0));
}

#[test]
fn test_run_graphs_triggers_each_binding_once() {
    let (e, _) = engine(events(40), 2, 2);
    let a = e.dataframe(DatasetSpec::single("events")).unwrap();
    let b = e
        .dataframe(DatasetSpec::single("events").with_global_range(0..20))
        .unwrap();
    let na = a.count().unwrap();
    let nb = b.count().unwrap();
    let sb = b.sum("x").unwrap();
    run_graphs(&[&a, &b]).unwrap();
    assert!(na.is_ready() && nb.is_ready() && sb.is_ready());
    assert_eq!(e.partition_passes(), 4);
    assert_eq!(nb.value().unwrap().as_count(), Some(20));
    assert_eq!(na.value().unwrap().as_count(), Some(40));
}
