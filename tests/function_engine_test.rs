// 函数引擎集成测试 @yutiansut @quantaxis
//
// 通过公共 API 验证参数绑定、分组运算、时间切片、标签与元数据语义
//
// 运行：cargo test --test function_engine_test -- --nocapture

use futures_util::stream;
use qaseries::{
    AsyncSourceSeries, EngineConfig, FunctionEngine, GroupOperation, InvocationRequest,
    MeasurementValue, MetadataMap, PhasorValue, SeriesError, SourceSeries,
};

/// 测试辅助：按 (时间毫秒, 值) 构造标量序列
fn source(target: &str, points: &[(f64, f64)]) -> SourceSeries<MeasurementValue> {
    let samples: Vec<_> = points
        .iter()
        .map(|&(t, v)| MeasurementValue::new(target, v, t))
        .collect();
    SourceSeries::new(target, samples)
}

/// 测试辅助：每秒一个样本
fn every_second(target: &str, values: &[f64]) -> SourceSeries<MeasurementValue> {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64 * 1_000.0, v))
        .collect();
    source(target, &points)
}

fn run(
    call: &str,
    sources: Vec<SourceSeries<MeasurementValue>>,
) -> Vec<(String, Vec<MeasurementValue>)> {
    let engine = FunctionEngine::new(EngineConfig::default());
    let request = InvocationRequest::parse_call(call).unwrap();
    engine
        .execute(&request, sources)
        .unwrap()
        .into_iter()
        .map(|output| (output.target, output.samples.collect()))
        .collect()
}

fn single(call: &str, values: &[f64]) -> Vec<f64> {
    let outputs = run(call, vec![every_second("A", values)]);
    assert_eq!(outputs.len(), 1, "{} produced {} outputs", call, outputs.len());
    outputs[0].1.iter().map(|s| s.value).collect()
}

// ============================================================================
// 逐点与聚合
// ============================================================================

#[test]
fn test_pointwise_add_preserves_time_and_count() {
    let outputs = run("Add(1.5, PPA:1)", vec![every_second("PPA:1", &[1.0, 2.0, 3.0])]);
    let (name, samples) = &outputs[0];
    assert_eq!(name, "Add(1.5, PPA:1)");
    assert_eq!(samples.len(), 3);
    for (i, sample) in samples.iter().enumerate() {
        assert_eq!(sample.value, i as f64 + 2.5);
        assert_eq!(sample.time, i as f64 * 1_000.0);
        assert_eq!(&*sample.target, "PPA:1");
    }
}

#[test]
fn test_percentile_bounds() {
    let data = [7.0, 3.0, 9.0, 1.0, 5.0];
    assert_eq!(single("Percentile(0, A)", &data), vec![1.0]);
    assert_eq!(single("Percentile(100, A)", &data), vec![9.0]);
    assert_eq!(single("Pctl(50%, A)", &data), vec![5.0]);
}

#[test]
fn test_median_parity() {
    assert_eq!(single("Median(A)", &[3.0, 1.0, 2.0]), vec![2.0]);
    assert_eq!(single("Median(A)", &[4.0, 1.0, 3.0, 2.0]), vec![2.5]);
    assert!(single("Median(A)", &[]).is_empty());
}

#[test]
fn test_outlier_filter_falls_back_below_min_samples() {
    let data = [1.0, 2.0, 500.0];
    assert_eq!(single("FilterOutliers(A)", &data), data.to_vec());
    assert!(single("FilterOutliers(2, 10, true, A)", &data).is_empty());
}

#[test]
fn test_top_bottom_cardinality() {
    let data = [5.0, 1.0, 9.0, 3.0, 7.0];
    assert_eq!(single("Top(2, A)", &data).len(), 2);
    assert_eq!(single("Bottom(40%, A)", &data), vec![1.0, 3.0]);
    assert_eq!(single("Top(100, A)", &data).len(), data.len());
}

// ============================================================================
// 分组运算
// ============================================================================

#[test]
fn test_set_mode_reduces_across_series() {
    let outputs = run(
        "SetAverage(A;B)",
        vec![every_second("A", &[1.0, 2.0]), every_second("B", &[3.0, 6.0])],
    );
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].0, "SetAverage(A;B)");
    assert_eq!(outputs[0].1[0].value, 3.0);
}

#[test]
fn test_slice_partial_coverage() {
    let outputs = run(
        "SliceAverage(0.5, A;B)",
        vec![
            source("A", &[(0.0, 1.0), (1_000.0, 2.0), (2_000.0, 3.0)]),
            source("B", &[(100.0, 3.0), (2_400.0, 5.0)]),
        ],
    );
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].0, "SliceAverage(A;B)");

    let slices: Vec<(f64, f64)> = outputs[0].1.iter().map(|s| (s.time, s.value)).collect();
    // 1000 处只有 A；每个切片以最早的样本时间为锚点
    assert_eq!(slices, vec![(0.0, 2.0), (1_000.0, 2.0), (2_000.0, 4.0)]);
}

#[test]
fn test_forced_slice_overrides_request() {
    let engine = FunctionEngine::new(EngineConfig::default());
    let request = InvocationRequest::new("Reference", "0, A;B").with_group_operation(GroupOperation::Set);
    let outputs = engine
        .execute(
            &request,
            vec![source("A", &[(0.0, 10.0)]), source("B", &[(0.0, 40.0)])],
        )
        .unwrap();
    let names: Vec<&str> = outputs.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(names, vec!["Reference(A)", "Reference(B)"]);
}

#[test]
fn test_unsupported_group_operation_rejected() {
    let engine: FunctionEngine<MeasurementValue> = FunctionEngine::new(EngineConfig::default());
    let err = engine
        .execute(&InvocationRequest::new("SliceDistinct", "0, A;B"), vec![])
        .unwrap_err();
    assert!(matches!(err, SeriesError::UnsupportedOperation(_)), "{}", err);
}

// ============================================================================
// 标签与元数据
// ============================================================================

#[test]
fn test_labels_from_metadata() {
    let a = every_second("A", &[1.0]).with_metadata(MetadataMap::from_pairs([("PointTag", "GEN1:FREQ")]));
    let b = every_second("B", &[2.0]).with_metadata(MetadataMap::from_pairs([("PointTag", "GEN2:FREQ")]));
    let outputs = run("Label(\"{PointTag} Hz\", A;B)", vec![a, b]);
    let names: Vec<&str> = outputs.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["GEN1:FREQ Hz", "GEN2:FREQ Hz"]);

    let outputs = run("Label(\"Frequency\", A;B)", vec![every_second("A", &[1.0]), every_second("B", &[2.0])]);
    assert_eq!(outputs[0].0, "Frequency 1");
    assert_eq!(outputs[1].0, "Frequency 2");
}

#[test]
fn test_metadata_midpoint_latched_across_invocations() {
    let reference = MetadataMap::from_pairs([("Longitude", "-90"), ("Latitude", "30")]);
    let shelby = MetadataMap::from_pairs([("Longitude", "-80"), ("Latitude", "40")]);

    for _ in 0..2 {
        run(
            "Reference(0, true, REF;SHELBY)",
            vec![
                source("REF", &[(0.0, 10.0)]).with_metadata(reference.clone()),
                source("SHELBY", &[(0.0, 30.0)]).with_metadata(shelby.clone()),
            ],
        );
    }

    assert_eq!(shelby.get_f64("Longitude"), Some(-85.0));
    assert_eq!(shelby.get_f64("Latitude"), Some(35.0));
    assert_eq!(reference.get_f64("Longitude"), Some(-90.0));
}

// ============================================================================
// Evaluate 与形态分派
// ============================================================================

#[test]
fn test_evaluate_expression_over_slices() {
    let outputs = run(
        "Eval(0.1, {sqrt(A^2 + B^2)}, A;B)",
        vec![
            source("A", &[(0.0, 3.0), (1_000.0, 6.0)]),
            source("B", &[(50.0, 4.0), (1_030.0, 8.0)]),
        ],
    );
    assert_eq!(outputs.len(), 1);
    let values: Vec<f64> = outputs[0].1.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![5.0, 10.0]);
}

#[test]
fn test_phasor_dispatch() {
    let engine: FunctionEngine<PhasorValue> = FunctionEngine::new(EngineConfig::default());
    let samples = vec![
        PhasorValue::new("P", 100.0, 170.0, 0.0),
        PhasorValue::new("P", 102.0, -175.0, 1_000.0),
        PhasorValue::new("P", 104.0, -160.0, 2_000.0),
    ];

    let outputs = engine
        .execute(&InvocationRequest::new("Average", "P"), vec![SourceSeries::new("P", samples.clone())])
        .unwrap();
    let mean = outputs.into_iter().next().unwrap().collect_samples();
    assert_eq!(mean.len(), 1);
    assert_eq!(mean[0].magnitude, 102.0);

    let outputs = engine
        .execute(&InvocationRequest::new("UnwrapAngle", "P"), vec![SourceSeries::new("P", samples)])
        .unwrap();
    let unwrapped = outputs.into_iter().next().unwrap().collect_samples();
    let angles: Vec<f64> = unwrapped.iter().map(|s| s.angle).collect();
    assert_eq!(angles, vec![170.0, 185.0, 200.0]);
    assert_eq!(unwrapped[1].magnitude, 102.0);
}

#[test]
fn test_async_execution_matches_sync() {
    let points = [(0.0, 1.0), (1_000.0, 4.0), (2_000.0, 9.0)];
    let expected: Vec<f64> = run("SliceTotal(0, A;B)", vec![source("A", &points), source("B", &points)])
        .remove(0)
        .1
        .iter()
        .map(|s| s.value)
        .collect();

    let actual = tokio_test::block_on(async {
        let engine = FunctionEngine::new(EngineConfig::default());
        let live = |target: &'static str| {
            let samples: Vec<MeasurementValue> = points
                .iter()
                .map(|&(t, v)| MeasurementValue::new(target, v, t))
                .collect();
            AsyncSourceSeries::new(target, stream::iter(samples))
        };
        let outputs = engine
            .execute_async(&InvocationRequest::new("SliceTotal", "0, A;B"), vec![live("A"), live("B")])
            .await
            .unwrap();
        let mut values = Vec::new();
        for output in outputs {
            values.extend(output.collect_samples().await.into_iter().map(|s| s.value));
        }
        values
    });

    assert_eq!(expected, vec![2.0, 8.0, 18.0]);
    assert_eq!(actual, expected);
}

// ============================================================================
// 错误与配置
// ============================================================================

#[test]
fn test_errors_surface_before_samples_flow() {
    let engine: FunctionEngine<MeasurementValue> = FunctionEngine::new(EngineConfig::default());

    let err = engine.execute(&InvocationRequest::new("NoSuchThing", "A"), vec![]).unwrap_err();
    assert!(matches!(err, SeriesError::UnknownFunction(_)));

    let err = engine.execute(&InvocationRequest::new("Add", "A"), vec![]).unwrap_err();
    assert!(err.is_binding_error());

    let err = engine.execute(&InvocationRequest::new("Round", "two, A"), vec![]).unwrap_err();
    assert!(err.is_binding_error());
}

#[test]
fn test_buffer_ceiling_from_config() {
    let config = EngineConfig::from_toml_str(
        r#"
        [execution]
        max_buffered_samples = 3
        "#,
    )
    .unwrap();
    let engine = FunctionEngine::new(config);
    let outputs = engine
        .execute(
            &InvocationRequest::new("Median", "A"),
            vec![every_second("A", &[1.0, 2.0, 3.0, 40.0, 50.0])],
        )
        .unwrap();
    // 只缓冲前三个样本
    let median = outputs.into_iter().next().unwrap().collect_samples();
    assert_eq!(median[0].value, 2.0);
}

#[test]
fn test_slice_series_output_respects_buffer_ceiling() {
    let config = EngineConfig::from_toml_str(
        r#"
        [execution]
        max_buffered_samples = 4
        "#,
    )
    .unwrap();
    let engine = FunctionEngine::new(config);
    let points = [(0.0, 10.0), (1_000.0, 20.0), (2_000.0, 30.0)];
    let sources = || vec![source("A", &points), source("B", &points)];

    let outputs = engine
        .execute(&InvocationRequest::new("Reference", "0, A;B"), sources())
        .unwrap();
    let lengths: Vec<(String, usize)> = outputs
        .into_iter()
        .map(|o| (o.target, o.samples.count()))
        .collect();
    // 六个切片样本只保留前两个切片
    assert_eq!(
        lengths,
        vec![("Reference(A)".to_string(), 2), ("Reference(B)".to_string(), 2)]
    );

    let unlimited = run("Reference(0, A;B)", sources());
    assert_eq!(unlimited[0].1.len(), 3);

    let async_lengths = tokio_test::block_on(async {
        let live: Vec<AsyncSourceSeries<MeasurementValue>> = ["A", "B"]
            .iter()
            .map(|&target| {
                let samples: Vec<MeasurementValue> = points
                    .iter()
                    .map(|&(t, v)| MeasurementValue::new(target, v, t))
                    .collect();
                AsyncSourceSeries::new(target, stream::iter(samples))
            })
            .collect();
        let outputs = engine
            .execute_async(&InvocationRequest::new("Reference", "0, A;B"), live)
            .await
            .unwrap();
        let mut lengths = Vec::new();
        for output in outputs {
            lengths.push(output.collect_samples().await.len());
        }
        lengths
    });
    assert_eq!(async_lengths, vec![2, 2]);
}
