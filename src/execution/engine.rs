//! 函数执行引擎
//!
//! @yutiansut @quantaxis
//!
//! 调用入口，串联：
//! 1. 目录查找 (含 `Set`/`Slice` 前缀)
//! 2. 分组运算解析 (策略/allowed/supported)
//! 3. 记号扫描与参数绑定 (错误在任何内核运行前同步返回)
//! 4. 按分组运算组织输入：Standard 逐序列 / Set 拼接 / Slice 时间切片
//! 5. 执行驱动产生惰性输出序列

use futures::stream::{self, Peekable, StreamExt};
use rayon::prelude::*;
use std::collections::HashMap;
use std::iter::Peekable as IterPeekable;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

use super::cancel::CancellationToken;
use super::driver::ExecutionDriver;
use super::label::resolve_labels;
use super::slice::{AsyncTimeSliceScanner, TimeSliceScanner};
use crate::function::binder::{BoundArguments, LiteralCache, ParameterBinder, TargetResolution};
use crate::function::computation::Computation;
use crate::function::group_operation::GroupOperation;
use crate::function::parameter::{ParameterValue, Parameters, SourceHandle};
use crate::function::registry::{FunctionCatalog, SeriesFunction};
use crate::function::ReturnType;
use crate::model::metadata::{MetadataCollection, MetadataMap};
use crate::model::sample::SeriesValue;
use crate::model::series::{
    AsyncResultSeries, AsyncSourceSeries, ResultSeries, SampleIter, SampleStream, SourceSeries,
};
use crate::observability::{init_metrics, LabeledTimer, FUNCTION_PREPARE_LATENCY};
use crate::utils::config::EngineConfig;
use crate::{record_function_error, record_invocation, Result, SeriesError};

// ═══════════════════════════════════════════════════════════════════════════
// 调用请求
// ═══════════════════════════════════════════════════════════════════════════

/// 一次函数调用
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// 函数名或别名，可带 `Set`/`Slice` 前缀
    pub function: String,
    /// 括号内的参数文本 (最后一个参数为源表达式)
    pub arguments: String,
    /// 调用方请求的分组运算
    pub group_operation: GroupOperation,
    pub cancellation: CancellationToken,
}

impl InvocationRequest {
    pub fn new(function: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            arguments: arguments.into(),
            group_operation: GroupOperation::None,
            cancellation: CancellationToken::new(),
        }
    }

    /// 解析 `Name(arguments)` 形式的调用文本
    pub fn parse_call(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let malformed = || {
            SeriesError::FormatError(format!(
                "\"{}\" is not a function call of the form Name(parameters, source)",
                expression
            ))
        };

        let open = expression.find('(').ok_or_else(malformed)?;
        let name = expression[..open].trim();
        let arguments = expression[open + 1..]
            .strip_suffix(')')
            .ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }
        Ok(Self::new(name, arguments.trim()))
    }

    pub fn with_group_operation(mut self, operation: GroupOperation) -> Self {
        self.group_operation = operation;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 已准备的调用
// ═══════════════════════════════════════════════════════════════════════════

/// 完成查找、分组解析与绑定的调用
#[derive(Clone)]
struct PreparedCall<T> {
    function: SeriesFunction<T>,
    operation: GroupOperation,
    arguments: BoundArguments,
}

impl<T: SeriesValue> PreparedCall<T> {
    fn name(&self) -> &str {
        self.function.name()
    }

    /// Slice 模式下由逐序列 Standard 执行等价替代
    fn runs_per_series(&self) -> bool {
        self.function.descriptor().is_slice_series_equivalent
            && !self.arguments.has_target_references()
    }

    /// 输出命名：`{Prefix}{Name}({params...}, {source})`，Slice 容差不参与命名
    fn output_name(&self, source: &str) -> String {
        let name = self.function.descriptor().published_name(self.operation);
        let skip = usize::from(self.operation == GroupOperation::Slice);
        let tokens: Vec<&str> = self
            .arguments
            .tokens
            .iter()
            .skip(skip)
            .map(|t| t.trim())
            .collect();

        if tokens.is_empty() {
            format!("{}({})", name, source)
        } else {
            format!("{}({}, {})", name, tokens.join(", "), source)
        }
    }

    fn parameters(
        &self,
        values: Vec<Option<ParameterValue>>,
        root_target: Arc<str>,
        metadata: MetadataCollection,
    ) -> Parameters<T> {
        Parameters::new(
            self.function.descriptor().clone(),
            values,
            self.arguments.parsed_count,
            self.operation,
            root_target,
            metadata,
        )
        .with_slice_tolerance(self.arguments.slice_tolerance)
    }

    /// 目标引用按首样本取值 (Standard/Set)
    fn resolve_strict(&self, first_values: &HashMap<String, f64>) -> Result<Vec<Option<ParameterValue>>> {
        self.arguments.resolve(
            self.name(),
            &self.function.descriptor().parameters,
            |target| first_values.get(&target.to_ascii_lowercase()).copied(),
            TargetResolution::Strict,
        )
    }

    /// 构造计算并取回上游源
    fn instantiate(&self, mut parameters: Parameters<T>) -> Result<(Computation<T>, Option<SourceHandle<T>>)> {
        let computation = self.function.create(&parameters)?;
        Ok((computation, parameters.take_source()))
    }

    /// Label 类函数的输出标签
    fn labels(
        &self,
        values: &[Option<ParameterValue>],
        metadata: &[MetadataMap],
    ) -> Result<Option<Vec<String>>> {
        let Some(index) = self.function.descriptor().label_parameter else {
            return Ok(None);
        };
        let parameters = self.parameters(values.to_vec(), Arc::from(""), MetadataCollection::new());
        let template = parameters.text(index)?;
        Ok(Some(resolve_labels(template, metadata)))
    }
}

/// 切片求值器：每个切片独立解析目标参数并构造一次计算
struct SliceEvaluator<T> {
    call: PreparedCall<T>,
    root_target: Arc<str>,
    metadata: MetadataCollection,
}

impl<T: SeriesValue> SliceEvaluator<T> {
    /// 执行前校验参数与内核构造；目标值要到切片内才可知，以 1 占位
    fn validate(&self) -> Result<()> {
        let values = self.call.arguments.resolve(
            self.call.name(),
            &self.call.function.descriptor().parameters,
            |_| Some(1.0),
            TargetResolution::Lenient,
        )?;
        let parameters = self
            .call
            .parameters(values, self.root_target.clone(), self.metadata.clone());
        self.call.function.create(&parameters).map(|_| ())
    }

    fn evaluate(&self, slice: Vec<T>) -> Vec<T> {
        let Some(anchor) = slice.iter().map(SeriesValue::time).reduce(f64::min) else {
            return Vec::new();
        };

        let values = match self.call.arguments.resolve(
            self.call.name(),
            &self.call.function.descriptor().parameters,
            |target| {
                slice
                    .iter()
                    .find(|s| s.target().eq_ignore_ascii_case(target))
                    .map(SeriesValue::value)
            },
            TargetResolution::Lenient,
        ) {
            Ok(values) => values,
            Err(e) => {
                log::warn!("\"{}\" skipped slice at {}: {}", self.call.name(), anchor, e);
                return Vec::new();
            }
        };

        let parameters = self
            .call
            .parameters(values, self.root_target.clone(), self.metadata.clone());
        let computation = match self.call.function.create(&parameters) {
            Ok(computation) => computation,
            Err(e) => {
                log::warn!("\"{}\" skipped slice at {}: {}", self.call.name(), anchor, e);
                return Vec::new();
            }
        };

        let mut output = computation.apply(slice);
        if self.call.function.descriptor().return_type == ReturnType::Scalar {
            for sample in output.iter_mut() {
                sample.set_target(self.root_target.clone());
                sample.set_time(anchor);
            }
        }
        output
    }
}

/// Series 返回的切片输出按目标重新分组 (首次出现顺序)
fn group_by_target<T: SeriesValue>(samples: impl IntoIterator<Item = T>) -> Vec<(Arc<str>, Vec<T>)> {
    let mut groups: Vec<(Arc<str>, Vec<T>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for sample in samples {
        let key = sample.target().to_ascii_lowercase();
        let position = *index.entry(key).or_insert_with(|| {
            groups.push((Arc::from(sample.target()), Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(sample);
    }
    groups
}

// ═══════════════════════════════════════════════════════════════════════════
// 引擎
// ═══════════════════════════════════════════════════════════════════════════

/// 函数执行引擎
pub struct FunctionEngine<T> {
    catalog: Arc<FunctionCatalog<T>>,
    config: EngineConfig,
    literal_cache: Arc<LiteralCache>,
}

struct SyncSource<T> {
    target: Arc<str>,
    metadata: MetadataMap,
    samples: IterPeekable<SampleIter<T>>,
}

struct AsyncSource<T> {
    target: Arc<str>,
    metadata: MetadataMap,
    samples: Peekable<SampleStream<T>>,
}

impl<T: SeriesValue> FunctionEngine<T> {
    /// 使用该样本形态的全局目录
    pub fn new(config: EngineConfig) -> Self {
        Self::with_catalog(T::catalog(), config)
    }

    pub fn with_catalog(catalog: Arc<FunctionCatalog<T>>, config: EngineConfig) -> Self {
        init_metrics();
        let literal_cache = Arc::new(LiteralCache::new(config.execution.literal_cache_capacity));
        Self {
            catalog,
            config,
            literal_cache,
        }
    }

    pub fn catalog(&self) -> &Arc<FunctionCatalog<T>> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ───────────────────────────────────────────────────────────────────────
    // 准备阶段
    // ───────────────────────────────────────────────────────────────────────

    fn prepare(&self, request: &InvocationRequest) -> Result<PreparedCall<T>> {
        let prepared = self.try_prepare(request);
        if let Err(e) = &prepared {
            record_function_error!(e.kind());
            log::debug!("\"{}\" rejected: {}", request.function, e);
        }
        prepared
    }

    fn try_prepare(&self, request: &InvocationRequest) -> Result<PreparedCall<T>> {
        let (function, prefixed) = self.catalog.lookup(&request.function)?;
        let descriptor = function.descriptor();
        let timer = LabeledTimer::new(FUNCTION_PREPARE_LATENCY.clone(), vec![descriptor.name.clone()]);

        let requested = match prefixed {
            Some(op) => {
                if request.group_operation != GroupOperation::None && request.group_operation != op {
                    log::debug!(
                        "\"{}\" name prefix selects {}, ignoring requested {}",
                        request.function,
                        op,
                        request.group_operation
                    );
                }
                op
            }
            None => request.group_operation,
        };
        let operation = descriptor.resolve_group_operation(requested)?;

        let counts = descriptor.parameter_counts(operation);
        let tokens = (descriptor.scanner)(&descriptor.name, &request.arguments, counts)?;
        let arguments = ParameterBinder::new(&descriptor.name, &descriptor.parameters, &self.literal_cache)
            .bind(tokens, operation)?;

        if let (Some(tolerance), Some(max)) =
            (arguments.slice_tolerance, self.config.slice.max_tolerance_seconds)
        {
            if tolerance > max * 1_000.0 {
                return Err(SeriesError::BindingError(format!(
                    "Slice tolerance of \"{}\" exceeds the configured maximum of {} seconds",
                    descriptor.name, max
                )));
            }
        }

        timer.observe();
        record_invocation!(descriptor.name.as_str(), operation.to_string().as_str());
        log::debug!(
            "\"{}\" resolved as {} with {} explicit parameter(s) over \"{}\"",
            descriptor.name,
            operation,
            arguments.parsed_count,
            arguments.source_expression
        );

        Ok(PreparedCall {
            function: function.clone(),
            operation,
            arguments,
        })
    }

    // ───────────────────────────────────────────────────────────────────────
    // 同步执行
    // ───────────────────────────────────────────────────────────────────────

    /// 执行调用，返回惰性输出序列
    pub fn execute(
        &self,
        request: &InvocationRequest,
        sources: Vec<SourceSeries<T>>,
    ) -> Result<Vec<ResultSeries<T>>> {
        let call = self.prepare(request)?;
        let span = tracing::info_span!(
            "invocation",
            function = %call.name(),
            group_operation = %call.operation,
            sources = sources.len()
        );
        let _entered = span.enter();

        let driver = ExecutionDriver::new(call.name(), request.cancellation.clone(), &self.config.execution);
        let metadata = MetadataCollection::from_entries(
            sources.iter().map(|s| (s.target.clone(), s.metadata.clone())),
        );
        let sources: Vec<SyncSource<T>> = sources
            .into_iter()
            .map(|s| SyncSource {
                target: s.target,
                metadata: s.metadata,
                samples: s.samples.peekable(),
            })
            .collect();

        let outputs = match call.operation {
            GroupOperation::Slice if call.runs_per_series() => {
                self.run_standard(&call, &driver, sources, metadata)
            }
            GroupOperation::Slice => self.run_slice(&call, &driver, sources, metadata),
            GroupOperation::Set => self.run_set(&call, &driver, sources, metadata),
            GroupOperation::None | GroupOperation::Standard => {
                self.run_standard(&call, &driver, sources, metadata)
            }
        };
        if let Err(e) = &outputs {
            record_function_error!(e.kind());
        }
        outputs
    }

    fn first_values(call: &PreparedCall<T>, sources: &mut [SyncSource<T>]) -> HashMap<String, f64> {
        let mut values = HashMap::new();
        for target in call.arguments.target_references() {
            let head = sources
                .iter_mut()
                .find(|s| s.target.eq_ignore_ascii_case(target))
                .and_then(|s| s.samples.peek().map(SeriesValue::value));
            if let Some(value) = head {
                values.insert(target.to_ascii_lowercase(), value);
            }
        }
        values
    }

    fn run_standard(
        &self,
        call: &PreparedCall<T>,
        driver: &ExecutionDriver,
        mut sources: Vec<SyncSource<T>>,
        metadata: MetadataCollection,
    ) -> Result<Vec<ResultSeries<T>>> {
        let values = call.resolve_strict(&Self::first_values(call, &mut sources))?;
        let maps: Vec<MetadataMap> = sources.iter().map(|s| s.metadata.clone()).collect();
        let labels = call.labels(&values, &maps)?;

        sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| -> Result<ResultSeries<T>> {
                let samples: SampleIter<T> = Box::new(source.samples);
                let parameters = call
                    .parameters(values.clone(), source.target.clone(), metadata.clone())
                    .with_source(SourceHandle::Iter(samples));
                let (computation, handle) = call.instantiate(parameters)?;
                let samples = match handle {
                    Some(SourceHandle::Iter(samples)) => samples,
                    _ => Box::new(std::iter::empty()),
                };

                Ok(ResultSeries {
                    target: labels
                        .as_ref()
                        .map_or_else(|| call.output_name(&source.target), |l| l[index].clone()),
                    root_target: source.target,
                    metadata: source.metadata,
                    samples: driver.run(computation, samples),
                })
            })
            .collect()
    }

    fn run_set(
        &self,
        call: &PreparedCall<T>,
        driver: &ExecutionDriver,
        mut sources: Vec<SyncSource<T>>,
        metadata: MetadataCollection,
    ) -> Result<Vec<ResultSeries<T>>> {
        let values = call.resolve_strict(&Self::first_values(call, &mut sources))?;
        let root_target: Arc<str> = Arc::from(call.arguments.source_expression.as_str());

        let combined: SampleIter<T> = Box::new(sources.into_iter().flat_map(|s| s.samples));
        let parameters = call
            .parameters(values, root_target.clone(), metadata.clone())
            .with_source(SourceHandle::Iter(combined));
        let (computation, handle) = call.instantiate(parameters)?;
        let samples = match handle {
            Some(SourceHandle::Iter(samples)) => samples,
            _ => Box::new(std::iter::empty()),
        };

        Ok(vec![ResultSeries {
            target: call.output_name(&root_target),
            metadata: metadata.get_or_empty(&root_target),
            root_target,
            samples: driver.run(computation, samples),
        }])
    }

    fn run_slice(
        &self,
        call: &PreparedCall<T>,
        driver: &ExecutionDriver,
        sources: Vec<SyncSource<T>>,
        metadata: MetadataCollection,
    ) -> Result<Vec<ResultSeries<T>>> {
        let root_target: Arc<str> = Arc::from(call.arguments.source_expression.as_str());
        let evaluator = SliceEvaluator {
            call: call.clone(),
            root_target: root_target.clone(),
            metadata: metadata.clone(),
        };
        evaluator.validate()?;

        let input_targets: Vec<Arc<str>> = sources.iter().map(|s| s.target.clone()).collect();
        let scanner = TimeSliceScanner::new(
            sources
                .into_iter()
                .map(|s| Box::new(s.samples) as SampleIter<T>)
                .collect(),
            call.arguments.slice_tolerance.unwrap_or(0.0),
        );
        let slices = driver.cancellable(scanner);

        if call.function.descriptor().return_type == ReturnType::Scalar {
            let samples: SampleIter<T> = Box::new(slices.flat_map(move |slice| evaluator.evaluate(slice)));
            return Ok(vec![ResultSeries {
                target: call.output_name(&root_target),
                metadata: metadata.get_or_empty(&root_target),
                root_target,
                samples,
            }]);
        }

        // 输出序列由切片结果中的目标决定，只能先物化；缓冲上限与周期性取消检查同 Immediate
        let evaluated = driver
            .buffer(slices.flat_map(move |slice| evaluator.evaluate(slice)))
            .unwrap_or_default();
        Ok(group_by_target(evaluated)
            .into_iter()
            .map(|(target, samples)| Self::slice_group(call, &input_targets, &metadata, target, samples))
            .collect())
    }

    fn slice_group(
        call: &PreparedCall<T>,
        input_targets: &[Arc<str>],
        metadata: &MetadataCollection,
        target: Arc<str>,
        samples: Vec<T>,
    ) -> ResultSeries<T> {
        // 派生目标 (如表达式结果) 以源表达式命名
        let name = if input_targets.iter().any(|t| t.eq_ignore_ascii_case(&target)) {
            call.output_name(&target)
        } else {
            call.output_name(&call.arguments.source_expression)
        };
        ResultSeries {
            target: name,
            metadata: metadata.get_or_empty(&target),
            root_target: target,
            samples: Box::new(samples.into_iter()),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // 异步执行
    // ───────────────────────────────────────────────────────────────────────

    /// 异步执行，输入与输出均为 Stream
    pub async fn execute_async(
        &self,
        request: &InvocationRequest,
        sources: Vec<AsyncSourceSeries<T>>,
    ) -> Result<Vec<AsyncResultSeries<T>>> {
        let call = self.prepare(request)?;
        let span = tracing::info_span!(
            "invocation",
            function = %call.name(),
            group_operation = %call.operation,
            sources = sources.len()
        );

        async move {
            let driver = ExecutionDriver::new(call.name(), request.cancellation.clone(), &self.config.execution);
            let metadata = MetadataCollection::from_entries(
                sources.iter().map(|s| (s.target.clone(), s.metadata.clone())),
            );
            let mut sources: Vec<AsyncSource<T>> = sources
                .into_iter()
                .map(|s| AsyncSource {
                    target: s.target,
                    metadata: s.metadata,
                    samples: s.samples.peekable(),
                })
                .collect();

            let outputs = match call.operation {
                GroupOperation::Slice if !call.runs_per_series() => {
                    self.run_slice_async(&call, &driver, sources, metadata).await
                }
                GroupOperation::Set => {
                    let first = Self::first_values_async(&call, &mut sources).await;
                    self.run_set_async(&call, &driver, sources, metadata, first)
                }
                _ => {
                    let first = Self::first_values_async(&call, &mut sources).await;
                    self.run_standard_async(&call, &driver, sources, metadata, first)
                }
            };
            if let Err(e) = &outputs {
                record_function_error!(e.kind());
            }
            outputs
        }
        .instrument(span)
        .await
    }

    async fn first_values_async(
        call: &PreparedCall<T>,
        sources: &mut [AsyncSource<T>],
    ) -> HashMap<String, f64> {
        let mut values = HashMap::new();
        for target in call.arguments.target_references() {
            if let Some(source) = sources
                .iter_mut()
                .find(|s| s.target.eq_ignore_ascii_case(target))
            {
                if let Some(sample) = Pin::new(&mut source.samples).peek().await {
                    values.insert(target.to_ascii_lowercase(), sample.value());
                }
            }
        }
        values
    }

    fn run_standard_async(
        &self,
        call: &PreparedCall<T>,
        driver: &ExecutionDriver,
        sources: Vec<AsyncSource<T>>,
        metadata: MetadataCollection,
        first_values: HashMap<String, f64>,
    ) -> Result<Vec<AsyncResultSeries<T>>> {
        let values = call.resolve_strict(&first_values)?;
        let maps: Vec<MetadataMap> = sources.iter().map(|s| s.metadata.clone()).collect();
        let labels = call.labels(&values, &maps)?;

        sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| -> Result<AsyncResultSeries<T>> {
                let parameters = call
                    .parameters(values.clone(), source.target.clone(), metadata.clone())
                    .with_source(SourceHandle::Stream(source.samples.boxed()));
                let (computation, handle) = call.instantiate(parameters)?;
                let samples = match handle {
                    Some(SourceHandle::Stream(samples)) => samples,
                    _ => stream::empty().boxed(),
                };

                Ok(AsyncResultSeries {
                    target: labels
                        .as_ref()
                        .map_or_else(|| call.output_name(&source.target), |l| l[index].clone()),
                    root_target: source.target,
                    metadata: source.metadata,
                    samples: driver.run_async(computation, samples),
                })
            })
            .collect()
    }

    fn run_set_async(
        &self,
        call: &PreparedCall<T>,
        driver: &ExecutionDriver,
        sources: Vec<AsyncSource<T>>,
        metadata: MetadataCollection,
        first_values: HashMap<String, f64>,
    ) -> Result<Vec<AsyncResultSeries<T>>> {
        let values = call.resolve_strict(&first_values)?;
        let root_target: Arc<str> = Arc::from(call.arguments.source_expression.as_str());

        let combined = stream::iter(sources.into_iter().map(|s| s.samples))
            .flatten()
            .boxed();
        let parameters = call
            .parameters(values, root_target.clone(), metadata.clone())
            .with_source(SourceHandle::Stream(combined));
        let (computation, handle) = call.instantiate(parameters)?;
        let samples = match handle {
            Some(SourceHandle::Stream(samples)) => samples,
            _ => stream::empty().boxed(),
        };

        Ok(vec![AsyncResultSeries {
            target: call.output_name(&root_target),
            metadata: metadata.get_or_empty(&root_target),
            root_target,
            samples: driver.run_async(computation, samples),
        }])
    }

    async fn run_slice_async(
        &self,
        call: &PreparedCall<T>,
        driver: &ExecutionDriver,
        sources: Vec<AsyncSource<T>>,
        metadata: MetadataCollection,
    ) -> Result<Vec<AsyncResultSeries<T>>> {
        let root_target: Arc<str> = Arc::from(call.arguments.source_expression.as_str());
        let evaluator = SliceEvaluator {
            call: call.clone(),
            root_target: root_target.clone(),
            metadata: metadata.clone(),
        };
        evaluator.validate()?;

        let input_targets: Vec<Arc<str>> = sources.iter().map(|s| s.target.clone()).collect();
        let scanner = AsyncTimeSliceScanner::new(
            sources.into_iter().map(|s| s.samples.boxed()).collect(),
            call.arguments.slice_tolerance.unwrap_or(0.0),
        );
        let slices = driver.cancellable_stream(scanner.into_stream());

        if call.function.descriptor().return_type == ReturnType::Scalar {
            let samples = slices
                .flat_map(move |slice| stream::iter(evaluator.evaluate(slice)))
                .boxed();
            return Ok(vec![AsyncResultSeries {
                target: call.output_name(&root_target),
                metadata: metadata.get_or_empty(&root_target),
                root_target,
                samples,
            }]);
        }

        let evaluated = driver
            .buffer_async(
                slices
                    .flat_map(move |slice| stream::iter(evaluator.evaluate(slice)))
                    .boxed(),
            )
            .await
            .unwrap_or_default();
        Ok(group_by_target(evaluated)
            .into_iter()
            .map(|(target, samples)| {
                let series = Self::slice_group(call, &input_targets, &metadata, target, samples);
                AsyncResultSeries {
                    target: series.target,
                    root_target: series.root_target,
                    metadata: series.metadata,
                    samples: stream::iter(series.samples).boxed(),
                }
            })
            .collect())
    }

    // ───────────────────────────────────────────────────────────────────────
    // 批量执行
    // ───────────────────────────────────────────────────────────────────────

    /// 批量执行相互独立的调用并物化结果
    ///
    /// `parallel_batch` 开启时在 rayon 线程池上并行。
    pub fn execute_batch(
        &self,
        batch: Vec<(InvocationRequest, Vec<SourceSeries<T>>)>,
    ) -> Vec<Result<Vec<(String, Vec<T>)>>> {
        let run = |(request, sources): (InvocationRequest, Vec<SourceSeries<T>>)| {
            self.execute(&request, sources).map(|outputs| {
                outputs
                    .into_iter()
                    .map(|output| (output.target, output.samples.collect()))
                    .collect()
            })
        };

        if self.config.execution.parallel_batch {
            batch.into_par_iter().map(run).collect()
        } else {
            batch.into_iter().map(run).collect()
        }
    }
}

impl<T> std::fmt::Debug for FunctionEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionEngine")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::computation::{map_value, passthrough};
    use crate::function::group_operation::{GroupOperationPolicy, GroupOperations};
    use crate::function::parameter::{ParameterDefinition, ParameterType};
    use crate::function::FunctionDescriptor;
    use crate::model::sample::MeasurementValue;

    fn catalog() -> Arc<FunctionCatalog<MeasurementValue>> {
        let mut catalog = FunctionCatalog::new();
        catalog
            .register(
                FunctionDescriptor::new("Add", "Adds N")
                    .parameter(ParameterDefinition::required("N", ParameterType::Float, ""))
                    .slice_series_equivalent(),
                |p: &Parameters<MeasurementValue>| {
                    let n = p.float(0)?;
                    Ok(map_value(move |v| v + n))
                },
            )
            .unwrap();
        catalog
            .register(
                FunctionDescriptor::new("Total", "Sum")
                    .returns(ReturnType::Scalar)
                    .group_operations(GroupOperations::ALL),
                |_| {
                    Ok(Computation::immediate(|values: Vec<MeasurementValue>| {
                        let total: f64 = values.iter().map(|s| s.value).sum();
                        values.last().map(|s| s.with_value(total)).into_iter().collect()
                    }))
                },
            )
            .unwrap();
        catalog
            .register(
                FunctionDescriptor::new("Label", "")
                    .parameter(ParameterDefinition::required("label", ParameterType::Text, ""))
                    .policy(GroupOperationPolicy::IgnoreRequested)
                    .label_parameter(0),
                |_| Ok(passthrough()),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn engine() -> FunctionEngine<MeasurementValue> {
        FunctionEngine::with_catalog(catalog(), EngineConfig::default())
    }

    fn source(target: &str, points: &[(f64, f64)]) -> SourceSeries<MeasurementValue> {
        let samples: Vec<_> = points
            .iter()
            .map(|&(t, v)| MeasurementValue::new(target, v, t))
            .collect();
        SourceSeries::new(target, samples)
    }

    #[test]
    fn test_parse_call() {
        let request = InvocationRequest::parse_call("SliceAdd(0.1, 2, A;B)").unwrap();
        assert_eq!(request.function, "SliceAdd");
        assert_eq!(request.arguments, "0.1, 2, A;B");
        assert!(InvocationRequest::parse_call("Add 1, A").is_err());
        assert!(InvocationRequest::parse_call("(1, A)").is_err());
    }

    #[test]
    fn test_standard_naming_and_values() {
        let outputs = engine()
            .execute(
                &InvocationRequest::new("Add", "1.5, A;B"),
                vec![source("A", &[(0.0, 1.0)]), source("B", &[(0.0, 2.0)])],
            )
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].target, "Add(1.5, A)");
        assert_eq!(&*outputs[1].root_target, "B");
        let values: Vec<f64> = outputs
            .into_iter()
            .flat_map(|o| o.collect_samples())
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![2.5, 3.5]);
    }

    #[test]
    fn test_target_parameter_uses_first_sample() {
        let outputs = engine()
            .execute(
                &InvocationRequest::new("Add", "B, A;B"),
                vec![source("A", &[(0.0, 1.0)]), source("B", &[(0.0, 10.0), (1.0, 20.0)])],
            )
            .unwrap();
        let a = outputs.into_iter().next().unwrap().collect_samples();
        assert_eq!(a[0].value, 11.0);

        let err = engine()
            .execute(&InvocationRequest::new("Add", "C, A"), vec![source("A", &[(0.0, 1.0)])])
            .unwrap_err();
        assert!(err.is_binding_error());
        assert!(err.to_string().contains("could not be found in dataset"));
    }

    #[test]
    fn test_set_and_prefixed_slice() {
        let engine = engine();
        let outputs = engine
            .execute(
                &InvocationRequest::new("Total", "A;B").with_group_operation(GroupOperation::Set),
                vec![source("A", &[(0.0, 1.0)]), source("B", &[(0.0, 2.0)])],
            )
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].target, "SetTotal(A;B)");

        let outputs = engine
            .execute(
                &InvocationRequest::new("SliceTotal", "0.002, A;B"),
                vec![
                    source("A", &[(0.0, 1.0), (10.0, 1.0)]),
                    source("B", &[(1.0, 2.0), (11.0, 2.0)]),
                ],
            )
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].target, "SliceTotal(A;B)");
        let samples = outputs.into_iter().next().unwrap().collect_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 3.0);
        assert_eq!(samples[1].time, 10.0);
        assert_eq!(samples[0].target(), "A;B");
    }

    #[test]
    fn test_slice_equivalent_runs_per_series() {
        let outputs = engine()
            .execute(
                &InvocationRequest::new("Add", "0.5, 1, A;B").with_group_operation(GroupOperation::Slice),
                vec![source("A", &[(0.0, 1.0)]), source("B", &[(0.0, 2.0)])],
            )
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].target, "SliceAdd(1, A)");
    }

    #[test]
    fn test_label_ignores_requested_set() {
        let a = source("A", &[(0.0, 1.0)])
            .with_metadata(MetadataMap::from_pairs([("PointTag", "TAG_A")]));
        let outputs = engine()
            .execute(
                &InvocationRequest::new("SetLabel", "\"{PointTag} value\", A"),
                vec![a],
            )
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].target, "TAG_A value");
    }

    #[test]
    fn test_errors_before_execution() {
        let engine = engine();
        assert!(matches!(
            engine.execute(&InvocationRequest::new("Nope", "A"), vec![]),
            Err(SeriesError::UnknownFunction(_))
        ));
        assert!(matches!(
            engine.execute(&InvocationRequest::new("Add", "A"), vec![]),
            Err(SeriesError::FormatError(_))
        ));
        assert!(matches!(
            engine.execute(&InvocationRequest::new("SliceAdd", "-1, 2, A"), vec![]),
            Err(SeriesError::BindingError(_))
        ));
    }

    #[test]
    fn test_batch() {
        let results = engine().execute_batch(vec![
            (InvocationRequest::new("Add", "1, A"), vec![source("A", &[(0.0, 1.0)])]),
            (InvocationRequest::new("Nope", "A"), vec![]),
        ]);
        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first[0].0, "Add(1, A)");
        assert_eq!(first[0].1[0].value, 2.0);
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn test_async_standard_and_slice() {
        let engine = engine();
        let outputs = engine
            .execute_async(
                &InvocationRequest::new("Add", "B, A;B"),
                vec![
                    source("A", &[(0.0, 1.0)]).into(),
                    source("B", &[(0.0, 10.0)]).into(),
                ],
            )
            .await
            .unwrap();
        let mut values = Vec::new();
        for output in outputs {
            values.extend(output.collect_samples().await.into_iter().map(|s| s.value));
        }
        assert_eq!(values, vec![11.0, 20.0]);

        let outputs = engine
            .execute_async(
                &InvocationRequest::new("SliceTotal", "0, A;B"),
                vec![
                    source("A", &[(0.0, 1.0)]).into(),
                    source("B", &[(0.0, 2.0)]).into(),
                ],
            )
            .await
            .unwrap();
        let samples = outputs.into_iter().next().unwrap().collect_samples().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 3.0);
    }
}
