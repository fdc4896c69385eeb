//! Evaluate - 切片内跨序列表达式
//!
//! @yutiansut @quantaxis
//!
//! 每个时间切片把各序列样本按目标名绑定为变量，求值一次花括号表达式。
//! 切片缺少表达式引用的变量时不产生输出。

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

use crate::dsl::{Bindings, CompiledExpression, ExecutionError};
use crate::function::computation::{Computation, StreamKernel};
use crate::function::group_operation::{GroupOperation, GroupOperationPolicy, GroupOperations};
use crate::function::parameter::{ParameterDefinition, ParameterType};
use crate::function::registry::FunctionCatalog;
use crate::function::scanner::scan_braced_expression;
use crate::function::{FunctionDescriptor, ReturnType};
use crate::model::sample::SeriesValue;
use crate::Result;

/// 已解析表达式缓存上限，超出后整体清空
const EXPRESSION_CACHE_CAPACITY: usize = 256;

struct Evaluate<T> {
    expression: Arc<CompiledExpression>,
    bindings: Bindings,
    template: Option<T>,
    anchor: f64,
}

impl<T> Evaluate<T> {
    fn new(expression: Arc<CompiledExpression>) -> Self {
        Self {
            expression,
            bindings: Bindings::new(),
            template: None,
            anchor: f64::INFINITY,
        }
    }
}

impl<T: SeriesValue> StreamKernel<T> for Evaluate<T> {
    fn update(&mut self, sample: T, _out: &mut VecDeque<T>) {
        self.bindings.bind(sample.target(), sample.value());
        self.anchor = self.anchor.min(sample.time());
        if self.template.is_none() {
            self.template = Some(sample);
        }
    }

    fn finish(&mut self, out: &mut VecDeque<T>) {
        let Some(template) = self.template.take() else {
            return;
        };
        match self.expression.evaluate(&self.bindings) {
            Ok(value) => {
                let mut sample = template.with_value(value);
                sample.set_target(Arc::from(self.expression.text()));
                sample.set_time(self.anchor);
                out.push_back(sample);
            }
            Err(ExecutionError::UnboundVariable(name)) => {
                log::trace!(
                    "slice at {} has no value for \"{}\" in {{{}}}",
                    self.anchor,
                    name,
                    self.expression.text()
                );
            }
        }
    }
}

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    let cache: DashMap<String, Arc<CompiledExpression>> = DashMap::new();

    catalog.register(
        FunctionDescriptor::new(
            "Evaluate",
            "Returns a series of values that represent the evaluated expression, e.g., {A + B}, over each time slice of the source series.",
        )
        .aliases(&["Eval"])
        .returns(ReturnType::Scalar)
        .group_operations(GroupOperations::SLICE)
        .policy(GroupOperationPolicy::Force(GroupOperation::Slice))
        .scanner(scan_braced_expression)
        .parameter(ParameterDefinition::required(
            "expression",
            ParameterType::Expression,
            "Braced arithmetic expression; variables are series targets, e.g., {A + B} or {[PPA:1] * 2}.",
        )),
        move |p| {
            let text = p.expression(0)?;
            if let Some(hit) = cache.get(text).map(|hit| hit.value().clone()) {
                return Ok(Computation::deferred(Evaluate::new(hit)));
            }

            let compiled = Arc::new(CompiledExpression::compile(text)?);
            if cache.len() >= EXPRESSION_CACHE_CAPACITY {
                log::debug!(
                    "expression cache reached {} entries, clearing",
                    EXPRESSION_CACHE_CAPACITY
                );
                cache.clear();
            }
            cache.insert(text.to_string(), compiled.clone());
            Ok(Computation::deferred(Evaluate::new(compiled)))
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ParseError;
    use crate::execution::engine::{FunctionEngine, InvocationRequest};
    use crate::kernels::testing::{invoke, timed};
    use crate::model::sample::MeasurementValue;
    use crate::utils::config::EngineConfig;
    use crate::SeriesError;

    #[test]
    fn test_evaluate_per_slice() {
        let outputs = invoke(
            "Evaluate(0, {A + B * 2}, A;B)",
            vec![
                timed("A", &[(0.0, 1.0), (1_000.0, 2.0)]),
                timed("B", &[(0.0, 10.0), (1_000.0, 20.0)]),
            ],
        );
        assert_eq!(outputs.len(), 1);
        let (name, samples) = &outputs[0];
        assert_eq!(name, "Evaluate({A + B * 2}, A;B)");
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![21.0, 42.0]);
        assert_eq!(samples[1].time, 1_000.0);
    }

    #[test]
    fn test_evaluate_bracketed_and_alias_targets() {
        let sources = || {
            vec![
                timed("PPA:1", &[(0.0, 6.0)]),
                timed("PPA:2", &[(5.0, 2.0)]),
            ]
        };
        let outputs = invoke("Eval(0.01, {[PPA:1] / [PPA:2]}, PPA:1;PPA:2)", sources());
        assert_eq!(outputs[0].1.len(), 1);
        assert_eq!(outputs[0].1[0].value, 3.0);
        assert_eq!(outputs[0].1[0].time, 0.0);

        let outputs = invoke("Eval(0.01, {PPA_1 - PPA_2}, PPA:1;PPA:2)", sources());
        assert_eq!(outputs[0].1[0].value, 4.0);
    }

    #[test]
    fn test_missing_variable_skips_slice() {
        let outputs = invoke(
            "Evaluate(0, {A - B}, A;B)",
            vec![
                timed("A", &[(0.0, 5.0), (1_000.0, 7.0), (2_000.0, 9.0)]),
                timed("B", &[(0.0, 1.0), (2_000.0, 4.0)]),
            ],
        );
        let samples = &outputs[0].1;
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![4.0, 5.0]);
        assert_eq!(samples[1].time, 2_000.0);
    }

    #[test]
    fn test_invalid_expression_fails_before_execution() {
        let engine: FunctionEngine<MeasurementValue> = FunctionEngine::new(EngineConfig::default());
        let request = InvocationRequest::parse_call("Evaluate(0, {A + }, A;B)").unwrap();
        let err = engine.execute(&request, Vec::new()).err().unwrap();
        assert!(matches!(err, SeriesError::ExpressionError(_)));

        let parse: ParseError = CompiledExpression::compile("A + ").unwrap_err();
        assert_eq!(parse.line, 1);
    }

    #[test]
    fn test_kernel_output_shape() {
        let expression = Arc::new(CompiledExpression::compile("max(A, B)").unwrap());
        let output = Computation::deferred(Evaluate::new(expression)).apply(vec![
            MeasurementValue::new("B", 3.0, 20.0),
            MeasurementValue::new("A", 4.0, 10.0),
        ]);
        assert_eq!(output.len(), 1);
        assert_eq!(&*output[0].target, "max(A, B)");
        assert_eq!(output[0].time, 10.0);
        assert_eq!(output[0].value, 4.0);
    }
}
