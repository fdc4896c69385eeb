//! 参数绑定器
//!
//! @yutiansut @quantaxis
//!
//! 绑定分两步：
//! 1. `ParameterBinder::bind` 把记号按位置绑定为字面量或目标引用 (执行前完成，错误同步返回)
//! 2. `BoundArguments::resolve` 用目标取值函数把引用解析为具体数值
//!    (Standard/Set 取目标序列首个样本，Slice 取当前切片内的样本)

use dashmap::DashMap;

use super::group_operation::GroupOperation;
use super::parameter::{CountSpec, ParameterDefinition, ParameterType, ParameterValue};
use crate::{Result, SeriesError};

// ═══════════════════════════════════════════════════════════════════════════
// 字面量解析缓存
// ═══════════════════════════════════════════════════════════════════════════

type CacheKey = (ParameterType, usize, String);

/// 字面量解析缓存 (并发安全)
///
/// 键为 (类型标签, 自定义解析器地址, 记号)，超过容量时整体清空。
#[derive(Debug)]
pub struct LiteralCache {
    entries: DashMap<CacheKey, std::result::Result<ParameterValue, String>>,
    capacity: usize,
}

impl LiteralCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn parse(
        &self,
        definition: &ParameterDefinition,
        token: &str,
    ) -> std::result::Result<ParameterValue, String> {
        if self.capacity == 0 {
            return definition.parse_literal(token);
        }

        let key = (
            definition.value_type,
            definition.parser.map_or(0, |p| p as usize),
            token.to_string(),
        );
        if let Some(hit) = self.entries.get(&key) {
            return hit.value().clone();
        }

        let parsed = definition.parse_literal(token);
        if self.entries.len() >= self.capacity {
            log::debug!("literal cache reached {} entries, clearing", self.capacity);
            self.entries.clear();
        }
        self.entries.insert(key, parsed.clone());
        parsed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LiteralCache {
    fn default() -> Self {
        Self::new(4096)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 绑定结果
// ═══════════════════════════════════════════════════════════════════════════

/// 单个位置的绑定值
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Literal(ParameterValue),
    /// 目标序列引用，`name;fallback` 语法提供回退值
    Target {
        target: String,
        fallback: Option<f64>,
    },
    /// 可选参数未提供且无默认值
    Absent,
}

/// 目标引用解析模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution {
    /// 找不到目标且无回退值时报错 (Standard/Set)
    Strict,
    /// 找不到目标时使用回退值或 0 (Slice)
    Lenient,
}

/// 绑定完成的参数
#[derive(Debug, Clone)]
pub struct BoundArguments {
    pub values: Vec<BoundValue>,
    /// 显式提供的参数个数 (不含切片容差)
    pub parsed_count: usize,
    /// 原始参数记号 (含切片容差，不含源表达式)，用于输出命名
    pub tokens: Vec<String>,
    pub source_expression: String,
    /// 切片容差 (毫秒)
    pub slice_tolerance: Option<f64>,
}

impl BoundArguments {
    pub fn target_references(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(|v| match v {
            BoundValue::Target { target, .. } => Some(target.as_str()),
            _ => None,
        })
    }

    pub fn has_target_references(&self) -> bool {
        self.target_references().next().is_some()
    }

    /// 解析为最终参数值
    pub fn resolve<F>(
        &self,
        function: &str,
        definitions: &[ParameterDefinition],
        lookup: F,
        mode: TargetResolution,
    ) -> Result<Vec<Option<ParameterValue>>>
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.values
            .iter()
            .zip(definitions)
            .map(|(bound, definition)| match bound {
                BoundValue::Literal(value) => Ok(Some(value.clone())),
                BoundValue::Absent => Ok(None),
                BoundValue::Target { target, fallback } => {
                    let value = match (lookup(target), fallback, mode) {
                        (Some(v), _, _) => v,
                        (None, Some(f), _) => *f,
                        (None, None, TargetResolution::Lenient) => 0.0,
                        (None, None, TargetResolution::Strict) => {
                            return Err(SeriesError::BindingError(format!(
                                "Value target '{}' for parameter \"{}\" of \"{}\" could not be found in dataset nor parsed as a {} value",
                                target,
                                definition.name,
                                function,
                                definition.value_type.name()
                            )))
                        }
                    };
                    coerce_target_value(definition.value_type, value)
                        .map(Some)
                        .map_err(|reason| {
                            SeriesError::BindingError(format!(
                                "Value target '{}' for parameter \"{}\" of \"{}\" is not usable: {}",
                                target, definition.name, function, reason
                            ))
                        })
                }
            })
            .collect()
    }
}

/// 目标取值转换；数量与字面量同样要求大于 0
fn coerce_target_value(value_type: ParameterType, value: f64) -> std::result::Result<ParameterValue, String> {
    match value_type {
        ParameterType::Count if value.is_nan() || value <= 0.0 => {
            Err(format!("count {} must be greater than zero", value))
        }
        ParameterType::Count => Ok(ParameterValue::Count(CountSpec::from_value(value))),
        ParameterType::Percentage => Ok(ParameterValue::Percentage(value.clamp(0.0, 100.0))),
        _ => Ok(ParameterValue::Float(value)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 绑定器
// ═══════════════════════════════════════════════════════════════════════════

/// 参数绑定器
pub struct ParameterBinder<'a> {
    function: &'a str,
    definitions: &'a [ParameterDefinition],
    cache: &'a LiteralCache,
}

impl<'a> ParameterBinder<'a> {
    pub fn new(
        function: &'a str,
        definitions: &'a [ParameterDefinition],
        cache: &'a LiteralCache,
    ) -> Self {
        Self {
            function,
            definitions,
            cache,
        }
    }

    /// 绑定参数记号
    ///
    /// `tokens` 的最后一个元素为源表达式；Slice 模式下第一个元素为容差 (秒)。
    pub fn bind(&self, mut tokens: Vec<String>, operation: GroupOperation) -> Result<BoundArguments> {
        let source_expression = tokens.pop().ok_or_else(|| {
            SeriesError::FormatError(format!(
                "Expected a source expression for \"{}\"",
                self.function
            ))
        })?;
        let raw_tokens = tokens.clone();

        let mut supplied = tokens.into_iter();
        let slice_tolerance = if operation == GroupOperation::Slice {
            let token = supplied.next().ok_or_else(|| {
                SeriesError::BindingError(format!(
                    "Slice operation of \"{}\" requires a slice tolerance parameter",
                    self.function
                ))
            })?;
            Some(self.parse_tolerance(&token)?)
        } else {
            None
        };

        let supplied: Vec<String> = supplied.collect();
        if supplied.len() > self.definitions.len() {
            return Err(SeriesError::FormatError(format!(
                "Expected at most {} parameters for \"{}\", received {}",
                self.definitions.len() + 1,
                self.function,
                supplied.len() + 1
            )));
        }

        let values = self
            .definitions
            .iter()
            .enumerate()
            .map(|(index, definition)| match supplied.get(index) {
                Some(token) => self.bind_token(definition, token),
                None if definition.required => Err(SeriesError::BindingError(format!(
                    "Required parameter \"{}\" of \"{}\" is missing",
                    definition.name, self.function
                ))),
                None => Ok(definition
                    .default
                    .clone()
                    .map_or(BoundValue::Absent, BoundValue::Literal)),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BoundArguments {
            values,
            parsed_count: supplied.len(),
            tokens: raw_tokens,
            source_expression: source_expression.trim().to_string(),
            slice_tolerance,
        })
    }

    /// 先按字面量解析，失败后按目标引用绑定
    fn bind_token(&self, definition: &ParameterDefinition, token: &str) -> Result<BoundValue> {
        let token = token.trim();
        match self.cache.parse(definition, token) {
            Ok(value) => Ok(BoundValue::Literal(value)),
            Err(reason) if definition.value_type.accepts_target() && is_target_token(token) => {
                log::trace!(
                    "parameter \"{}\" of \"{}\" bound to target '{}' ({})",
                    definition.name,
                    self.function,
                    token,
                    reason
                );
                Ok(parse_target_reference(token))
            }
            Err(reason) => Err(SeriesError::BindingError(format!(
                "Parameter \"{}\" of \"{}\" could not be parsed as a {} value: {}",
                definition.name,
                self.function,
                definition.value_type.name(),
                reason
            ))),
        }
    }

    fn parse_tolerance(&self, token: &str) -> Result<f64> {
        let seconds: f64 = token.trim().parse().map_err(|_| {
            SeriesError::BindingError(format!(
                "Slice tolerance \"{}\" of \"{}\" is not a valid floating-point value",
                token.trim(),
                self.function
            ))
        })?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(SeriesError::BindingError(format!(
                "Slice tolerance of \"{}\" must be a non-negative number of seconds, received {}",
                self.function, seconds
            )));
        }
        Ok(seconds * 1_000.0)
    }
}

fn is_target_token(token: &str) -> bool {
    !token.is_empty() && !token.starts_with('{') && !token.starts_with('"')
}

fn parse_target_reference(token: &str) -> BoundValue {
    match token.split_once(';') {
        Some((target, fallback)) => match fallback.trim().parse::<f64>() {
            Ok(value) => BoundValue::Target {
                target: target.trim().to_string(),
                fallback: Some(value),
            },
            Err(_) => BoundValue::Target {
                target: token.to_string(),
                fallback: None,
            },
        },
        None => BoundValue::Target {
            target: token.to_string(),
            fallback: None,
        },
    }
}
