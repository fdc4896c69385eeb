//! 参数定义与绑定后的参数
//!
//! @yutiansut @quantaxis

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::group_operation::GroupOperation;
use super::FunctionDescriptor;
use crate::model::metadata::{MetadataCollection, MetadataMap};
use crate::model::series::{SampleIter, SampleStream};
use crate::model::units::{AngleUnit, TimeUnit};
use crate::{Result, SeriesError};

// ═══════════════════════════════════════════════════════════════════════════
// 参数类型与取值
// ═══════════════════════════════════════════════════════════════════════════

/// 参数类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParameterType {
    Float,
    Integer,
    Boolean,
    Text,
    TimeUnit,
    AngleUnit,
    /// N 或 N%
    Count,
    /// 0..=100，可带 %
    Percentage,
    /// 花括号包围的子表达式
    Expression,
}

impl ParameterType {
    /// 字面量解析失败时是否可按目标序列引用解析
    pub fn accepts_target(self) -> bool {
        matches!(
            self,
            ParameterType::Float | ParameterType::Count | ParameterType::Percentage
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ParameterType::Float => "float",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
            ParameterType::Text => "string",
            ParameterType::TimeUnit => "time unit",
            ParameterType::AngleUnit => "angle unit",
            ParameterType::Count => "count",
            ParameterType::Percentage => "percentage",
            ParameterType::Expression => "expression",
        }
    }
}

/// 数量参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CountSpec {
    Absolute(usize),
    Percent(f64),
    /// 来自目标序列的 (0, 1) 小数
    Fraction(f64),
}

impl CountSpec {
    /// 解析 `N` 或 `N%`
    pub fn parse(token: &str) -> std::result::Result<CountSpec, String> {
        let token = token.trim();
        if let Some(percent) = token.strip_suffix('%') {
            let value: f64 = percent
                .trim()
                .parse()
                .map_err(|_| format!("\"{}\" is not a valid percentage", token))?;
            if !(0.0..=100.0).contains(&value) || value == 0.0 {
                return Err(format!(
                    "percentage \"{}\" must be greater than 0 and at most 100",
                    token
                ));
            }
            return Ok(CountSpec::Percent(value));
        }

        let value: f64 = token
            .parse()
            .map_err(|_| format!("\"{}\" is not a valid count", token))?;
        if value.is_nan() || value <= 0.0 {
            return Err(format!("count \"{}\" must be greater than zero", token));
        }
        Ok(Self::from_value(value))
    }

    /// 数值形式 (目标序列取值)：(0, 1) 视为比例
    pub fn from_value(value: f64) -> CountSpec {
        if value > 0.0 && value < 1.0 {
            CountSpec::Fraction(value)
        } else {
            CountSpec::Absolute(value.max(0.0) as usize)
        }
    }

    /// 换算为具体数量，比例形式向下取整且至少为 1
    pub fn resolve(self, length: usize) -> usize {
        let scaled = |fraction: f64| -> usize {
            if length == 0 {
                0
            } else {
                ((length as f64 * fraction) as usize).max(1)
            }
        };
        match self {
            CountSpec::Absolute(n) => n,
            CountSpec::Percent(p) => scaled(p / 100.0),
            CountSpec::Fraction(f) => scaled(f),
        }
    }
}

impl fmt::Display for CountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountSpec::Absolute(n) => write!(f, "{}", n),
            CountSpec::Percent(p) => write!(f, "{}%", p),
            CountSpec::Fraction(v) => write!(f, "{}", v),
        }
    }
}

/// 参数取值
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
    TimeUnit(TimeUnit),
    AngleUnit(AngleUnit),
    Count(CountSpec),
    Percentage(f64),
    Expression(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Boolean(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => write!(f, "\"{}\"", v),
            ParameterValue::TimeUnit(v) => write!(f, "{}", v),
            ParameterValue::AngleUnit(v) => write!(f, "{}", v),
            ParameterValue::Count(v) => write!(f, "{}", v),
            ParameterValue::Percentage(v) => write!(f, "{}%", v),
            ParameterValue::Expression(v) => write!(f, "{{{}}}", v),
        }
    }
}

/// 自定义解析器
pub type CustomParser = fn(&str) -> std::result::Result<ParameterValue, String>;

// ═══════════════════════════════════════════════════════════════════════════
// 参数定义
// ═══════════════════════════════════════════════════════════════════════════

/// 参数定义 (注册时声明，之后只读)
#[derive(Clone)]
pub struct ParameterDefinition {
    pub name: String,
    pub description: String,
    pub value_type: ParameterType,
    pub default: Option<ParameterValue>,
    pub required: bool,
    pub parser: Option<CustomParser>,
}

impl ParameterDefinition {
    pub fn required(name: &str, value_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value_type,
            default: None,
            required: true,
            parser: None,
        }
    }

    /// 可选参数；`default` 为 None 时未提供即为空
    pub fn optional(
        name: &str,
        value_type: ParameterType,
        default: Option<ParameterValue>,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value_type,
            default,
            required: false,
            parser: None,
        }
    }

    pub fn with_parser(mut self, parser: CustomParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Slice 模式自动插入的首个参数 (秒)
    pub fn slice_tolerance() -> Self {
        Self::required(
            "sliceTolerance",
            ParameterType::Float,
            "Time tolerance, in seconds, used to group samples from each series into one slice.",
        )
    }

    /// 字面量解析
    pub fn parse_literal(&self, token: &str) -> std::result::Result<ParameterValue, String> {
        if let Some(parser) = self.parser {
            return parser(token);
        }

        let token = token.trim();
        match self.value_type {
            ParameterType::Float => parse_float(token).map(ParameterValue::Float),
            ParameterType::Integer => parse_integer(token).map(ParameterValue::Integer),
            ParameterType::Boolean => parse_boolean(token).map(ParameterValue::Boolean),
            ParameterType::Text => Ok(ParameterValue::Text(unquote(token).to_string())),
            ParameterType::TimeUnit => token.parse().map(ParameterValue::TimeUnit),
            ParameterType::AngleUnit => token.parse().map(ParameterValue::AngleUnit),
            ParameterType::Count => CountSpec::parse(token).map(ParameterValue::Count),
            ParameterType::Percentage => parse_percentage(token).map(ParameterValue::Percentage),
            ParameterType::Expression => {
                let inner = token
                    .strip_prefix('{')
                    .and_then(|t| t.strip_suffix('}'))
                    .ok_or_else(|| format!("expression \"{}\" must be enclosed in braces", token))?;
                Ok(ParameterValue::Expression(inner.trim().to_string()))
            }
        }
    }

    pub fn describe(&self) -> ParameterDescription {
        ParameterDescription {
            name: self.name.clone(),
            description: self.description.clone(),
            value_type: self.value_type.name().to_string(),
            required: self.required,
            default: self.default.as_ref().map(|v| v.to_string()),
        }
    }
}

impl fmt::Debug for ParameterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDefinition")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("custom_parser", &self.parser.is_some())
            .finish()
    }
}

/// 参数说明 (目录内省)
#[derive(Debug, Clone, Serialize)]
pub struct ParameterDescription {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn parse_float(token: &str) -> std::result::Result<f64, String> {
    token
        .parse::<f64>()
        .map_err(|_| format!("\"{}\" is not a valid floating-point value", token))
}

fn parse_integer(token: &str) -> std::result::Result<i64, String> {
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value);
    }
    match token.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.is_finite() => Ok(value as i64),
        _ => Err(format!("\"{}\" is not a valid integer value", token)),
    }
}

fn parse_boolean(token: &str) -> std::result::Result<bool, String> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("\"{}\" is not a valid boolean value", token)),
    }
}

fn parse_percentage(token: &str) -> std::result::Result<f64, String> {
    let digits = token.strip_suffix('%').unwrap_or(token).trim();
    let value = parse_float(digits)?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("percentage \"{}\" must be between 0 and 100", token))
    }
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
        .unwrap_or(token)
}

// ═══════════════════════════════════════════════════════════════════════════
// 绑定后的参数
// ═══════════════════════════════════════════════════════════════════════════

/// 上游源句柄
pub enum SourceHandle<T> {
    Iter(SampleIter<T>),
    Stream(SampleStream<T>),
}

/// 一次调用绑定完成的参数
///
/// 由调用独占，不跨查询共享。
pub struct Parameters<T> {
    descriptor: Arc<FunctionDescriptor>,
    values: Vec<Option<ParameterValue>>,
    parsed_count: usize,
    group_operation: GroupOperation,
    /// 毫秒
    slice_tolerance: Option<f64>,
    root_target: Arc<str>,
    metadata: MetadataCollection,
    source: Option<SourceHandle<T>>,
}

impl<T> Parameters<T> {
    pub fn new(
        descriptor: Arc<FunctionDescriptor>,
        values: Vec<Option<ParameterValue>>,
        parsed_count: usize,
        group_operation: GroupOperation,
        root_target: Arc<str>,
        metadata: MetadataCollection,
    ) -> Self {
        Self {
            descriptor,
            values,
            parsed_count,
            group_operation,
            slice_tolerance: None,
            root_target,
            metadata,
            source: None,
        }
    }

    pub fn with_slice_tolerance(mut self, tolerance_ms: Option<f64>) -> Self {
        self.slice_tolerance = tolerance_ms;
        self
    }

    pub fn with_source(mut self, source: SourceHandle<T>) -> Self {
        self.source = Some(source);
        self
    }

    /// 取走上游源 (只能取一次)
    pub fn take_source(&mut self) -> Option<SourceHandle<T>> {
        self.source.take()
    }

    pub fn function_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 调用方显式提供的参数个数
    pub fn parsed_count(&self) -> usize {
        self.parsed_count
    }

    pub fn group_operation(&self) -> GroupOperation {
        self.group_operation
    }

    pub fn slice_tolerance(&self) -> Option<f64> {
        self.slice_tolerance
    }

    pub fn root_target(&self) -> &Arc<str> {
        &self.root_target
    }

    pub fn metadata(&self) -> &MetadataCollection {
        &self.metadata
    }

    pub fn metadata_for(&self, target: &str) -> MetadataMap {
        self.metadata.get_or_empty(target)
    }

    pub fn value(&self, index: usize) -> Option<&ParameterValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// 按名称取值 (不区分大小写)
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        let index = self
            .descriptor
            .parameters
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))?;
        self.value(index)
    }

    pub fn float(&self, index: usize) -> Result<f64> {
        match self.value(index) {
            Some(ParameterValue::Float(v)) | Some(ParameterValue::Percentage(v)) => Ok(*v),
            Some(ParameterValue::Integer(v)) => Ok(*v as f64),
            other => Err(self.mismatch(index, "float", other)),
        }
    }

    pub fn integer(&self, index: usize) -> Result<i64> {
        match self.value(index) {
            Some(ParameterValue::Integer(v)) => Ok(*v),
            Some(ParameterValue::Float(v)) if v.fract() == 0.0 => Ok(*v as i64),
            other => Err(self.mismatch(index, "integer", other)),
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool> {
        match self.value(index) {
            Some(ParameterValue::Boolean(v)) => Ok(*v),
            other => Err(self.mismatch(index, "boolean", other)),
        }
    }

    /// 可选布尔参数，未提供且无默认值时为 None
    pub fn opt_boolean(&self, index: usize) -> Option<bool> {
        match self.value(index) {
            Some(ParameterValue::Boolean(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, index: usize) -> Result<&str> {
        match self.value(index) {
            Some(ParameterValue::Text(v)) | Some(ParameterValue::Expression(v)) => Ok(v),
            other => Err(self.mismatch(index, "string", other)),
        }
    }

    pub fn time_unit(&self, index: usize) -> Result<TimeUnit> {
        match self.value(index) {
            Some(ParameterValue::TimeUnit(v)) => Ok(*v),
            other => Err(self.mismatch(index, "time unit", other)),
        }
    }

    pub fn angle_unit(&self, index: usize) -> Result<AngleUnit> {
        match self.value(index) {
            Some(ParameterValue::AngleUnit(v)) => Ok(*v),
            other => Err(self.mismatch(index, "angle unit", other)),
        }
    }

    pub fn count(&self, index: usize) -> Result<CountSpec> {
        match self.value(index) {
            Some(ParameterValue::Count(v)) => Ok(*v),
            Some(ParameterValue::Integer(v)) if *v > 0 => Ok(CountSpec::Absolute(*v as usize)),
            other => Err(self.mismatch(index, "count", other)),
        }
    }

    pub fn expression(&self, index: usize) -> Result<&str> {
        match self.value(index) {
            Some(ParameterValue::Expression(v)) => Ok(v),
            other => Err(self.mismatch(index, "expression", other)),
        }
    }

    fn mismatch(&self, index: usize, expected: &str, actual: Option<&ParameterValue>) -> SeriesError {
        let name = self
            .descriptor
            .parameters
            .get(index)
            .map(|p| p.name.as_str())
            .unwrap_or("?");
        SeriesError::BindingError(format!(
            "Parameter {} (\"{}\") of function \"{}\" is not a {} value: {:?}",
            index, name, self.descriptor.name, expected, actual
        ))
    }
}

impl<T> Clone for Parameters<T> {
    /// 源句柄不随克隆复制
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            values: self.values.clone(),
            parsed_count: self.parsed_count,
            group_operation: self.group_operation,
            slice_tolerance: self.slice_tolerance,
            root_target: self.root_target.clone(),
            metadata: self.metadata.clone(),
            source: None,
        }
    }
}

impl<T> fmt::Debug for Parameters<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("function", &self.descriptor.name)
            .field("values", &self.values)
            .field("parsed_count", &self.parsed_count)
            .field("group_operation", &self.group_operation)
            .field("slice_tolerance", &self.slice_tolerance)
            .field("root_target", &self.root_target)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}
