//! 函数定义模块
//!
//! @yutiansut @quantaxis
//!
//! - `FunctionDescriptor`: 进程级只读函数描述 (名称/别名/参数/分组运算/执行模式)
//! - parameter / binder / scanner: 参数定义、绑定与记号扫描
//! - group_operation: 分组运算集合与覆盖策略
//! - computation: Deferred / Immediate 内核契约
//! - registry: 按样本形态划分的函数目录

pub mod binder;
pub mod computation;
pub mod group_operation;
pub mod parameter;
pub mod registry;
pub mod scanner;

use serde::Serialize;
use std::fmt;

use group_operation::{GroupOperation, GroupOperationPolicy, GroupOperations};
use parameter::{ParameterDefinition, ParameterDescription};
use scanner::{scan_default, ParameterCounts, TokenScanner};

use crate::{Result, SeriesError};

pub use computation::{Computation, StreamKernel};

/// 返回类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnType {
    /// 每组输入产生单个值
    Scalar,
    /// 产生样本序列
    Series,
}

/// 执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// 流式逐个产出，不缓冲完整输入
    Deferred,
    /// 完整物化输入后计算
    Immediate,
}

// ═══════════════════════════════════════════════════════════════════════════
// 函数描述符
// ═══════════════════════════════════════════════════════════════════════════

/// 函数描述符
#[derive(Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub return_type: ReturnType,
    pub parameters: Vec<ParameterDefinition>,
    pub allowed_group_operations: GroupOperations,
    pub supported_group_operations: GroupOperations,
    pub published_group_operations: GroupOperations,
    pub policy: GroupOperationPolicy,
    pub is_slice_series_equivalent: bool,
    pub execution_mode: ExecutionMode,
    pub scanner: TokenScanner,
    /// 输出标签模板所在的参数位置 (Label 类函数)
    pub label_parameter: Option<usize>,
}

impl FunctionDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            description: description.to_string(),
            return_type: ReturnType::Series,
            parameters: Vec::new(),
            allowed_group_operations: GroupOperations::ALL,
            supported_group_operations: GroupOperations::ALL,
            published_group_operations: GroupOperations::ALL,
            policy: GroupOperationPolicy::Validate,
            is_slice_series_equivalent: false,
            execution_mode: ExecutionMode::Deferred,
            scanner: scan_default,
            label_parameter: None,
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn parameter(mut self, definition: ParameterDefinition) -> Self {
        self.parameters.push(definition);
        self
    }

    /// 同时设置 allowed / supported / published
    pub fn group_operations(mut self, operations: GroupOperations) -> Self {
        self.allowed_group_operations = operations;
        self.supported_group_operations = operations;
        self.published_group_operations = operations;
        self
    }

    pub fn supported(mut self, operations: GroupOperations) -> Self {
        self.supported_group_operations = operations;
        self
    }

    pub fn published(mut self, operations: GroupOperations) -> Self {
        self.published_group_operations = operations;
        self
    }

    pub fn policy(mut self, policy: GroupOperationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn slice_series_equivalent(mut self) -> Self {
        self.is_slice_series_equivalent = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.execution_mode = ExecutionMode::Immediate;
        self
    }

    pub fn scanner(mut self, scanner: TokenScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn label_parameter(mut self, index: usize) -> Self {
        self.label_parameter = Some(index);
        self
    }

    /// 注册时校验
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(SeriesError::RegistrationError(format!(
                "function \"{}\": {}",
                self.name, reason
            )))
        };

        if self.name.trim().is_empty() {
            return fail("name must not be empty".into());
        }
        if !self
            .supported_group_operations
            .is_subset(self.allowed_group_operations)
        {
            return fail("supported group operations must be a subset of allowed".into());
        }
        if !self
            .published_group_operations
            .is_subset(self.allowed_group_operations)
        {
            return fail("published group operations must be a subset of allowed".into());
        }
        if let GroupOperationPolicy::Force(op) = self.policy {
            if op == GroupOperation::None || !self.supported_group_operations.contains(op) {
                return fail(format!("forced group operation {} is not supported", op));
            }
        }

        let mut seen_optional = false;
        for parameter in &self.parameters {
            if parameter.required && seen_optional {
                return fail(format!(
                    "required parameter \"{}\" follows an optional parameter",
                    parameter.name
                ));
            }
            seen_optional |= !parameter.required;
        }

        if let Some(index) = self.label_parameter {
            if index >= self.parameters.len() {
                return fail("label parameter index out of range".into());
            }
        }
        Ok(())
    }

    /// 给定分组运算下的参数个数约束 (Slice 额外需要容差参数)
    pub fn parameter_counts(&self, operation: GroupOperation) -> ParameterCounts {
        let required = self.parameters.iter().filter(|p| p.required).count();
        let optional = self.parameters.len() - required;
        ParameterCounts {
            required: required + usize::from(operation == GroupOperation::Slice),
            optional,
        }
    }

    /// 策略强制的分组运算
    pub fn forced_operation(&self) -> Option<GroupOperation> {
        match self.policy {
            GroupOperationPolicy::Force(op) => Some(op),
            GroupOperationPolicy::IgnoreRequested => Some(GroupOperation::Standard),
            GroupOperationPolicy::Validate => None,
        }
    }

    /// 解析调用使用的分组运算
    pub fn resolve_group_operation(&self, requested: GroupOperation) -> Result<GroupOperation> {
        self.policy.resolve(
            &self.name,
            requested,
            self.allowed_group_operations,
            self.supported_group_operations,
        )
    }

    /// 某分组运算下对外发布的名称
    pub fn published_name(&self, operation: GroupOperation) -> String {
        if self.forced_operation().is_some() {
            self.name.clone()
        } else {
            format!("{}{}", operation.prefix(), self.name)
        }
    }

    /// 目录内省：每个发布的分组运算生成一条说明
    pub fn describe(&self) -> Vec<FunctionDescription> {
        let operations: Vec<GroupOperation> = match self.forced_operation() {
            Some(op) => vec![op],
            None => self.published_group_operations.iter().collect(),
        };

        operations
            .into_iter()
            .map(|operation| {
                let mut parameters = Vec::with_capacity(self.parameters.len() + 1);
                if operation == GroupOperation::Slice {
                    parameters.push(ParameterDefinition::slice_tolerance().describe());
                }
                parameters.extend(self.parameters.iter().map(ParameterDefinition::describe));

                FunctionDescription {
                    name: self.published_name(operation),
                    aliases: self
                        .aliases
                        .iter()
                        .map(|alias| match self.forced_operation() {
                            Some(_) => alias.clone(),
                            None => format!("{}{}", operation.prefix(), alias),
                        })
                        .collect(),
                    description: self.description.clone(),
                    return_type: self.return_type,
                    group_operation: operation,
                    execution_mode: self.execution_mode,
                    parameters,
                }
            })
            .collect()
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("return_type", &self.return_type)
            .field("parameters", &self.parameters)
            .field("allowed", &self.allowed_group_operations)
            .field("supported", &self.supported_group_operations)
            .field("published", &self.published_group_operations)
            .field("policy", &self.policy)
            .field("slice_series_equivalent", &self.is_slice_series_equivalent)
            .field("execution_mode", &self.execution_mode)
            .finish()
    }
}

/// 函数说明 (供调用方/文档层渲染)
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDescription {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub return_type: ReturnType,
    pub group_operation: GroupOperation,
    pub execution_mode: ExecutionMode,
    pub parameters: Vec<ParameterDescription>,
}

#[cfg(test)]
mod tests {
    use super::parameter::{ParameterType, ParameterValue};
    use super::*;

    fn add() -> FunctionDescriptor {
        FunctionDescriptor::new("Add", "Adds N to each value.")
            .parameter(ParameterDefinition::required("N", ParameterType::Float, "value"))
            .slice_series_equivalent()
    }

    #[test]
    fn test_parameter_counts() {
        let descriptor = add().parameter(ParameterDefinition::optional(
            "x",
            ParameterType::Boolean,
            Some(ParameterValue::Boolean(true)),
            "",
        ));
        let standard = descriptor.parameter_counts(GroupOperation::Standard);
        assert_eq!((standard.required, standard.optional), (1, 1));
        let slice = descriptor.parameter_counts(GroupOperation::Slice);
        assert_eq!((slice.required, slice.optional), (2, 1));
    }

    #[test]
    fn test_validate_rejects_bad_sets() {
        let descriptor = add()
            .group_operations(GroupOperations::STANDARD)
            .supported(GroupOperations::ALL);
        assert!(matches!(
            descriptor.validate(),
            Err(SeriesError::RegistrationError(_))
        ));

        let descriptor = add()
            .group_operations(GroupOperations::STANDARD)
            .policy(GroupOperationPolicy::Force(GroupOperation::Slice));
        assert!(descriptor.validate().is_err());

        let descriptor = FunctionDescriptor::new("Bad", "")
            .parameter(ParameterDefinition::optional("a", ParameterType::Float, None, ""))
            .parameter(ParameterDefinition::required("b", ParameterType::Float, ""));
        assert!(descriptor.validate().is_err());
        assert!(add().validate().is_ok());
    }

    #[test]
    fn test_describe_published_variants() {
        let descriptions = add().aliases(&["Plus"]).describe();
        let names: Vec<&str> = descriptions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Add", "SetAdd", "SliceAdd"]);
        assert_eq!(descriptions[2].parameters[0].name, "sliceTolerance");
        assert_eq!(descriptions[1].aliases, vec!["SetPlus"]);
    }

    #[test]
    fn test_describe_forced_publishes_plain_name() {
        let descriptor = FunctionDescriptor::new("Reference", "")
            .group_operations(GroupOperations::SLICE)
            .policy(GroupOperationPolicy::Force(GroupOperation::Slice));
        let descriptions = descriptor.describe();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].name, "Reference");
        assert_eq!(descriptions[0].group_operation, GroupOperation::Slice);
        assert_eq!(descriptions[0].parameters[0].name, "sliceTolerance");
    }
}
