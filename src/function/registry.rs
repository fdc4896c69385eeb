//! 函数目录
//!
//! @yutiansut @quantaxis
//!
//! 每种样本形态一个目录，启动时注册一次，之后只读。
//! 名称与别名查找不区分大小写，并识别 `Set`/`Slice` 前缀。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::computation::Computation;
use super::group_operation::GroupOperation;
use super::parameter::Parameters;
use super::{FunctionDescription, FunctionDescriptor};
use crate::model::sample::SeriesValue;
use crate::{Result, SeriesError};

/// 内核工厂：由绑定后的参数构造一次计算
pub type KernelFactory<T> = Arc<dyn Fn(&Parameters<T>) -> Result<Computation<T>> + Send + Sync>;

/// 已注册函数
pub struct SeriesFunction<T> {
    descriptor: Arc<FunctionDescriptor>,
    factory: KernelFactory<T>,
}

impl<T: SeriesValue> SeriesFunction<T> {
    pub fn descriptor(&self) -> &Arc<FunctionDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// 构造计算实例
    pub fn create(&self, parameters: &Parameters<T>) -> Result<Computation<T>> {
        (self.factory)(parameters)
    }
}

impl<T> Clone for SeriesFunction<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<T> fmt::Debug for SeriesFunction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesFunction")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// 函数目录
pub struct FunctionCatalog<T> {
    functions: Vec<SeriesFunction<T>>,
    index: HashMap<String, usize>,
}

impl<T: SeriesValue> FunctionCatalog<T> {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// 注册函数
    pub fn register<F>(&mut self, descriptor: FunctionDescriptor, factory: F) -> Result<()>
    where
        F: Fn(&Parameters<T>) -> Result<Computation<T>> + Send + Sync + 'static,
    {
        descriptor.validate()?;

        let keys: Vec<String> = std::iter::once(&descriptor.name)
            .chain(descriptor.aliases.iter())
            .map(|n| n.to_ascii_lowercase())
            .collect();
        if let Some(conflict) = keys.iter().find(|k| self.index.contains_key(*k)) {
            return Err(SeriesError::RegistrationError(format!(
                "function name or alias \"{}\" is already registered",
                conflict
            )));
        }

        let position = self.functions.len();
        for key in keys {
            self.index.insert(key, position);
        }
        self.functions.push(SeriesFunction {
            descriptor: Arc::new(descriptor),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// 按名称或别名精确查找
    pub fn get(&self, name: &str) -> Option<&SeriesFunction<T>> {
        self.index
            .get(&name.trim().to_ascii_lowercase())
            .map(|&i| &self.functions[i])
    }

    /// 查找函数，同时识别 `Set`/`Slice` 前缀请求的分组运算
    pub fn lookup(&self, name: &str) -> Result<(&SeriesFunction<T>, Option<GroupOperation>)> {
        if let Some(function) = self.get(name) {
            return Ok((function, None));
        }
        GroupOperation::split_prefixed_name(name.trim())
            .and_then(|(op, base)| self.get(base).map(|f| (f, Some(op))))
            .ok_or_else(|| SeriesError::UnknownFunction(name.trim().to_string()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesFunction<T>> {
        self.functions.iter()
    }

    /// 目录内省
    pub fn descriptions(&self) -> Vec<FunctionDescription> {
        self.functions
            .iter()
            .flat_map(|f| f.descriptor.describe())
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.descriptions())?)
    }
}

impl<T: SeriesValue> Default for FunctionCatalog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FunctionCatalog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCatalog")
            .field("functions", &self.functions.len())
            .finish()
    }
}
