//! 表达式求值
//!
//! @yutiansut @quantaxis
//!
//! 所有值均为 f64；比较与逻辑运算产生 1/0，非零且非 NaN 视为真。

use std::collections::HashMap;

use super::ast::*;

// ═══════════════════════════════════════════════════════════════════════════
// 执行错误
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Variable \"{0}\" is not bound")]
    UnboundVariable(String),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// 目标名别名：非字母数字字符替换为 `_`
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// 变量绑定
// ═══════════════════════════════════════════════════════════════════════════

/// 变量表，键大小写不敏感
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, f64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以目标名绑定，同时登记其别名 (不覆盖同名的真实目标)
    pub fn bind(&mut self, target: &str, value: f64) {
        let key = target.to_ascii_lowercase();
        let alias = sanitize(&key);
        if alias != key {
            self.values.entry(alias).or_insert(value);
        }
        self.values.insert(key, value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 求值器
// ═══════════════════════════════════════════════════════════════════════════

fn truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// 表达式求值器
pub struct Evaluator<'a> {
    bindings: &'a Bindings,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a Bindings) -> Self {
        Self { bindings }
    }

    pub fn evaluate(&self, expr: &Expr) -> ExecutionResult<f64> {
        match expr {
            Expr::Number(v) => Ok(*v),
            Expr::Variable(name) => self
                .bindings
                .get(name)
                .ok_or_else(|| ExecutionError::UnboundVariable(name.clone())),
            Expr::Unary(op, operand) => {
                let value = self.evaluate(operand)?;
                Ok(match op {
                    UnaryOperator::Neg => -value,
                    UnaryOperator::Not => flag(!truthy(value)),
                })
            }
            Expr::Binary(op, left, right) if op.is_logical() => {
                let left = truthy(self.evaluate(left)?);
                let result = match op {
                    BinaryOperator::And => left && truthy(self.evaluate(right)?),
                    _ => left || truthy(self.evaluate(right)?),
                };
                Ok(flag(result))
            }
            Expr::Binary(op, left, right) => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                Ok(Self::arithmetic(*op, l, r))
            }
            Expr::Call(function, args) => self.call(*function, args),
        }
    }

    fn arithmetic(op: BinaryOperator, l: f64, r: f64) -> f64 {
        match op {
            BinaryOperator::Add => l + r,
            BinaryOperator::Sub => l - r,
            BinaryOperator::Mul => l * r,
            BinaryOperator::Div => l / r,
            BinaryOperator::Rem => l % r,
            BinaryOperator::Pow => l.powf(r),
            BinaryOperator::Eq => flag(l == r),
            BinaryOperator::Ne => flag(l != r),
            BinaryOperator::Lt => flag(l < r),
            BinaryOperator::Le => flag(l <= r),
            BinaryOperator::Gt => flag(l > r),
            BinaryOperator::Ge => flag(l >= r),
            BinaryOperator::And => flag(truthy(l) && truthy(r)),
            BinaryOperator::Or => flag(truthy(l) || truthy(r)),
        }
    }

    fn call(&self, function: Builtin, args: &[Expr]) -> ExecutionResult<f64> {
        if let (Builtin::If, [condition, then, otherwise]) = (function, args) {
            let branch = if truthy(self.evaluate(condition)?) { then } else { otherwise };
            return self.evaluate(branch);
        }

        let values = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<ExecutionResult<Vec<f64>>>()?;
        Ok(apply(function, &values))
    }
}

/// 对已求值的参数应用内置函数，参数个数已在解析期校验
fn apply(function: Builtin, values: &[f64]) -> f64 {
    let x = values.first().copied().unwrap_or(f64::NAN);
    let y = values.get(1).copied();

    match function {
        Builtin::Abs => x.abs(),
        Builtin::Sqrt => x.sqrt(),
        Builtin::Sin => x.sin(),
        Builtin::Cos => x.cos(),
        Builtin::Tan => x.tan(),
        Builtin::Ln => x.ln(),
        Builtin::Log => match y {
            Some(base) => x.log(base),
            None => x.log10(),
        },
        Builtin::Exp => x.exp(),
        Builtin::Floor => x.floor(),
        Builtin::Ceil => x.ceil(),
        Builtin::Round => match y {
            Some(digits) => {
                let scale = 10f64.powi(digits.clamp(0.0, 15.0) as i32);
                (x * scale).round() / scale
            }
            None => x.round(),
        },
        Builtin::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Builtin::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Builtin::Pow => x.powf(y.unwrap_or(1.0)),
        Builtin::Atan2 => x.atan2(y.unwrap_or(1.0)),
        Builtin::If => {
            if truthy(x) {
                y.unwrap_or(f64::NAN)
            } else {
                values.get(2).copied().unwrap_or(f64::NAN)
            }
        }
    }
}
