//! Evaluate 表达式 DSL
//!
//! @yutiansut @quantaxis
//!
//! 切片内跨序列计算使用的算术表达式语言：
//! - 语法定义 (grammar.pest)
//! - AST 结构 (ast.rs)
//! - 解析器 (parser.rs)
//! - 求值器 (executor/)
//!
//! 变量按目标名 (大小写不敏感) 或其别名 (非字母数字替换为 `_`) 绑定，
//! 含特殊字符的目标名可写作 `[PPA:1]`。

pub mod ast;
pub mod executor;
pub mod parser;

pub use ast::*;
pub use executor::*;
pub use parser::*;

use crate::SeriesError;

impl From<ParseError> for SeriesError {
    fn from(e: ParseError) -> Self {
        SeriesError::ExpressionError(e.to_string())
    }
}

impl From<ExecutionError> for SeriesError {
    fn from(e: ExecutionError) -> Self {
        SeriesError::ExpressionError(e.to_string())
    }
}

/// 已解析的表达式
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    text: String,
    root: Expr,
}

impl CompiledExpression {
    pub fn compile(text: &str) -> ParseResult<Self> {
        Ok(Self {
            text: text.trim().to_string(),
            root: AstBuilder::parse(text)?,
        })
    }

    /// 原始表达式文本
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn variables(&self) -> Vec<&str> {
        self.root.variables()
    }

    pub fn evaluate(&self, bindings: &Bindings) -> ExecutionResult<f64> {
        Evaluator::new(bindings).evaluate(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_and_evaluate() {
        let expression = CompiledExpression::compile("  sqrt(A^2 + B^2) ").unwrap();
        assert_eq!(expression.text(), "sqrt(A^2 + B^2)");
        assert_eq!(expression.variables(), vec!["A", "B"]);

        let mut bindings = Bindings::new();
        bindings.bind("a", 3.0);
        bindings.bind("b", 4.0);
        assert_eq!(expression.evaluate(&bindings), Ok(5.0));
    }

    #[test]
    fn test_errors_map_to_expression_error() {
        let err: SeriesError = CompiledExpression::compile("A +* B").unwrap_err().into();
        assert_eq!(err.kind(), "expression");

        let expression = CompiledExpression::compile("A + C").unwrap();
        let mut bindings = Bindings::new();
        bindings.bind("A", 1.0);
        let err: SeriesError = expression.evaluate(&bindings).unwrap_err().into();
        assert!(err.to_string().contains("\"C\""));
    }
}
