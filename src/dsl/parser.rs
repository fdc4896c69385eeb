//! Evaluate 表达式解析器
//!
//! @yutiansut @quantaxis
//!
//! 基于 pest 的语法 + Pratt 运算符优先级 (低 → 高)：
//! `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`, 一元 `- !`, `^` (右结合)

use once_cell::sync::Lazy;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use super::ast::*;

// ═══════════════════════════════════════════════════════════════════════════
// Pest 解析器定义
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[grammar = "dsl/grammar.pest"]
pub struct ExpressionParser;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not))
        .op(Op::infix(Rule::pow, Assoc::Right))
});

// ═══════════════════════════════════════════════════════════════════════════
// 解析错误
// ═══════════════════════════════════════════════════════════════════════════

/// 解析错误
#[derive(Debug, Clone, thiserror::Error)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn at(pair: &Pair<'_, Rule>, message: String) -> Self {
        let (line, column) = pair.line_col();
        Self { message, line, column }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        ParseError {
            message: e.variant.message().to_string(),
            line,
            column,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

// ═══════════════════════════════════════════════════════════════════════════
// AST 构建器
// ═══════════════════════════════════════════════════════════════════════════

/// AST 构建器
pub struct AstBuilder;

impl AstBuilder {
    /// 解析完整表达式文本
    pub fn parse(input: &str) -> ParseResult<Expr> {
        let mut pairs = ExpressionParser::parse(Rule::formula, input)?;
        let expr = pairs
            .next()
            .and_then(|formula| formula.into_inner().find(|p| p.as_rule() == Rule::expr))
            .ok_or_else(|| ParseError {
                message: "empty expression".to_string(),
                line: 1,
                column: 1,
            })?;
        Self::build_expression(expr.into_inner())
    }

    fn build_expression(pairs: Pairs<'_, Rule>) -> ParseResult<Expr> {
        PRATT
            .map_primary(Self::build_primary)
            .map_prefix(|op, operand| {
                let operator = match op.as_rule() {
                    Rule::not => UnaryOperator::Not,
                    _ => UnaryOperator::Neg,
                };
                Ok(Expr::Unary(operator, Box::new(operand?)))
            })
            .map_infix(|left, op, right| {
                let operator = match op.as_rule() {
                    Rule::or => BinaryOperator::Or,
                    Rule::and => BinaryOperator::And,
                    Rule::eq => BinaryOperator::Eq,
                    Rule::ne => BinaryOperator::Ne,
                    Rule::lt => BinaryOperator::Lt,
                    Rule::le => BinaryOperator::Le,
                    Rule::gt => BinaryOperator::Gt,
                    Rule::ge => BinaryOperator::Ge,
                    Rule::add => BinaryOperator::Add,
                    Rule::sub => BinaryOperator::Sub,
                    Rule::mul => BinaryOperator::Mul,
                    Rule::div => BinaryOperator::Div,
                    Rule::rem => BinaryOperator::Rem,
                    Rule::pow => BinaryOperator::Pow,
                    rule => {
                        return Err(ParseError::at(&op, format!("unexpected operator {:?}", rule)))
                    }
                };
                Ok(Expr::Binary(operator, Box::new(left?), Box::new(right?)))
            })
            .parse(pairs)
    }

    fn build_primary(pair: Pair<'_, Rule>) -> ParseResult<Expr> {
        match pair.as_rule() {
            Rule::number => pair
                .as_str()
                .parse::<f64>()
                .map(Expr::Number)
                .map_err(|e| ParseError::at(&pair, format!("invalid number: {}", e))),
            Rule::identifier => Ok(match pair.as_str() {
                s if s.eq_ignore_ascii_case("true") => Expr::Number(1.0),
                s if s.eq_ignore_ascii_case("false") => Expr::Number(0.0),
                s => Expr::Variable(s.to_string()),
            }),
            Rule::target => {
                let name = pair.as_str();
                Ok(Expr::Variable(name[1..name.len() - 1].trim().to_string()))
            }
            Rule::call => Self::build_call(pair),
            Rule::expr => Self::build_expression(pair.into_inner()),
            rule => Err(ParseError::at(&pair, format!("unexpected {:?}", rule))),
        }
    }

    fn build_call(pair: Pair<'_, Rule>) -> ParseResult<Expr> {
        let position = pair.clone();
        let mut inner = pair.into_inner();
        let name = inner.next().map(|p| p.as_str()).unwrap_or_default();
        let function = Builtin::from_name(name)
            .ok_or_else(|| ParseError::at(&position, format!("unknown function \"{}\"", name)))?;

        let args = inner
            .map(|arg| Self::build_expression(arg.into_inner()))
            .collect::<ParseResult<Vec<_>>>()?;

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(ParseError::at(
                &position,
                format!(
                    "function \"{}\" expects {} argument(s), received {}",
                    function.name(),
                    expected,
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call(function, args))
    }
}
