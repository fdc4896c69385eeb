//! Evaluate 表达式 AST
//!
//! @yutiansut @quantaxis

use std::collections::HashSet;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// 表达式节点
// ═══════════════════════════════════════════════════════════════════════════

/// 表达式
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 数值字面量 (`true`/`false` 解析为 1/0)
    Number(f64),
    /// 变量：目标名或其别名
    Variable(String),
    Unary(UnaryOperator, Box<Expr>),
    Binary(BinaryOperator, Box<Expr>, Box<Expr>),
    Call(Builtin, Vec<Expr>),
}

impl Expr {
    /// 表达式引用的变量 (首次出现顺序，大小写不敏感去重)
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        self.collect_variables(&mut seen, &mut names);
        names
    }

    fn collect_variables<'a>(&'a self, seen: &mut HashSet<String>, names: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if seen.insert(name.to_ascii_lowercase()) {
                    names.push(name);
                }
            }
            Expr::Unary(_, operand) => operand.collect_variables(seen, names),
            Expr::Binary(_, left, right) => {
                left.collect_variables(seen, names);
                right.collect_variables(seen, names);
            }
            Expr::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(seen, names);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Variable(name) => write!(f, "[{}]", name),
            Expr::Unary(op, operand) => write!(f, "{}({})", op.symbol(), operand),
            Expr::Binary(op, left, right) => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 运算符
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Pow => "^",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }

    /// 逻辑运算需要短路，由求值器单独处理
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 内置函数
// ═══════════════════════════════════════════════════════════════════════════

/// 内置函数，解析期即校验名称与参数个数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Ln,
    /// `log(x)` 为常用对数，`log(x, base)` 指定底数
    Log,
    Exp,
    Floor,
    Ceil,
    /// `round(x)` 或 `round(x, digits)`
    Round,
    Min,
    Max,
    Pow,
    Atan2,
    /// `if(condition, then, else)`，只求值被选中的分支
    If,
}

impl Builtin {
    pub const ALL: [Builtin; 16] = [
        Builtin::Abs,
        Builtin::Sqrt,
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Ln,
        Builtin::Log,
        Builtin::Exp,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Round,
        Builtin::Min,
        Builtin::Max,
        Builtin::Pow,
        Builtin::Atan2,
        Builtin::If,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Sqrt => "sqrt",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Ln => "ln",
            Builtin::Log => "log",
            Builtin::Exp => "exp",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Round => "round",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Pow => "pow",
            Builtin::Atan2 => "atan2",
            Builtin::If => "if",
        }
    }

    /// 大小写不敏感查找
    pub fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }

    /// 参数个数范围 (最少, 最多)
    pub fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Log | Builtin::Round => (1, 2),
            Builtin::Min | Builtin::Max => (1, usize::MAX),
            Builtin::Pow | Builtin::Atan2 => (2, 2),
            Builtin::If => (3, 3),
            _ => (1, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Builtin::from_name("SQRT"), Some(Builtin::Sqrt));
        assert_eq!(Builtin::from_name("Atan2"), Some(Builtin::Atan2));
        assert_eq!(Builtin::from_name("median"), None);
        assert_eq!(Builtin::If.arity(), (3, 3));
    }

    #[test]
    fn test_variables_distinct() {
        let expr = Expr::Binary(
            BinaryOperator::Add,
            Box::new(Expr::Variable("A".into())),
            Box::new(Expr::Call(
                Builtin::Max,
                vec![Expr::Variable("a".into()), Expr::Variable("B".into())],
            )),
        );
        assert_eq!(expr.variables(), vec!["A", "B"]);
        assert_eq!(expr.to_string(), "([A] + max([a], [B]))");
    }
}
