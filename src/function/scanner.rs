//! 参数记号扫描
//!
//! @yutiansut @quantaxis
//!
//! 将函数调用括号内的文本切分为参数记号，最后一个记号总是源序列表达式。
//! 默认按顶层逗号切分 (忽略圆括号/花括号/方括号/引号内的逗号)；
//! 需要子表达式语法的函数可替换为花括号扫描器。

use crate::{Result, SeriesError};

/// 参数个数约束 (不含源表达式)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterCounts {
    pub required: usize,
    pub optional: usize,
}

impl ParameterCounts {
    pub fn max(&self) -> usize {
        self.required + self.optional
    }

    /// 校验参数个数 (不含源表达式)
    pub fn check(&self, function: &str, supplied: usize) -> Result<()> {
        if supplied < self.required {
            return Err(SeriesError::FormatError(format!(
                "Expected at least {} parameter{} for \"{}\", received {}",
                self.required + 1,
                if self.required == 0 { "" } else { "s" },
                function,
                supplied + 1
            )));
        }
        if supplied > self.max() {
            return Err(SeriesError::FormatError(format!(
                "Expected at most {} parameters for \"{}\", received {}",
                self.max() + 1,
                function,
                supplied + 1
            )));
        }
        Ok(())
    }
}

/// 记号扫描器签名
pub type TokenScanner = fn(function: &str, text: &str, counts: ParameterCounts) -> Result<Vec<String>>;

/// 顶层逗号切分
pub fn split_arguments(text: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut stack: Vec<char> = Vec::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            _ if in_quotes => current.push(ch),
            '(' | '{' | '[' => {
                stack.push(ch);
                current.push(ch);
            }
            ')' | '}' | ']' => {
                let expected = match ch {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                if stack.pop() != Some(expected) {
                    return Err(SeriesError::FormatError(format!(
                        "Unbalanced '{}' in \"{}\"",
                        ch, text
                    )));
                }
                current.push(ch);
            }
            ',' if stack.is_empty() => {
                tokens.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err(SeriesError::FormatError(format!("Unterminated quote in \"{}\"", text)));
    }
    if let Some(open) = stack.pop() {
        return Err(SeriesError::FormatError(format!(
            "Unbalanced '{}' in \"{}\"",
            open, text
        )));
    }

    let last = current.trim();
    if !last.is_empty() || !tokens.is_empty() {
        tokens.push(last.to_string());
    }
    Ok(tokens)
}

/// 默认扫描器
pub fn scan_default(function: &str, text: &str, counts: ParameterCounts) -> Result<Vec<String>> {
    let tokens = split_arguments(text)?;
    if tokens.is_empty() || tokens.last().map_or(true, |t| t.is_empty()) {
        return Err(SeriesError::FormatError(format!(
            "Expected a source expression as the last parameter of \"{}\"",
            function
        )));
    }
    counts.check(function, tokens.len() - 1)?;
    Ok(tokens)
}

/// 花括号扫描器
///
/// 先定位首个 `{` 及其匹配的 `}`，括号前的文本按逗号切分为前置参数，
/// 括号后的剩余文本整体作为源表达式。
pub fn scan_braced_expression(
    function: &str,
    text: &str,
    counts: ParameterCounts,
) -> Result<Vec<String>> {
    let open = text.find('{').ok_or_else(|| {
        SeriesError::FormatError(format!(
            "Expected a braced expression parameter for \"{}\", e.g. {{A + B}}",
            function
        ))
    })?;

    let mut depth = 0usize;
    let mut close = None;
    for (offset, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + offset);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(|| {
        SeriesError::FormatError(format!(
            "Unbalanced braces in expression parameter of \"{}\"",
            function
        ))
    })?;

    let mut tokens: Vec<String> = Vec::new();
    let leading = text[..open].trim();
    if !leading.is_empty() {
        let leading = leading.strip_suffix(',').ok_or_else(|| {
            SeriesError::FormatError(format!(
                "Expected ',' before the braced expression of \"{}\"",
                function
            ))
        })?;
        tokens.extend(split_arguments(leading)?);
    }
    tokens.push(text[open..=close].to_string());

    let rest = text[close + 1..].trim();
    let source = rest.strip_prefix(',').map(str::trim).unwrap_or_default();
    if source.is_empty() {
        return Err(SeriesError::FormatError(format!(
            "Expected a source expression after the braced expression of \"{}\"",
            function
        )));
    }
    if source.contains('}') || source.contains('{') {
        return Err(SeriesError::FormatError(format!(
            "Unbalanced braces in \"{}\"",
            text
        )));
    }

    counts.check(function, tokens.len())?;
    tokens.push(source.to_string());
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_OPTIONAL: ParameterCounts = ParameterCounts { required: 1, optional: 1 };

    #[test]
    fn test_split_respects_nesting() {
        let tokens = split_arguments("1.5, Top(2, A;B), \"a,b\", [x,y]").unwrap();
        assert_eq!(tokens, vec!["1.5", "Top(2, A;B)", "\"a,b\"", "[x,y]"]);
        assert!(split_arguments("1, (A").is_err());
        assert!(split_arguments("1, A)").is_err());
        assert!(split_arguments("").unwrap().is_empty());
    }

    #[test]
    fn test_default_scanner_counts() {
        let tokens = scan_default("Add", "1.5, PPA:1;PPA:2", TWO_OPTIONAL).unwrap();
        assert_eq!(tokens, vec!["1.5", "PPA:1;PPA:2"]);

        let err = scan_default("Add", "PPA:1", TWO_OPTIONAL).unwrap_err();
        assert!(matches!(err, SeriesError::FormatError(_)));
        assert!(err.to_string().contains("Expected at least 2 parameters"));

        let err = scan_default("Add", "1, 2, 3, PPA:1", TWO_OPTIONAL).unwrap_err();
        assert!(err.to_string().contains("received 4"));
    }

    #[test]
    fn test_braced_scanner() {
        let counts = ParameterCounts { required: 2, optional: 0 };
        let tokens =
            scan_braced_expression("Evaluate", "0.0333, {max(A, B) + 1}, A; B", counts).unwrap();
        assert_eq!(tokens, vec!["0.0333", "{max(A, B) + 1}", "A; B"]);

        let nested = scan_braced_expression("Evaluate", "1, {A + {B}}, A", counts).unwrap();
        assert_eq!(nested[1], "{A + {B}}");
    }

    #[test]
    fn test_braced_scanner_errors() {
        let counts = ParameterCounts { required: 2, optional: 0 };
        assert!(matches!(
            scan_braced_expression("Evaluate", "0.1, {A + B, A", counts),
            Err(SeriesError::FormatError(_))
        ));
        assert!(matches!(
            scan_braced_expression("Evaluate", "0.1, {A + B}", counts),
            Err(SeriesError::FormatError(_))
        ));
        assert!(matches!(
            scan_braced_expression("Evaluate", "{A + B}, A", counts),
            Err(SeriesError::FormatError(_))
        ));
        assert!(matches!(
            scan_braced_expression("Evaluate", "0.1, A + B, A", counts),
            Err(SeriesError::FormatError(_))
        ));
    }
}
