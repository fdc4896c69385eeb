//! 标签模板解析
//!
//! @yutiansut @quantaxis
//!
//! 模板中的 `{Field}` 占位符按目标元数据不区分大小写替换，
//! `{Table.Field}` 形式忽略表名前缀；无法解析的占位符原样保留。

use std::collections::{HashMap, HashSet};

use crate::model::metadata::MetadataMap;

/// 替换模板占位符，返回 (标签, 是否有占位符被替换)
pub fn substitute(template: &str, metadata: &MetadataMap) -> (String, bool) {
    let mut label = String::with_capacity(template.len());
    let mut replaced = false;
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        label.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            label.push_str(&rest[open..]);
            return (label, replaced);
        };

        let placeholder = &after[..close];
        let field = placeholder.rsplit('.').next().unwrap_or(placeholder).trim();
        match metadata.get(field) {
            Some(value) if !field.is_empty() => {
                label.push_str(&value);
                replaced = true;
            }
            _ => {
                label.push('{');
                label.push_str(placeholder);
                label.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    label.push_str(rest);
    (label, replaced)
}

/// 为多条输出序列生成标签
///
/// 重复 (不区分大小写) 的标签按输出顺序追加从 1 开始的 ` N` 后缀。
pub fn resolve_labels(template: &str, metadata: &[MetadataMap]) -> Vec<String> {
    let mut labels: Vec<String> = metadata
        .iter()
        .map(|map| substitute(template, map).0)
        .collect();

    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for label in &labels {
        *occurrences.entry(label.to_lowercase()).or_default() += 1;
    }

    for (index, label) in labels.iter_mut().enumerate() {
        if occurrences[&label.to_lowercase()] > 1 {
            label.push_str(&format!(" {}", index + 1));
        }
    }

    // 后缀后仍可能与其他标签冲突，追加不换行空格直至唯一
    let mut seen = HashSet::new();
    for label in labels.iter_mut() {
        while seen.contains(&label.to_lowercase()) {
            label.push('\u{00A0}');
        }
        seen.insert(label.to_lowercase());
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(tag: &str, signal: &str) -> MetadataMap {
        MetadataMap::from_pairs([("PointTag", tag), ("SignalType", signal)])
    }

    #[test]
    fn test_substitute_case_insensitive_with_table_prefix() {
        let map = point("SHELBY:FREQ", "FREQ");
        let (label, replaced) = substitute("{ActiveMeasurements.pointtag} [{SIGNALTYPE}]", &map);
        assert_eq!(label, "SHELBY:FREQ [FREQ]");
        assert!(replaced);
    }

    #[test]
    fn test_unresolved_placeholder_stays_literal() {
        let (label, replaced) = substitute("{Missing} {PointTag", &point("A", "B"));
        assert_eq!(label, "{Missing} {PointTag");
        assert!(!replaced);
    }

    #[test]
    fn test_duplicate_labels_suffixed() {
        let maps = vec![
            point("A", "FREQ"),
            point("B", "VPHM"),
            point("C", "FREQ"),
        ];
        let labels = resolve_labels("{SignalType}", &maps);
        assert_eq!(labels, vec!["FREQ 1", "VPHM", "FREQ 3"]);

        let labels = resolve_labels("Fixed", &maps[..2]);
        assert_eq!(labels, vec!["Fixed 1", "Fixed 2"]);
    }

    #[test]
    fn test_suffix_collision_made_unique() {
        let maps = vec![
            MetadataMap::from_pairs([("Name", "X")]),
            MetadataMap::from_pairs([("Name", "X 1")]),
        ];
        let labels = resolve_labels("{Name}", &maps);
        assert_eq!(labels[0], "X");
        assert_eq!(labels[1], "X 1");

        let maps = vec![
            MetadataMap::from_pairs([("Name", "X")]),
            MetadataMap::from_pairs([("Name", "X")]),
            MetadataMap::from_pairs([("Name", "X 1")]),
        ];
        let labels = resolve_labels("{Name}", &maps);
        assert_eq!(labels[0], "X 1");
        assert_eq!(labels[1], "X 2");
        assert_eq!(labels[2], "X 1\u{00A0}");
    }
}
