//! 分组运算
//!
//! @yutiansut @quantaxis
//!
//! - Standard: 每条输入序列独立执行一次内核
//! - Set: 全部输入序列拼接为一条后执行一次
//! - Slice: 按时间容差对齐的跨序列切片逐个执行

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::{Result, SeriesError};

/// 分组运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GroupOperation {
    /// 调用方未指定
    #[default]
    None,
    Standard,
    Set,
    Slice,
}

impl GroupOperation {
    /// 输出名/发布名前缀
    pub fn prefix(self) -> &'static str {
        match self {
            GroupOperation::Set => "Set",
            GroupOperation::Slice => "Slice",
            GroupOperation::None | GroupOperation::Standard => "",
        }
    }

    /// 从带前缀的函数名拆出 (分组运算, 基础名)
    pub fn split_prefixed_name(name: &str) -> Option<(GroupOperation, &str)> {
        for op in [GroupOperation::Slice, GroupOperation::Set] {
            let prefix = op.prefix();
            if name.len() > prefix.len()
                && name.is_char_boundary(prefix.len())
                && name[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                return Some((op, &name[prefix.len()..]));
            }
        }
        None
    }

    fn bit(self) -> u8 {
        match self {
            GroupOperation::None => 0b0001,
            GroupOperation::Standard => 0b0010,
            GroupOperation::Set => 0b0100,
            GroupOperation::Slice => 0b1000,
        }
    }
}

impl fmt::Display for GroupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupOperation::None => "None",
            GroupOperation::Standard => "Standard",
            GroupOperation::Set => "Set",
            GroupOperation::Slice => "Slice",
        };
        f.write_str(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 分组运算集合
// ═══════════════════════════════════════════════════════════════════════════

/// 分组运算集合
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupOperations(u8);

impl GroupOperations {
    pub const EMPTY: GroupOperations = GroupOperations(0);
    pub const STANDARD: GroupOperations = GroupOperations(0b0010);
    pub const SET: GroupOperations = GroupOperations(0b0100);
    pub const SLICE: GroupOperations = GroupOperations(0b1000);
    pub const ALL: GroupOperations = GroupOperations(0b1110);

    pub const fn union(self, other: GroupOperations) -> GroupOperations {
        GroupOperations(self.0 | other.0)
    }

    pub fn with(self, op: GroupOperation) -> GroupOperations {
        GroupOperations(self.0 | op.bit())
    }

    pub fn contains(self, op: GroupOperation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn is_subset(self, other: GroupOperations) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 按 Standard, Set, Slice 顺序迭代
    pub fn iter(self) -> impl Iterator<Item = GroupOperation> {
        [
            GroupOperation::None,
            GroupOperation::Standard,
            GroupOperation::Set,
            GroupOperation::Slice,
        ]
        .into_iter()
        .filter(move |op| self.contains(*op))
    }
}

impl FromIterator<GroupOperation> for GroupOperations {
    fn from_iter<I: IntoIterator<Item = GroupOperation>>(iter: I) -> Self {
        iter.into_iter()
            .fold(GroupOperations::EMPTY, |set, op| set.with(op))
    }
}

impl fmt::Debug for GroupOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for GroupOperations {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 覆盖策略与解析
// ═══════════════════════════════════════════════════════════════════════════

/// 分组运算覆盖策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupOperationPolicy {
    /// 校验请求属于 allowed 集合
    #[default]
    Validate,
    /// 无论请求如何都使用指定运算
    Force(GroupOperation),
    /// 忽略请求，始终 Standard
    IgnoreRequested,
}

impl GroupOperationPolicy {
    /// 解析本次调用实际使用的分组运算
    ///
    /// allowed 但未被内核原生 supported 的请求回落为 Standard。
    pub fn resolve(
        self,
        function: &str,
        requested: GroupOperation,
        allowed: GroupOperations,
        supported: GroupOperations,
    ) -> Result<GroupOperation> {
        let requested = match requested {
            GroupOperation::None => GroupOperation::Standard,
            other => other,
        };

        match self {
            GroupOperationPolicy::Force(op) => Ok(op),
            GroupOperationPolicy::IgnoreRequested => Ok(GroupOperation::Standard),
            GroupOperationPolicy::Validate => {
                if !allowed.contains(requested) {
                    return Err(SeriesError::UnsupportedOperation(format!(
                        "\"{}\" does not support the {} group operation; allowed operations are {:?}",
                        function, requested, allowed
                    )));
                }
                if supported.contains(requested) {
                    Ok(requested)
                } else {
                    log::debug!(
                        "{} group operation for \"{}\" is allowed but not supported natively, using Standard",
                        requested,
                        function
                    );
                    Ok(GroupOperation::Standard)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let set = GroupOperations::STANDARD.union(GroupOperations::SLICE);
        assert!(set.contains(GroupOperation::Standard));
        assert!(!set.contains(GroupOperation::Set));
        assert!(GroupOperations::STANDARD.is_subset(set));
        assert!(set.is_subset(GroupOperations::ALL));
        assert!(!GroupOperations::ALL.is_subset(set));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![GroupOperation::Standard, GroupOperation::Slice]
        );
        let collected: GroupOperations =
            [GroupOperation::Set, GroupOperation::Slice].into_iter().collect();
        assert_eq!(collected, GroupOperations::SET.union(GroupOperations::SLICE));
    }

    #[test]
    fn test_split_prefixed_name() {
        assert_eq!(
            GroupOperation::split_prefixed_name("SliceAdd"),
            Some((GroupOperation::Slice, "Add"))
        );
        assert_eq!(
            GroupOperation::split_prefixed_name("setaverage"),
            Some((GroupOperation::Set, "average"))
        );
        assert_eq!(GroupOperation::split_prefixed_name("Set"), None);
        assert_eq!(GroupOperation::split_prefixed_name("Sum"), None);
    }

    #[test]
    fn test_validate_policy() {
        let policy = GroupOperationPolicy::Validate;
        let op = policy
            .resolve("Add", GroupOperation::None, GroupOperations::ALL, GroupOperations::ALL)
            .unwrap();
        assert_eq!(op, GroupOperation::Standard);

        let err = policy
            .resolve(
                "Distinct",
                GroupOperation::Slice,
                GroupOperations::STANDARD.union(GroupOperations::SET),
                GroupOperations::STANDARD.union(GroupOperations::SET),
            )
            .unwrap_err();
        assert!(matches!(err, SeriesError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_allowed_but_unsupported_falls_back() {
        let op = GroupOperationPolicy::Validate
            .resolve(
                "Label",
                GroupOperation::Set,
                GroupOperations::ALL,
                GroupOperations::STANDARD,
            )
            .unwrap();
        assert_eq!(op, GroupOperation::Standard);
    }

    #[test]
    fn test_force_policy_overrides_request() {
        let policy = GroupOperationPolicy::Force(GroupOperation::Slice);
        for requested in [GroupOperation::None, GroupOperation::Standard, GroupOperation::Set] {
            let op = policy
                .resolve("Evaluate", requested, GroupOperations::SLICE, GroupOperations::SLICE)
                .unwrap();
            assert_eq!(op, GroupOperation::Slice);
        }
        let op = GroupOperationPolicy::IgnoreRequested
            .resolve("Label", GroupOperation::Slice, GroupOperations::ALL, GroupOperations::ALL)
            .unwrap();
        assert_eq!(op, GroupOperation::Standard);
    }
}
