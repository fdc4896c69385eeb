//! 元数据表
//!
//! @yutiansut @quantaxis
//!
//! 每个目标一张 `MetadataMap`，在同一管道内按引用共享：
//! 前一阶段内核写入的注解（如计算后的坐标）对后续阶段可见。
//! 键名不区分大小写。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// 单个目标的注解表 (共享引用)
#[derive(Debug, Clone, Default)]
pub struct MetadataMap {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (normalize(k.as_ref()), v.into()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(&normalize(key)).cloned()
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.inner.write().insert(normalize(key), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.write().remove(&normalize(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(&normalize(key))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// 当前内容快照
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().clone()
    }

    /// 是否指向同一张表
    pub fn ptr_eq(&self, other: &MetadataMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 一次性闩锁
    ///
    /// 哨兵注解不存在时在同一把写锁内执行 `apply` 并写入哨兵，返回 true；
    /// 已存在则不做任何事，返回 false。
    pub fn latch<F>(&self, sentinel: &str, apply: F) -> bool
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let key = normalize(sentinel);
        if self.inner.read().contains_key(&key) {
            return false;
        }

        let mut guard = self.inner.write();
        if guard.contains_key(&key) {
            return false;
        }
        apply(&mut guard);
        guard.insert(key, "true".to_string());
        true
    }
}

/// 闩锁回调内部使用的键规范化
pub fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════════
// 目标 → 元数据表 集合
// ═══════════════════════════════════════════════════════════════════════════

/// 一次调用内的元数据集合
///
/// 集合结构在调用开始时确定，之后只读；表内容可变。
#[derive(Debug, Clone, Default)]
pub struct MetadataCollection {
    maps: Arc<HashMap<String, MetadataMap>>,
}

impl MetadataCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同一目标重复出现时保留首次提供的表
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Arc<str>, MetadataMap)>,
    {
        let mut maps = HashMap::new();
        for (target, map) in entries {
            maps.entry(normalize(&target)).or_insert(map);
        }
        Self {
            maps: Arc::new(maps),
        }
    }

    pub fn get(&self, target: &str) -> Option<MetadataMap> {
        self.maps.get(&normalize(target)).cloned()
    }

    /// 未登记的目标返回一张独立的空表
    pub fn get_or_empty(&self, target: &str) -> MetadataMap {
        self.get(target).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
