//! 工具结果缓存（单次编排运行内有效）
//!
//! 键为 `{toolName, args}` 的规范化 JSON（对象键递归排序），避免字段顺序不同导致的缓存未命中。
//! 每个键一把异步锁：并发的相同调用只会执行一次，后到者等待并读取结果。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

type Slot = Arc<tokio::sync::Mutex<Option<Value>>>;

/// 递归排序对象键
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let sorted: BTreeMap<&String, Value> =
                obj.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// 缓存键：规范化后的 `{"args": ..., "toolName": ...}`
pub fn cache_key(tool_name: &str, args: &Value) -> String {
    let mut key = Map::new();
    key.insert("args".to_string(), canonicalize(args));
    key.insert("toolName".to_string(), Value::String(tool_name.to_string()));
    Value::Object(key).to_string()
}

/// 工具结果缓存；克隆共享同一份数据
#[derive(Clone, Default)]
pub struct ToolCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取（或创建）某个键的槽位
    pub(crate) fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// 读取已缓存的结果（不等待正在执行的调用）
    pub fn get(&self, tool_name: &str, args: &Value) -> Option<Value> {
        let key = cache_key(tool_name, args);
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.get(&key).cloned()
        }?;
        let guard = slot.try_lock().ok()?;
        guard.clone()
    }

    /// 已缓存结果的条数（失败的调用不计入）
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .filter(|slot| slot.try_lock().map(|g| g.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
