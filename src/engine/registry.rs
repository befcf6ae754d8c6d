//! 开关注册表接口
//! 宿主提供的具名布尔开关（提示词启用状态），引擎只读写 enabled

use std::sync::{Arc, Mutex, PoisonError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::rule::Rule;

/// 开关条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagEntry {
    pub enabled: bool,
    #[serde(default, alias = "name")]
    pub display_name: String,
}

impl FlagEntry {
    pub fn new(display_name: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            display_name: display_name.into(),
        }
    }
}

/// 开关注册表
pub trait FlagRegistry {
    /// 查询开关，不存在时返回 None
    fn lookup(&self, flag_id: &str) -> Option<FlagEntry>;
    /// 设置开关状态
    fn set_enabled(&mut self, flag_id: &str, enabled: bool);
    /// 持久化并触发重新渲染，每批评估最多调用一次
    fn commit(&mut self);
}

/// 共享注册表：评估在工作任务中进行，调用方仍可读取状态
impl<R: FlagRegistry> FlagRegistry for Arc<Mutex<R>> {
    fn lookup(&self, flag_id: &str) -> Option<FlagEntry> {
        self.lock().unwrap_or_else(PoisonError::into_inner).lookup(flag_id)
    }

    fn set_enabled(&mut self, flag_id: &str, enabled: bool) {
        self.lock().unwrap_or_else(PoisonError::into_inner).set_enabled(flag_id, enabled)
    }

    fn commit(&mut self) {
        self.lock().unwrap_or_else(PoisonError::into_inner).commit()
    }
}

/// 规则摘要，目标以显示名称展示：`trigger ➜ 名称1, 名称2 (开启)`
pub fn summarize_rule(rule: &Rule, registry: &dyn FlagRegistry) -> String {
    let targets: Vec<String> = rule
        .prompt_ids
        .iter()
        .map(|id| match registry.lookup(id) {
            Some(entry) if !entry.display_name.is_empty() => entry.display_name,
            Some(_) => id.clone(),
            None => format!("{}（不存在）", id),
        })
        .collect();
    let trigger = if rule.trigger.is_empty() { "(无触发条件)" } else { &rule.trigger };
    format!("{} ➜ {} ({})", trigger, targets.join(", "), rule.action.label())
}

/// 内存开关注册表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryFlagRegistry {
    entries: IndexMap<String, FlagEntry>,
    #[serde(skip)]
    commits: usize,
}

impl MemoryFlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加开关
    pub fn with_flag(mut self, flag_id: &str, display_name: &str, enabled: bool) -> Self {
        self.insert(flag_id, FlagEntry::new(display_name, enabled));
        self
    }

    pub fn insert(&mut self, flag_id: &str, entry: FlagEntry) {
        self.entries.insert(flag_id.to_string(), entry);
    }

    pub fn is_enabled(&self, flag_id: &str) -> Option<bool> {
        self.entries.get(flag_id).map(|e| e.enabled)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FlagEntry)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    /// 已提交次数
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl FlagRegistry for MemoryFlagRegistry {
    fn lookup(&self, flag_id: &str) -> Option<FlagEntry> {
        self.entries.get(flag_id).cloned()
    }

    fn set_enabled(&mut self, flag_id: &str, enabled: bool) {
        if let Some(entry) = self.entries.get_mut(flag_id) {
            entry.enabled = enabled;
        }
    }

    fn commit(&mut self) {
        self.commits += 1;
    }
}
