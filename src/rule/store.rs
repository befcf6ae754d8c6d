//! 规则库：按配置档分组的有序规则列表
//! 负责规则与配置档的增删改查，保证"至少一个配置档、激活档必定存在"两条不变式

use std::sync::atomic::{AtomicU64, Ordering};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::model::Rule;
use super::settings::SettingsStore;
use crate::config::GlobalConfig;
use crate::error::{RstResult, RstogglerError};

// 进程内全局递增：任意两个规则库实例或两次变更都不会得到相同的修订号
static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// 规则库
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleStore {
    profiles: IndexMap<String, Vec<Rule>>,
    active_profile: String,
    // 用于判断已触发集合中的索引是否过期，整体替换规则库同样视为变更
    #[serde(skip, default = "next_revision")]
    revision: u64,
}

/// 只比较内容，不比较修订号
impl PartialEq for RuleStore {
    fn eq(&self, other: &Self) -> bool {
        self.profiles == other.profiles && self.active_profile == other.active_profile
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(&GlobalConfig::default().default_profile)
    }
}

impl RuleStore {
    /// 创建只含一个空配置档的规则库
    pub fn new(default_profile: &str) -> Self {
        let mut profiles = IndexMap::new();
        profiles.insert(default_profile.to_string(), Vec::new());
        Self {
            profiles,
            active_profile: default_profile.to_string(),
            revision: next_revision(),
        }
    }

    /// 由旧版无配置档的规则列表创建
    pub fn from_legacy(default_profile: &str, rules: Vec<Rule>) -> Self {
        let mut store = Self::new(default_profile);
        store.profiles.insert(default_profile.to_string(), rules);
        store
    }

    // ===== 读取 =====

    pub fn active_profile_name(&self) -> &str {
        &self.active_profile
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn active_rules(&self) -> &[Rule] {
        self.profiles
            .get(&self.active_profile)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn profile_rules(&self, name: &str) -> Option<&[Rule]> {
        self.profiles.get(name).map(Vec::as_slice)
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ===== 规则增删改（作用于当前激活配置档） =====

    pub fn add_rule(&mut self, rule: Rule) {
        self.active_rules_mut().push(rule);
        self.touch();
    }

    /// 追加多条规则，返回追加数量
    pub fn append_rules(&mut self, rules: Vec<Rule>) -> usize {
        let count = rules.len();
        self.active_rules_mut().extend(rules);
        self.touch();
        count
    }

    pub fn update_rule(&mut self, index: usize, rule: Rule) -> RstResult<()> {
        let slot = self.rule_mut(index)?;
        *slot = rule;
        self.touch();
        Ok(())
    }

    pub fn remove_rule(&mut self, index: usize) -> RstResult<Rule> {
        self.check_index(index)?;
        let removed = self.active_rules_mut().remove(index);
        self.touch();
        Ok(removed)
    }

    pub fn set_rule_enabled(&mut self, index: usize, enabled: bool) -> RstResult<()> {
        self.rule_mut(index)?.enabled = enabled;
        self.touch();
        Ok(())
    }

    /// 拖拽排序：把 from 处的规则移动到 to
    pub fn move_rule(&mut self, from: usize, to: usize) -> RstResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        let rules = self.active_rules_mut();
        let rule = rules.remove(from);
        rules.insert(to, rule);
        self.touch();
        Ok(())
    }

    pub fn clear_rules(&mut self) {
        self.active_rules_mut().clear();
        self.touch();
    }

    // ===== 配置档增删改 =====

    pub fn create_profile(&mut self, name: &str) -> RstResult<()> {
        let name = Self::validate_name(name)?;
        if self.profiles.contains_key(name) {
            return Err(RstogglerError::ProfileExists(name.to_string()));
        }
        self.profiles.insert(name.to_string(), Vec::new());
        self.touch();
        Ok(())
    }

    pub fn rename_profile(&mut self, old: &str, new: &str) -> RstResult<()> {
        let new = Self::validate_name(new)?;
        let Some(index) = self.profiles.get_index_of(old) else {
            return Err(RstogglerError::ProfileNotFound(old.to_string()));
        };
        if old == new {
            return Ok(());
        }
        if self.profiles.contains_key(new) {
            return Err(RstogglerError::ProfileExists(new.to_string()));
        }

        // 保持原有位置
        let rules = self.profiles.shift_remove(old).unwrap_or_default();
        self.profiles.shift_insert(index, new.to_string(), rules);
        if self.active_profile == old {
            self.active_profile = new.to_string();
        }
        self.touch();
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> RstResult<()> {
        if !self.profiles.contains_key(name) {
            return Err(RstogglerError::ProfileNotFound(name.to_string()));
        }
        if self.profiles.len() <= 1 {
            return Err(RstogglerError::LastProfile(name.to_string()));
        }

        self.profiles.shift_remove(name);
        if self.active_profile == name {
            if let Some(first) = self.profiles.keys().next() {
                self.active_profile = first.clone();
            }
        }
        self.touch();
        Ok(())
    }

    pub fn switch_profile(&mut self, name: &str) -> RstResult<()> {
        if !self.profiles.contains_key(name) {
            return Err(RstogglerError::ProfileNotFound(name.to_string()));
        }
        if self.active_profile != name {
            self.active_profile = name.to_string();
            self.touch();
        }
        Ok(())
    }

    /// 创建或整体覆盖一个配置档
    pub fn put_profile(&mut self, name: &str, rules: Vec<Rule>) -> RstResult<()> {
        let name = Self::validate_name(name)?;
        self.profiles.insert(name.to_string(), rules);
        self.touch();
        Ok(())
    }

    // ===== 持久化 =====

    /// 从设置存储加载：优先配置档数据，其次旧版规则列表，最后空的默认档
    /// 存储数据损坏时返回 SettingsError
    pub fn try_load_from(settings: &dyn SettingsStore, config: &GlobalConfig) -> RstResult<Self> {
        if let Some(value) = settings.get(&config.profiles_key()) {
            let profiles: IndexMap<String, Vec<Rule>> = serde_json::from_value(value)
                .map_err(|e| RstogglerError::SettingsError(format!("配置档数据损坏：{}", e)))?;
            let active = settings
                .get(&config.active_profile_key())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let store = Self::repaired(profiles, active, &config.default_profile);
            debug!("从设置加载配置档成功，配置档数：{}，激活档：{}", store.profiles.len(), store.active_profile);
            return Ok(store);
        }

        if let Some(value) = settings.get(&config.settings_key) {
            let rules: Vec<Rule> = serde_json::from_value(value)
                .map_err(|e| RstogglerError::SettingsError(format!("旧版规则数据损坏：{}", e)))?;
            debug!("从旧版规则列表迁移，规则数：{}", rules.len());
            return Ok(Self::from_legacy(&config.default_profile, rules));
        }

        Ok(Self::new(&config.default_profile))
    }

    /// 同 try_load_from，数据损坏时记录警告并回落到空的默认档
    pub fn load_from(settings: &dyn SettingsStore, config: &GlobalConfig) -> Self {
        Self::try_load_from(settings, config).unwrap_or_else(|e| {
            warn!("{}，使用空的默认配置档", e);
            Self::new(&config.default_profile)
        })
    }

    /// 写回设置存储并请求一次保存
    pub fn save_to(&self, settings: &mut dyn SettingsStore, config: &GlobalConfig) -> RstResult<()> {
        let profiles = serde_json::to_value(&self.profiles)?;
        settings.set(&config.profiles_key(), profiles);
        settings.set(&config.active_profile_key(), Value::String(self.active_profile.clone()));
        settings.request_save();
        Ok(())
    }

    /// 反序列化得到的数据可能违反不变式，在此修复
    pub(crate) fn repaired(
        mut profiles: IndexMap<String, Vec<Rule>>,
        active: String,
        default_profile: &str,
    ) -> Self {
        profiles.retain(|name, _| !name.trim().is_empty());
        if profiles.is_empty() {
            profiles.insert(default_profile.to_string(), Vec::new());
        }
        let active_profile = if profiles.contains_key(&active) {
            active
        } else {
            profiles.keys().next().cloned().unwrap_or_else(|| default_profile.to_string())
        };
        Self {
            profiles,
            active_profile,
            revision: next_revision(),
        }
    }

    pub(crate) fn into_repaired(self, default_profile: &str) -> Self {
        Self::repaired(self.profiles, self.active_profile, default_profile)
    }

    // ===== 内部工具 =====

    fn touch(&mut self) {
        self.revision = next_revision();
    }

    fn active_rules_mut(&mut self) -> &mut Vec<Rule> {
        self.profiles.entry(self.active_profile.clone()).or_default()
    }

    fn check_index(&self, index: usize) -> RstResult<()> {
        let len = self.active_rules().len();
        if index >= len {
            return Err(RstogglerError::RuleIndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn rule_mut(&mut self, index: usize) -> RstResult<&mut Rule> {
        self.check_index(index)?;
        let rules = self.active_rules_mut();
        Ok(&mut rules[index])
    }

    fn validate_name(name: &str) -> RstResult<&str> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(RstogglerError::InvalidProfileName(name.to_string()));
        }
        Ok(trimmed)
    }
}
