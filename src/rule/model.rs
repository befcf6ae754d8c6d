//! 规则数据模型定义
//! 仅存储规则数据，无任何业务逻辑，支持序列化/反序列化
//! 所有旧版字段（promptId / noMatchAction / closeOnNoMatch）只在反序列化时归一化一次

use std::fmt;
use serde::{Deserialize, Serialize};

/// 规则动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Enable,
    Disable,
    Toggle,
}

impl RuleAction {
    /// 逻辑反动作：enable↔disable，toggle 仍为 toggle
    pub fn inverse(self) -> Self {
        match self {
            RuleAction::Enable => RuleAction::Disable,
            RuleAction::Disable => RuleAction::Enable,
            RuleAction::Toggle => RuleAction::Toggle,
        }
    }

    /// 根据当前状态计算目标状态
    pub fn desired(self, current: bool) -> bool {
        match self {
            RuleAction::Enable => true,
            RuleAction::Disable => false,
            RuleAction::Toggle => !current,
        }
    }

    /// 界面展示用的动作名称
    pub fn label(&self) -> &'static str {
        match self {
            RuleAction::Enable => "开启",
            RuleAction::Disable => "关闭",
            RuleAction::Toggle => "切换",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Enable => "enable",
            RuleAction::Disable => "disable",
            RuleAction::Toggle => "toggle",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规范化后的规则（引擎只处理这一种形态）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", rename_all = "camelCase")]
pub struct Rule {
    /// 触发正则（忽略大小写）
    pub trigger: String,
    /// 目标提示词ID（有序、去重）
    pub prompt_ids: Vec<String>,
    pub action: RuleAction,
    /// 未匹配时执行 action 的反动作
    pub inverse_on_no_match: bool,
    /// 旧版数据遗留的未匹配动作，仅在 inverse_on_no_match 为 false 时生效
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_match_action: Option<RuleAction>,
    /// 规则是否参与评估
    pub enabled: bool,
}

impl Rule {
    /// 创建启用状态的规则
    pub fn new<I, S>(trigger: impl Into<String>, prompt_ids: I, action: RuleAction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trigger: trigger.into(),
            prompt_ids: dedup_ids(prompt_ids.into_iter().map(Into::into)),
            action,
            inverse_on_no_match: false,
            no_match_action: None,
            enabled: true,
        }
    }

    pub fn with_inverse_on_no_match(mut self, inverse: bool) -> Self {
        self.inverse_on_no_match = inverse;
        if inverse {
            self.no_match_action = None;
        }
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 空触发条件或空目标的规则不会产生任何效果
    pub fn is_inert(&self) -> bool {
        self.trigger.is_empty() || self.prompt_ids.is_empty()
    }

    /// 未匹配时实际生效的动作
    pub fn effective_no_match_action(&self) -> Option<RuleAction> {
        if self.inverse_on_no_match {
            Some(self.action.inverse())
        } else {
            self.no_match_action
        }
    }
}

// ======== 为 Rule 实现 Display trait（用于 CLI / 日志输出） ========
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trigger = if self.trigger.is_empty() { "(无触发条件)" } else { &self.trigger };
        write!(f, "{} ➜ {} ({})", trigger, self.prompt_ids.join(", "), self.action)
    }
}

/// 旧版未匹配动作取值，额外允许 none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyNoMatchAction {
    Enable,
    Disable,
    Toggle,
    None,
}

/// 原始规则（兼容所有历史字段），只用于反序列化
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub prompt_ids: Option<Vec<String>>,
    // 兼容：单目标旧版字段
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub action: Option<RuleAction>,
    #[serde(default)]
    pub inverse_on_no_match: Option<bool>,
    // 兼容：旧版未匹配动作
    #[serde(default)]
    pub no_match_action: Option<LegacyNoMatchAction>,
    // 兼容：更早的"未匹配时关闭"开关
    #[serde(default)]
    pub close_on_no_match: Option<bool>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl RawRule {
    /// 归一化为规范规则
    /// 未匹配策略优先级：inverseOnNoMatch > noMatchAction > closeOnNoMatch
    pub fn normalize(self) -> Result<Rule, String> {
        let trigger = self.trigger.ok_or_else(|| "缺少 trigger 字段".to_string())?;

        let prompt_ids = match (self.prompt_ids, self.prompt_id) {
            (Some(ids), legacy) if ids.is_empty() => legacy.into_iter().collect(),
            (Some(ids), _) => ids,
            (None, Some(id)) => vec![id],
            (None, None) => return Err("缺少 promptIds / promptId 字段".to_string()),
        };

        let action = self.action.unwrap_or_default();
        let inverse_on_no_match = self.inverse_on_no_match.unwrap_or(false);

        let no_match_action = if inverse_on_no_match {
            None
        } else {
            match self.no_match_action {
                Some(LegacyNoMatchAction::Enable) => Some(RuleAction::Enable),
                Some(LegacyNoMatchAction::Disable) => Some(RuleAction::Disable),
                Some(LegacyNoMatchAction::Toggle) => Some(RuleAction::Toggle),
                Some(LegacyNoMatchAction::None) => None,
                None if self.close_on_no_match == Some(true) => Some(RuleAction::Disable),
                None => None,
            }
        };

        Ok(Rule {
            trigger,
            prompt_ids: dedup_ids(prompt_ids.into_iter()),
            action,
            inverse_on_no_match,
            no_match_action,
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

impl TryFrom<RawRule> for Rule {
    type Error = String;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        raw.normalize()
    }
}

/// 去除空ID与重复ID，保留首次出现的顺序
fn dedup_ids(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for id in ids {
        if !id.is_empty() && !result.contains(&id) {
            result.push(id);
        }
    }
    result
}
