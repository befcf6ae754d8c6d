//! 编译后模式模型
//! 触发正则编译后的结构

use std::sync::Arc;
use regex::Regex;

/// 编译后的触发条件
#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    regex: Arc<Regex>,
}

impl CompiledTrigger {
    pub(crate) fn new(regex: Arc<Regex>) -> Self {
        Self { regex }
    }

    /// 子串搜索语义（不锚定首尾）
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// 单条规则的编译结果
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// 编译成功
    Ready(CompiledTrigger),
    /// 规则为空触发或空目标，不参与评估
    Inert,
    /// 正则语法错误
    Invalid(String),
}

/// 编译统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub ready: usize,
    pub inert: usize,
    pub invalid: usize,
}
