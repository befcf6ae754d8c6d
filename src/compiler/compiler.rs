//! 触发条件编译器
//! 将规则的触发字符串编译为忽略大小写的正则，并按模式字符串缓存编译结果
//! 单条规则编译失败只影响该规则本身

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use regex::{Regex, RegexBuilder, Error as RegexError};
use tracing::{debug, warn};

use super::pattern::{CompileOutcome, CompileStats, CompiledTrigger};
use crate::error::{RstResult, RstogglerError};
use crate::rule::Rule;

/// 触发条件编译器（带缓存）
#[derive(Debug, Default)]
pub struct TriggerCompiler {
    cache: HashMap<String, Result<Arc<Regex>, RegexError>>,
}

impl TriggerCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 编译单个触发正则（忽略大小写）
    /// 失败结果同样缓存：首次以 warn 记录，之后降为 debug
    pub fn compile(&mut self, pattern: &str) -> RstResult<CompiledTrigger> {
        if let Some(cached) = self.cache.get(pattern) {
            return match cached {
                Ok(regex) => Ok(CompiledTrigger::new(Arc::clone(regex))),
                Err(e) => {
                    debug!("跳过无效正则（已缓存）：{}", pattern);
                    Err(RstogglerError::PatternCompile {
                        pattern: pattern.to_string(),
                        source: e.clone(),
                    })
                }
            };
        }

        let result = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Arc::new);

        let outcome = match &result {
            Ok(regex) => Ok(CompiledTrigger::new(Arc::clone(regex))),
            Err(e) => {
                warn!("正则编译失败，规则将被跳过：{}，错误：{}", pattern, e);
                Err(RstogglerError::PatternCompile {
                    pattern: pattern.to_string(),
                    source: e.clone(),
                })
            }
        };
        self.cache.insert(pattern.to_string(), result);
        outcome
    }

    /// 按规则判断编译结果
    pub fn outcome(&mut self, rule: &Rule) -> CompileOutcome {
        if rule.is_inert() {
            return CompileOutcome::Inert;
        }
        match self.compile(&rule.trigger) {
            Ok(trigger) => CompileOutcome::Ready(trigger),
            Err(RstogglerError::PatternCompile { source, .. }) => CompileOutcome::Invalid(source.to_string()),
            Err(e) => CompileOutcome::Invalid(e.to_string()),
        }
    }

    /// 预编译整个规则列表并输出统计
    pub fn compile_all(&mut self, rules: &[Rule]) -> (Vec<CompileOutcome>, CompileStats) {
        let start = Instant::now();
        let mut stats = CompileStats::default();

        let outcomes: Vec<CompileOutcome> = rules
            .iter()
            .map(|rule| {
                let outcome = self.outcome(rule);
                match &outcome {
                    CompileOutcome::Ready(_) => stats.ready += 1,
                    CompileOutcome::Inert => stats.inert += 1,
                    CompileOutcome::Invalid(_) => stats.invalid += 1,
                }
                outcome
            })
            .collect();

        debug!(
            "规则编译完成，耗时{:?}，可用{}条、空规则{}条、无效{}条",
            start.elapsed(),
            stats.ready,
            stats.inert,
            stats.invalid
        );

        (outcomes, stats)
    }

    /// 只保留仍被规则引用的缓存项
    pub fn retain_for(&mut self, rules: &[Rule]) {
        let live: HashSet<&str> = rules.iter().map(|r| r.trigger.as_str()).collect();
        self.cache.retain(|pattern, _| live.contains(pattern.as_str()));
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
