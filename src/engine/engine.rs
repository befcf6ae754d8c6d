//! 触发引擎核心
//! 以同一份注册表快照评估全部规则，计算开关变更，再一次性写回并提交

use std::collections::HashMap;
use indexmap::IndexMap;
use tracing::{debug, info};

use super::fired::{FiredDelta, FiredState};
use super::registry::{FlagEntry, FlagRegistry};
use crate::compiler::TriggerCompiler;
use crate::rule::{Rule, RuleAction};
use crate::utils::{preview_compact, preview_ids};

/// 单个开关变更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagMutation {
    pub flag_id: String,
    pub enabled: bool,
    pub display_name: String,
}

/// 因正则无效被跳过的规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRule {
    pub index: usize,
    pub reason: String,
}

/// 单次评估结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub mutations: Vec<FlagMutation>,
    pub fired_delta: FiredDelta,
    pub skipped: Vec<SkippedRule>,
}

impl Evaluation {
    pub fn has_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// (开关ID, 目标状态) 列表
    pub fn pairs(&self) -> Vec<(&str, bool)> {
        self.mutations
            .iter()
            .map(|m| (m.flag_id.as_str(), m.enabled))
            .collect()
    }
}

/// 一批评估内的目标状态规划：同一开关以列表中最后一条规则为准
struct MutationPlan<'r> {
    registry: &'r dyn FlagRegistry,
    snapshot: HashMap<String, Option<FlagEntry>>,
    desired: IndexMap<String, bool>,
}

impl<'r> MutationPlan<'r> {
    fn new(registry: &'r dyn FlagRegistry) -> Self {
        Self {
            registry,
            snapshot: HashMap::new(),
            desired: IndexMap::new(),
        }
    }

    /// 批次开始时的开关状态（首次查询后缓存）
    fn current(&mut self, flag_id: &str) -> Option<&FlagEntry> {
        if !self.snapshot.contains_key(flag_id) {
            let entry = self.registry.lookup(flag_id);
            self.snapshot.insert(flag_id.to_string(), entry);
        }
        self.snapshot.get(flag_id).and_then(Option::as_ref)
    }

    fn plan(&mut self, action: RuleAction, targets: &[String]) {
        for flag_id in targets {
            let Some(entry) = self.current(flag_id) else {
                debug!("开关不存在，跳过：{}", flag_id);
                continue;
            };
            let want = action.desired(entry.enabled);
            // 后写入者排在最后
            self.desired.shift_remove(flag_id);
            self.desired.insert(flag_id.clone(), want);
        }
    }

    fn into_mutations(self) -> Vec<FlagMutation> {
        let snapshot = self.snapshot;
        self.desired
            .into_iter()
            .filter_map(|(flag_id, enabled)| {
                let entry = snapshot.get(&flag_id)?.as_ref()?;
                (entry.enabled != enabled).then(|| FlagMutation {
                    display_name: entry.display_name.clone(),
                    flag_id,
                    enabled,
                })
            })
            .collect()
    }
}

/// 触发引擎
#[derive(Debug, Default)]
pub struct TriggerEngine {
    compiler: TriggerCompiler,
}

impl TriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiler_mut(&mut self) -> &mut TriggerCompiler {
        &mut self.compiler
    }

    /// 评估规则列表（不修改任何状态）
    pub fn evaluate(
        &mut self,
        text: &str,
        rules: &[Rule],
        fired: &FiredState,
        registry: &dyn FlagRegistry,
    ) -> Evaluation {
        let mut plan = MutationPlan::new(registry);
        let mut fired_delta = FiredDelta::default();
        let mut skipped = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            if !rule.enabled || rule.is_inert() {
                continue;
            }

            let trigger = match self.compiler.compile(&rule.trigger) {
                Ok(trigger) => trigger,
                Err(e) => {
                    skipped.push(SkippedRule { index, reason: e.to_string() });
                    continue;
                }
            };

            if trigger.is_match(text) {
                // 同一条消息内已触发过，不再重复执行
                if fired.contains(index) {
                    continue;
                }
                debug!(
                    "规则#{} 匹配：{} ➜ {} ({})",
                    index,
                    trigger.pattern(),
                    preview_ids(&rule.prompt_ids),
                    rule.action
                );
                fired_delta.marked.push(index);
                plan.plan(rule.action, &rule.prompt_ids);
            } else if let Some(action) = rule.effective_no_match_action() {
                if fired.contains(index) {
                    fired_delta.cleared.push(index);
                }
                plan.plan(action, &rule.prompt_ids);
            }
        }

        let mutations = plan.into_mutations();
        debug!(
            "评估完成：文本「{}」，变更{}个开关，跳过{}条规则",
            preview_compact(text, 48),
            mutations.len(),
            skipped.len()
        );

        Evaluation {
            mutations,
            fired_delta,
            skipped,
        }
    }

    /// 写回评估结果：逐个设置开关，有变更时只提交一次
    pub fn apply(
        &self,
        evaluation: &Evaluation,
        fired: &mut FiredState,
        registry: &mut dyn FlagRegistry,
    ) {
        fired.apply(&evaluation.fired_delta);

        for mutation in &evaluation.mutations {
            registry.set_enabled(&mutation.flag_id, mutation.enabled);
            let status = if mutation.enabled { "开启" } else { "关闭" };
            let name = if mutation.display_name.is_empty() { &mutation.flag_id } else { &mutation.display_name };
            info!("{}提示词: {}", status, name);
        }

        if evaluation.has_mutations() {
            registry.commit();
        }
    }

    /// 评估并写回
    pub fn run(
        &mut self,
        text: &str,
        rules: &[Rule],
        fired: &mut FiredState,
        registry: &mut dyn FlagRegistry,
    ) -> Evaluation {
        let evaluation = self.evaluate(text, rules, fired, &*registry);
        self.apply(&evaluation, fired, registry);
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::MemoryFlagRegistry;

    fn registry(flags: &[(&str, bool)]) -> MemoryFlagRegistry {
        flags
            .iter()
            .fold(MemoryFlagRegistry::new(), |reg, (id, enabled)| reg.with_flag(id, id, *enabled))
    }

    #[test]
    fn test_hello_world_scenario() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", false)]);
        let rules = vec![Rule::new("wor", ["p1"], RuleAction::Enable)];

        let eval = engine.run("hello world", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("p1", true)]);
        assert!(fired.contains(0));
        assert_eq!(reg.is_enabled("p1"), Some(true));
        assert_eq!(reg.commit_count(), 1);
    }

    #[test]
    fn test_actions_drive_expected_states() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("on", false), ("off", true), ("flip", true)]);
        let rules = vec![
            Rule::new("go", ["on"], RuleAction::Enable),
            Rule::new("go", ["off"], RuleAction::Disable),
            Rule::new("go", ["flip"], RuleAction::Toggle),
        ];

        engine.run("let's GO", &rules, &mut fired, &mut reg);
        assert_eq!(reg.is_enabled("on"), Some(true));
        assert_eq!(reg.is_enabled("off"), Some(false));
        assert_eq!(reg.is_enabled("flip"), Some(false));
    }

    #[test]
    fn test_same_epoch_is_idempotent() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", true)]);
        let rules = vec![Rule::new("storm", ["p1"], RuleAction::Toggle)];

        let first = engine.run("a storm", &rules, &mut fired, &mut reg);
        assert_eq!(first.pairs(), vec![("p1", false)]);

        let second = engine.run("a storm is coming", &rules, &mut fired, &mut reg);
        assert!(second.mutations.is_empty());
        assert!(second.fired_delta.is_empty());
        assert_eq!(reg.is_enabled("p1"), Some(false));
        assert_eq!(reg.commit_count(), 1);
    }

    #[test]
    fn test_new_epoch_allows_refire() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", true)]);
        let rules = vec![Rule::new("storm", ["p1"], RuleAction::Toggle)];

        fired.enter_epoch(crate::observer::ContentIdentity(0));
        engine.run("storm", &rules, &mut fired, &mut reg);
        assert_eq!(reg.is_enabled("p1"), Some(false));

        assert!(fired.enter_epoch(crate::observer::ContentIdentity(1)));
        let eval = engine.run("storm", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("p1", true)]);
    }

    #[test]
    fn test_inverse_on_no_match_disables_and_clears_fired() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", true)]);
        let rules = vec![Rule::new("battle", ["p1"], RuleAction::Enable).with_inverse_on_no_match(true)];

        fired.mark(0);
        let eval = engine.run("peaceful village", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("p1", false)]);
        assert_eq!(eval.fired_delta.cleared, vec![0]);
        assert!(!fired.contains(0));

        // 清除后再次匹配可以重新触发
        let eval = engine.run("battle begins", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("p1", true)]);
    }

    #[test]
    fn test_no_match_without_policy_does_nothing() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", true)]);
        let rules = vec![Rule::new("battle", ["p1"], RuleAction::Disable)];

        let eval = engine.run("nothing here", &rules, &mut fired, &mut reg);
        assert_eq!(eval, Evaluation::default());
        assert_eq!(reg.commit_count(), 0);
    }

    #[test]
    fn test_invalid_pattern_is_isolated() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", false), ("p2", false)]);
        let rules = vec![
            Rule::new("(unclosed", ["p1"], RuleAction::Enable),
            Rule::new("fine", ["p2"], RuleAction::Enable),
        ];

        let eval = engine.run("all fine", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("p2", true)]);
        assert_eq!(eval.skipped.len(), 1);
        assert_eq!(eval.skipped[0].index, 0);
        assert_eq!(reg.is_enabled("p1"), Some(false));
    }

    #[test]
    fn test_multi_target_toggle_commits_once() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("a", true), ("b", false), ("c", true)]);
        let rules = vec![Rule::new("swap", ["a", "b", "c"], RuleAction::Toggle)];

        let eval = engine.run("SWAP now", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("a", false), ("b", true), ("c", false)]);
        assert_eq!(reg.commit_count(), 1);
    }

    #[test]
    fn test_missing_flag_skipped_for_that_target_only() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("present", false)]);
        let rules = vec![Rule::new("x", ["ghost", "present"], RuleAction::Enable)];

        let eval = engine.run("x", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("present", true)]);
        assert!(fired.contains(0));
    }

    #[test]
    fn test_last_rule_wins_for_shared_target() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", false)]);
        let rules = vec![
            Rule::new("night", ["p1"], RuleAction::Enable),
            Rule::new("night", ["p1"], RuleAction::Disable),
        ];

        let eval = engine.run("night falls", &rules, &mut fired, &mut reg);
        assert!(eval.mutations.is_empty());
        assert_eq!(reg.is_enabled("p1"), Some(false));
        assert_eq!(eval.fired_delta.marked, vec![0, 1]);

        // 两条规则都基于同一快照：toggle 之后的 enable 仍以快照为准
        let mut fired = FiredState::new();
        let rules = vec![
            Rule::new("day", ["p1"], RuleAction::Disable),
            Rule::new("day", ["p1"], RuleAction::Toggle),
        ];
        let eval = engine.run("day", &rules, &mut fired, &mut reg);
        assert_eq!(eval.pairs(), vec![("p1", true)]);
    }

    #[test]
    fn test_disabled_and_inert_rules_skipped() {
        let mut engine = TriggerEngine::new();
        let mut fired = FiredState::new();
        let mut reg = registry(&[("p1", false)]);
        let rules = vec![
            Rule::new("x", ["p1"], RuleAction::Enable).with_enabled(false),
            Rule::new("", ["p1"], RuleAction::Enable),
        ];

        let eval = engine.run("x", &rules, &mut fired, &mut reg);
        assert_eq!(eval, Evaluation::default());
        assert!(fired.is_empty());
    }
}
