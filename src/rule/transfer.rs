//! 规则导入导出
//! 规则列表序列化为 JSON 数组；配置档导出为 {name, rules}
//! 导入失败时整体拒绝，不修改任何现有状态

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::model::Rule;
use super::store::RuleStore;
use crate::error::{RstResult, RstogglerError};

/// 配置档导出格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileExport {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// 规则导入导出工具
pub struct RuleTransfer;

impl RuleTransfer {
    /// 导出规则列表（格式化JSON）
    pub fn export_rules(rules: &[Rule]) -> RstResult<String> {
        Ok(serde_json::to_string_pretty(rules)?)
    }

    /// 导出单条规则（包装为单元素数组，便于直接再导入）
    pub fn export_rule(rule: &Rule) -> RstResult<String> {
        Self::export_rules(std::slice::from_ref(rule))
    }

    /// 解析规则列表，任何一条不合法都拒绝整个载荷
    pub fn parse_rules(json: &str) -> RstResult<Vec<Rule>> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RstogglerError::ImportError(format!("无效的规则文件：{}", e)))?;

        let Value::Array(items) = value else {
            return Err(RstogglerError::ImportError("无效的规则文件：顶层必须是数组".to_string()));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<Rule>(item)
                    .map_err(|e| RstogglerError::ImportError(format!("第 {} 条规则无效：{}", index + 1, e)))
            })
            .collect()
    }

    /// 导入规则并追加到当前激活配置档，返回新增数量
    pub fn import_rules(store: &mut RuleStore, json: &str) -> RstResult<usize> {
        let rules = Self::parse_rules(json)?;
        let count = store.append_rules(rules);
        info!("导入成功，新增 {} 条规则到配置档 {}", count, store.active_profile_name());
        Ok(count)
    }

    /// 导出指定配置档
    pub fn export_profile(store: &RuleStore, name: &str) -> RstResult<String> {
        let rules = store
            .profile_rules(name)
            .ok_or_else(|| RstogglerError::ProfileNotFound(name.to_string()))?;
        let export = ProfileExport {
            name: name.to_string(),
            rules: rules.to_vec(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// 导入配置档：同名则整体覆盖，否则新建，返回配置档名称
    pub fn import_profile(store: &mut RuleStore, json: &str) -> RstResult<String> {
        let export: ProfileExport = serde_json::from_str(json)
            .map_err(|e| RstogglerError::ImportError(format!("无效的配置档文件：{}", e)))?;

        let existed = store.has_profile(export.name.trim());
        store.put_profile(&export.name, export.rules)?;
        let name = export.name.trim().to_string();
        debug!("配置档导入完成：{}（{}）", name, if existed { "覆盖" } else { "新建" });
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::RuleAction;

    #[test]
    fn test_import_appends_to_active_profile() {
        let mut store = RuleStore::default();
        store.add_rule(Rule::new("existing", ["p0"], RuleAction::Disable));

        let count = RuleTransfer::import_rules(
            &mut store,
            r#"[{"trigger":"foo","promptId":"p1","action":"enable"},
                {"trigger":"bar","promptIds":["p2","p3"],"action":"toggle","inverseOnNoMatch":true,"enabled":false}]"#,
        )
        .unwrap();

        assert_eq!(count, 2);
        let rules = store.active_rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1].prompt_ids, vec!["p1".to_string()]);
        assert!(rules[1].enabled);
        assert_eq!(rules[2].prompt_ids, vec!["p2".to_string(), "p3".to_string()]);
        assert!(!rules[2].enabled);
    }

    #[test]
    fn test_malformed_import_rejected_without_changes() {
        let mut store = RuleStore::default();
        store.add_rule(Rule::new("existing", ["p0"], RuleAction::Enable));
        let before = store.clone();

        let not_array = RuleTransfer::import_rules(&mut store, r#"{"trigger":"foo"}"#);
        assert!(matches!(not_array, Err(RstogglerError::ImportError(_))));

        // 第二条缺少目标字段，整批拒绝
        let missing = RuleTransfer::import_rules(
            &mut store,
            r#"[{"trigger":"ok","promptId":"p1"},{"trigger":"bad"}]"#,
        );
        assert!(matches!(missing, Err(RstogglerError::ImportError(_))));

        let garbage = RuleTransfer::import_rules(&mut store, "not json");
        assert!(matches!(garbage, Err(RstogglerError::ImportError(_))));

        assert_eq!(store, before);
    }

    #[test]
    fn test_export_then_import_single_rule() {
        let rule = Rule::new("wor", ["p1"], RuleAction::Enable).with_inverse_on_no_match(true);
        let json = RuleTransfer::export_rule(&rule).unwrap();
        let parsed = RuleTransfer::parse_rules(&json).unwrap();
        assert_eq!(parsed, vec![rule]);
    }

    #[test]
    fn test_profile_import_creates_or_overwrites() {
        let mut store = RuleStore::default();
        store.add_rule(Rule::new("a", ["p1"], RuleAction::Enable));

        let json = r#"{"name":"Default","rules":[{"trigger":"b","promptId":"p2"}]}"#;
        let name = RuleTransfer::import_profile(&mut store, json).unwrap();
        assert_eq!(name, "Default");
        assert_eq!(store.active_rules().len(), 1);
        assert_eq!(store.active_rules()[0].trigger, "b");

        let json = r#"{"name":"Extra","rules":[]}"#;
        RuleTransfer::import_profile(&mut store, json).unwrap();
        assert!(store.has_profile("Extra"));
        assert_eq!(store.active_profile_name(), "Default");

        let exported = RuleTransfer::export_profile(&store, "Default").unwrap();
        let reparsed: ProfileExport = serde_json::from_str(&exported).unwrap();
        assert_eq!(reparsed.rules, store.active_rules().to_vec());

        assert!(matches!(
            RuleTransfer::export_profile(&store, "Missing"),
            Err(RstogglerError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_profile_import_rejected_without_changes() {
        let mut store = RuleStore::default();
        store.add_rule(Rule::new("existing", ["p0"], RuleAction::Enable));
        store.create_profile("Combat").unwrap();
        let before = store.clone();

        let not_object = RuleTransfer::import_profile(&mut store, r#"[{"trigger":"x","promptId":"p1"}]"#);
        assert!(matches!(not_object, Err(RstogglerError::ImportError(_))));

        let missing_rules = RuleTransfer::import_profile(&mut store, r#"{"name":"Combat"}"#);
        assert!(matches!(missing_rules, Err(RstogglerError::ImportError(_))));

        // 配置档中任一规则无效，整个配置档拒绝
        let bad_rule = RuleTransfer::import_profile(
            &mut store,
            r#"{"name":"Combat","rules":[{"trigger":"ok","promptId":"p1"},{"promptId":"p2"}]}"#,
        );
        assert!(matches!(bad_rule, Err(RstogglerError::ImportError(_))));

        let blank_name = RuleTransfer::import_profile(&mut store, r#"{"name":"   ","rules":[]}"#);
        assert!(matches!(blank_name, Err(RstogglerError::InvalidProfileName(_))));

        assert_eq!(store, before);
        assert_eq!(store.revision(), before.revision());
    }
}
