//! 触发会话：把规则库、引擎、已触发集合与注册表绑定在一起
//! 以及观察器 → 防抖门 → 会话的运行时装配

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use super::engine::{Evaluation, TriggerEngine};
use super::fired::FiredState;
use super::registry::FlagRegistry;
use crate::config::GlobalConfig;
use crate::observer::{ChangeObserver, ContentSource, DebounceGate, Revision};
use crate::rule::RuleStore;

/// 调用方与评估任务共享的规则库
pub type SharedRuleStore = Arc<RwLock<RuleStore>>;

/// 触发会话
#[derive(Debug)]
pub struct TogglerSession<R> {
    store: SharedRuleStore,
    registry: R,
    engine: TriggerEngine,
    fired: FiredState,
}

impl<R: FlagRegistry> TogglerSession<R> {
    pub fn new(store: SharedRuleStore, registry: R) -> Self {
        Self {
            store,
            registry,
            engine: TriggerEngine::new(),
            fired: FiredState::new(),
        }
    }

    /// 处理一次文本修订
    /// 新消息或规则库变更时先清空已触发集合，再评估当前激活配置档
    pub fn handle_revision(&mut self, revision: Revision) -> Evaluation {
        if self.fired.enter_epoch(revision.identity) {
            debug!("进入新消息 {}，已触发规则已重置", revision.identity);
        }

        let (rules, store_revision) = {
            let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
            (store.active_rules().to_vec(), store.revision())
        };

        if self.fired.sync_store_revision(store_revision) {
            self.engine.compiler_mut().retain_for(&rules);
        }

        self.engine.run(&revision.text, &rules, &mut self.fired, &mut self.registry)
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn fired(&self) -> &FiredState {
        &self.fired
    }
}

/// 运行中的触发器句柄
#[derive(Debug)]
pub struct TogglerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TogglerHandle {
    /// 停止观察；尚未执行的修订会先完成评估
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }

    /// 等待内容源自行关闭
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// 启动触发器：观察内容源，防抖后在单一工作任务中顺序评估
pub fn spawn_toggler<S, R>(
    config: &GlobalConfig,
    source: Arc<S>,
    store: SharedRuleStore,
    registry: R,
) -> TogglerHandle
where
    S: ContentSource + ?Sized,
    R: FlagRegistry + Send + 'static,
{
    let mut session = TogglerSession::new(store, registry);
    let gate = DebounceGate::spawn(config.debounce_delay, move |revision: Revision| {
        session.handle_revision(revision);
    });

    let (stop_tx, stop_rx) = oneshot::channel();
    let retry_interval = config.observer_retry_interval;
    let task = tokio::spawn(async move {
        ChangeObserver::new()
            .run(source, gate, retry_interval, stop_rx)
            .await;
    });

    TogglerHandle {
        stop: Some(stop_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use crate::config::ConfigManager;
    use crate::engine::registry::MemoryFlagRegistry;
    use crate::observer::{ContentIdentity, ContentUnit, MemoryContentSource};
    use crate::rule::{Rule, RuleAction};

    fn shared_store(rules: Vec<Rule>) -> SharedRuleStore {
        Arc::new(RwLock::new(RuleStore::from_legacy("Default", rules)))
    }

    fn revision(identity: usize, text: &str) -> Revision {
        Revision {
            identity: ContentIdentity(identity),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_session_resets_on_new_epoch() {
        let store = shared_store(vec![Rule::new("storm", ["p1"], RuleAction::Toggle)]);
        let registry = MemoryFlagRegistry::new().with_flag("p1", "Weather", false);
        let mut session = TogglerSession::new(store, registry);

        session.handle_revision(revision(0, "storm"));
        session.handle_revision(revision(0, "storm rising"));
        assert_eq!(session.registry().is_enabled("p1"), Some(true));

        session.handle_revision(revision(1, "another storm"));
        assert_eq!(session.registry().is_enabled("p1"), Some(false));
        assert_eq!(session.registry().commit_count(), 2);
    }

    #[test]
    fn test_store_change_invalidates_fired_indices() {
        let store = shared_store(vec![Rule::new("storm", ["p1"], RuleAction::Toggle)]);
        let registry = MemoryFlagRegistry::new().with_flag("p1", "Weather", false);
        let mut session = TogglerSession::new(Arc::clone(&store), registry);

        session.handle_revision(revision(0, "storm"));
        assert!(session.fired().contains(0));

        // 规则被改写后，旧的已触发索引不再可信
        store.write().unwrap().update_rule(0, Rule::new("storm", ["p1"], RuleAction::Disable)).unwrap();
        let eval = session.handle_revision(revision(0, "storm"));
        assert_eq!(eval.pairs(), vec![("p1", false)]);
    }

    #[test]
    fn test_replaced_store_invalidates_fired_indices() {
        let store = shared_store(vec![Rule::new("storm", ["p1"], RuleAction::Enable)]);
        let registry = MemoryFlagRegistry::new()
            .with_flag("p1", "Weather", false)
            .with_flag("p2", "Sailing", false);
        let mut session = TogglerSession::new(Arc::clone(&store), registry);

        session.handle_revision(revision(0, "storm"));
        assert!(session.fired().contains(0));

        // 整体替换规则库（例如重新加载设置），同一消息内新规则仍应触发
        *store.write().unwrap() =
            RuleStore::from_legacy("Default", vec![Rule::new("storm", ["p2"], RuleAction::Enable)]);
        let eval = session.handle_revision(revision(0, "storm"));
        assert_eq!(eval.pairs(), vec![("p2", true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_returns_when_source_closes_before_ready() {
        let config = ConfigManager::get_default();
        let store = shared_store(vec![Rule::new("storm", ["p1"], RuleAction::Enable)]);
        let registry = MemoryFlagRegistry::new().with_flag("p1", "Weather", false);

        let source = Arc::new(MemoryContentSource::unavailable());
        let handle = spawn_toggler(&config, Arc::clone(&source), store, registry);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        source.close();
        source.set_ready();

        let joined = tokio::time::timeout(Duration::from_secs(60), handle.join()).await;
        assert!(joined.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_pipeline_end_to_end() {
        let config = ConfigManager::custom()
            .debounce_delay(Duration::from_millis(200))
            .observer_retry_interval(Duration::from_millis(1000))
            .build();
        let store = shared_store(vec![
            Rule::new("dragon", ["combat"], RuleAction::Enable).with_inverse_on_no_match(true),
            Rule::new("tavern", ["music"], RuleAction::Toggle),
        ]);
        let registry = Arc::new(Mutex::new(
            MemoryFlagRegistry::new()
                .with_flag("combat", "Combat Rules", false)
                .with_flag("music", "Ambient Music", false),
        ));

        // 容器稍后才就绪
        let source = Arc::new(MemoryContentSource::unavailable());
        let handle = spawn_toggler(&config, Arc::clone(&source), store, Arc::clone(&registry));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        source.set_ready();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        // 流式输出同一条消息，防抖后只评估一次
        source.push(ContentUnit::own("what happens?"));
        source.push(ContentUnit::external("A drag"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.append_to_last("on appears near the tavern");
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.append_to_last(" door.");
        tokio::time::sleep(Duration::from_millis(400)).await;

        {
            let reg = registry.lock().unwrap();
            assert_eq!(reg.is_enabled("combat"), Some(true));
            assert_eq!(reg.is_enabled("music"), Some(true));
            assert_eq!(reg.commit_count(), 1);
        }

        // 用户发言被忽略
        source.push(ContentUnit::own("run!"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(registry.lock().unwrap().commit_count(), 1);

        // 新消息：dragon 不再出现 → combat 关闭；tavern 在新消息中再次触发 → music 翻转
        source.push(ContentUnit::external("You flee back to the tavern."));
        tokio::time::sleep(Duration::from_millis(400)).await;
        {
            let reg = registry.lock().unwrap();
            assert_eq!(reg.is_enabled("combat"), Some(false));
            assert_eq!(reg.is_enabled("music"), Some(false));
            assert_eq!(reg.commit_count(), 2);
        }

        handle.shutdown().await;
    }
}
