//! 已触发规则集合
//! 记录当前消息内已经执行过匹配动作的规则索引，进入新消息时清空，不持久化

use std::collections::BTreeSet;

use crate::observer::ContentIdentity;

/// 单次评估对已触发集合的变更
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiredDelta {
    /// 本次新标记为已触发的规则索引
    pub marked: Vec<usize>,
    /// 因执行未匹配动作而清除标记的规则索引
    pub cleared: Vec<usize>,
}

impl FiredDelta {
    pub fn is_empty(&self) -> bool {
        self.marked.is_empty() && self.cleared.is_empty()
    }
}

/// 已触发规则集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiredState {
    fired: BTreeSet<usize>,
    epoch: Option<ContentIdentity>,
    store_revision: Option<u64>,
}

impl FiredState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.fired.contains(&index)
    }

    pub fn mark(&mut self, index: usize) {
        self.fired.insert(index);
    }

    pub fn clear_rule(&mut self, index: usize) {
        self.fired.remove(&index);
    }

    pub fn reset(&mut self) {
        self.fired.clear();
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fired.iter().copied()
    }

    /// 进入某条消息；与上一条不同则清空集合，返回是否为新消息
    pub fn enter_epoch(&mut self, identity: ContentIdentity) -> bool {
        if self.epoch == Some(identity) {
            return false;
        }
        self.epoch = Some(identity);
        self.reset();
        true
    }

    /// 规则库变更后索引可能错位，清空集合；返回是否发生了清空
    pub fn sync_store_revision(&mut self, revision: u64) -> bool {
        if self.store_revision == Some(revision) {
            return false;
        }
        self.store_revision = Some(revision);
        self.reset();
        true
    }

    pub fn apply(&mut self, delta: &FiredDelta) {
        for index in &delta.cleared {
            self.clear_rule(*index);
        }
        for index in &delta.marked {
            self.mark(*index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_epoch_resets_only_on_change() {
        let mut state = FiredState::new();
        assert!(state.enter_epoch(ContentIdentity(0)));
        state.mark(1);
        assert!(!state.enter_epoch(ContentIdentity(0)));
        assert!(state.contains(1));
        assert!(state.enter_epoch(ContentIdentity(1)));
        assert!(state.is_empty());
    }

    #[test]
    fn test_apply_delta() {
        let mut state = FiredState::new();
        state.mark(0);
        state.apply(&FiredDelta { marked: vec![2, 3], cleared: vec![0] });
        assert_eq!(state.iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_store_revision_change_resets() {
        let mut state = FiredState::new();
        assert!(state.sync_store_revision(0));
        state.mark(4);
        assert!(!state.sync_store_revision(0));
        assert_eq!(state.len(), 1);
        assert!(state.sync_store_revision(1));
        assert!(state.is_empty());
    }
}
