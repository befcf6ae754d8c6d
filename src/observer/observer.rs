//! 变更观察器
//! 监听内容源，识别"新消息"边界，并把最新文本经防抖门转交给会话

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::content::{Author, ContentIdentity, ContentSource, ContentUnit, Revision};
use super::debounce::DebounceGate;
use crate::utils::preview_compact;

/// 变更观察器
#[derive(Debug, Default)]
pub struct ChangeObserver {
    last_identity: Option<ContentIdentity>,
}

impl ChangeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次观察到的外部消息标识
    pub fn last_identity(&self) -> Option<ContentIdentity> {
        self.last_identity
    }

    /// 处理一次内容变更：只响应最后一条且由外部产生的内容
    pub fn observe(&mut self, units: &[ContentUnit]) -> Option<Revision> {
        let last = units.last()?;
        if last.author == Author::SelfAuthored {
            return None;
        }

        let identity = ContentIdentity(units.len() - 1);
        if self.last_identity != Some(identity) {
            debug!("检测到新消息：{}", identity);
            self.last_identity = Some(identity);
        }

        Some(Revision {
            identity,
            text: last.text.clone(),
        })
    }

    /// 观察循环：容器未就绪时按固定间隔重试，内容源关闭（包括就绪前关闭）或收到停止信号时退出
    /// 退出前关闭防抖门，尚未执行的修订会立即评估
    pub async fn run<S>(
        mut self,
        source: Arc<S>,
        gate: DebounceGate<Revision>,
        retry_interval: Duration,
        mut stop: oneshot::Receiver<()>,
    ) where
        S: ContentSource + ?Sized,
    {
        let mut rx = loop {
            if source.is_closed() {
                debug!("内容源在就绪前已关闭，观察器退出");
                gate.shutdown().await;
                return;
            }
            if let Some(rx) = source.subscribe() {
                break rx;
            }
            debug!("内容容器未就绪，{:?} 后重试", retry_interval);
            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = &mut stop => {
                    gate.shutdown().await;
                    return;
                }
            }
        };
        info!("内容观察器已初始化");

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!("内容源已关闭，观察器退出");
                        break;
                    }
                    let units = source.units();
                    if let Some(revision) = self.observe(&units) {
                        debug!("调度评估：{} {}", revision.identity, preview_compact(&revision.text, 48));
                        gate.schedule(revision);
                    }
                }
                _ = &mut stop => {
                    debug!("收到停止信号，观察器退出");
                    break;
                }
            }
        }

        gate.shutdown().await;
    }
}
