//! 防抖门
//! 合并快速连续的修订：新的调度会取消尚未执行的调度，静默期结束后只评估最后一次
//! 所有处理在同一个工作任务中顺序执行，上一次处理完成前不会开始下一次

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// 防抖门
#[derive(Debug)]
pub struct DebounceGate<T> {
    tx: mpsc::UnboundedSender<T>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> DebounceGate<T> {
    /// 启动工作任务，静默期满后以最新条目调用 handler
    pub fn spawn<F>(delay: Duration, mut handler: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();

        let worker = tokio::spawn(async move {
            while let Some(mut pending) = rx.recv().await {
                loop {
                    tokio::select! {
                        next = rx.recv() => match next {
                            Some(item) => {
                                // 被新修订取代，重新计时
                                pending = item;
                            }
                            None => {
                                // 门已关闭：立即执行最后一条
                                handler(pending);
                                return;
                            }
                        },
                        _ = tokio::time::sleep(delay) => {
                            handler(pending);
                            break;
                        }
                    }
                }
            }
            debug!("防抖门已关闭");
        });

        Self { tx, worker }
    }

    /// 调度一次评估；门已关闭时返回 false
    pub fn schedule(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }

    /// 关闭防抖门：未执行的条目立即执行，随后等待工作任务退出
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
