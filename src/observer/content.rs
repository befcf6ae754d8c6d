//! 内容源抽象
//! 内核只依赖"有序内容单元 + 作者标记 + 文本"，不依赖任何界面结构

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// 内容作者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    /// 本地用户自己发出的内容
    SelfAuthored,
    /// 外部产生的内容（例如模型回复）
    External,
}

/// 内容单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    pub author: Author,
    pub text: String,
}

impl ContentUnit {
    pub fn external(text: impl Into<String>) -> Self {
        Self { author: Author::External, text: text.into() }
    }

    pub fn own(text: impl Into<String>) -> Self {
        Self { author: Author::SelfAuthored, text: text.into() }
    }
}

/// 内容单元标识：按序号定位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentIdentity(pub usize);

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// 送入防抖门的一次文本修订
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub identity: ContentIdentity,
    pub text: String,
}

/// 可订阅的内容源
pub trait ContentSource: Send + Sync + 'static {
    /// 订阅变更通知；容器尚不可用时返回 None
    fn subscribe(&self) -> Option<watch::Receiver<u64>>;
    /// 读取当前全部内容单元
    fn units(&self) -> Vec<ContentUnit>;
    /// 内容源已永久关闭，不会再就绪
    fn is_closed(&self) -> bool;
}

/// 内存内容源（测试与命令行使用）
#[derive(Debug, Clone)]
pub struct MemoryContentSource {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    units: Mutex<Vec<ContentUnit>>,
    ready: AtomicBool,
    notifier: Mutex<Option<watch::Sender<u64>>>,
}

impl Default for MemoryContentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContentSource {
    /// 立即可用的内容源
    pub fn new() -> Self {
        let source = Self::unavailable();
        source.set_ready();
        source
    }

    /// 容器尚未就绪的内容源
    pub fn unavailable() -> Self {
        let (tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(MemoryInner {
                units: Mutex::new(Vec::new()),
                ready: AtomicBool::new(false),
                notifier: Mutex::new(Some(tx)),
            }),
        }
    }

    pub fn set_ready(&self) {
        self.inner.ready.store(true, Ordering::SeqCst);
    }

    /// 追加一条内容
    pub fn push(&self, unit: ContentUnit) {
        self.lock_units().push(unit);
        self.notify();
    }

    /// 向最后一条内容追加文本（模拟流式输出）
    pub fn append_to_last(&self, chunk: &str) {
        {
            let mut units = self.lock_units();
            match units.last_mut() {
                Some(last) => last.text.push_str(chunk),
                None => units.push(ContentUnit::external(chunk)),
            }
        }
        self.notify();
    }

    /// 关闭内容源，观察器随之退出
    pub fn close(&self) {
        self.inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn lock_units(&self) -> std::sync::MutexGuard<'_, Vec<ContentUnit>> {
        self.inner.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        if let Some(tx) = self.inner.notifier.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            tx.send_modify(|version| *version = version.wrapping_add(1));
        }
    }
}

impl ContentSource for MemoryContentSource {
    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        if !self.inner.ready.load(Ordering::SeqCst) {
            return None;
        }
        self.inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(watch::Sender::subscribe)
    }

    fn units(&self) -> Vec<ContentUnit> {
        self.lock_units().clone()
    }

    fn is_closed(&self) -> bool {
        self.inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
