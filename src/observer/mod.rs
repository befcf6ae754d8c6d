//! 观察模块：内容源抽象、变更观察与防抖调度
pub mod content;
pub mod debounce;
pub mod observer;

// 导出核心接口
pub use self::content::{
    Author, ContentIdentity, ContentSource, ContentUnit, MemoryContentSource, Revision,
};
pub use self::debounce::DebounceGate;
pub use self::observer::ChangeObserver;
