//! 引擎模块：触发评估、已触发状态与开关注册表
pub mod registry;
pub mod fired;
pub mod engine;
pub mod session;

// 导出核心接口
pub use self::registry::{summarize_rule, FlagEntry, FlagRegistry, MemoryFlagRegistry};
pub use self::fired::{FiredDelta, FiredState};
pub use self::engine::{Evaluation, FlagMutation, SkippedRule, TriggerEngine};
pub use self::session::{spawn_toggler, SharedRuleStore, TogglerHandle, TogglerSession};
