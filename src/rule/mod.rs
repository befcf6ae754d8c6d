//! 规则模块：负责规则数据模型、配置档存储、导入导出与缓存
pub mod model;
pub mod store;
pub mod settings;
pub mod transfer;
pub mod cache;

// 导出核心接口
pub use self::model::{Rule, RuleAction, RawRule, LegacyNoMatchAction};
pub use self::store::RuleStore;
pub use self::settings::{SettingsStore, MemorySettingsStore};
pub use self::transfer::{RuleTransfer, ProfileExport};
pub use self::cache::SettingsCacheManager;
