//! rstoggler - 按正则规则自动切换提示词开关的触发引擎

// 导出全局错误类型
pub use self::error::{RstogglerError, RstResult};

// 导出配置模块
pub use self::config::{GlobalConfig, ConfigManager, CustomConfigBuilder};

// 导出规则模块核心接口
pub use self::rule::{
    Rule, RuleAction, RawRule, RuleStore, RuleTransfer, ProfileExport,
    SettingsStore, MemorySettingsStore, SettingsCacheManager,
};

// 导出编译模块核心接口
pub use self::compiler::{CompiledTrigger, CompileOutcome, CompileStats, TriggerCompiler};

// 导出引擎模块核心接口
pub use self::engine::{
    FlagEntry, FlagRegistry, MemoryFlagRegistry, summarize_rule,
    FiredDelta, FiredState,
    Evaluation, FlagMutation, SkippedRule, TriggerEngine,
    SharedRuleStore, TogglerHandle, TogglerSession, spawn_toggler,
};

// 导出观察模块核心接口
pub use self::observer::{
    Author, ChangeObserver, ContentIdentity, ContentSource, ContentUnit,
    DebounceGate, MemoryContentSource, Revision,
};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod rule;
pub mod compiler;
pub mod engine;
pub mod observer;
pub mod utils;
