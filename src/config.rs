//! 全局配置管理,存储所有可配置项

use std::path::PathBuf;
use std::time::Duration;

/// 全局配置
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    // 防抖静默期：连续文本变更在此时间内只评估最后一次
    pub debounce_delay: Duration,
    // 内容容器不可用时的重试间隔
    pub observer_retry_interval: Duration,
    // 设置存储的键名前缀
    pub settings_key: String,
    // 默认配置档名称
    pub default_profile: String,
    // 规则库快照缓存路径
    pub store_cache_path: PathBuf,
    // 是否启用详细日志
    pub verbose: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(200),
            observer_retry_interval: Duration::from_millis(1000),
            settings_key: "auto_prompt_toggler".to_string(),
            default_profile: "Default".to_string(),
            store_cache_path: PathBuf::from("rstoggler_rules.mp"),
            verbose: false,
        }
    }
}

impl GlobalConfig {
    /// 配置档映射的存储键
    pub fn profiles_key(&self) -> String {
        format!("{}_profiles", self.settings_key)
    }

    /// 当前激活配置档的存储键
    pub fn active_profile_key(&self) -> String {
        format!("{}_active_profile", self.settings_key)
    }
}

/// 配置管理器（单例）
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GlobalConfig::default(),
        }
    }

    pub fn debounce_delay(mut self, delay: Duration) -> Self {
        self.config.debounce_delay = delay;
        self
    }

    pub fn observer_retry_interval(mut self, interval: Duration) -> Self {
        self.config.observer_retry_interval = interval;
        self
    }

    pub fn settings_key(mut self, key: impl Into<String>) -> Self {
        self.config.settings_key = key.into();
        self
    }

    pub fn default_profile(mut self, name: impl Into<String>) -> Self {
        self.config.default_profile = name.into();
        self
    }

    pub fn store_cache_path(mut self, path: PathBuf) -> Self {
        self.config.store_cache_path = path;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
