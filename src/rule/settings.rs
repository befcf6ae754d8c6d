//! 设置存储接口
//! 宿主提供的持久化键值存储，保存动作由外部防抖机制完成

use std::collections::HashMap;
use serde_json::Value;

/// 持久化设置存储
pub trait SettingsStore {
    /// 读取键值
    fn get(&self, key: &str) -> Option<Value>;
    /// 写入键值
    fn set(&mut self, key: &str, value: Value);
    /// 请求一次（防抖的）保存
    fn request_save(&mut self);
}

/// 内存设置存储
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    values: HashMap<String, Value>,
    save_requests: usize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累计的保存请求次数
    pub fn save_requests(&self) -> usize {
        self.save_requests
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn request_save(&mut self) {
        self.save_requests += 1;
    }
}
