//! 规则库快照缓存
//! 仅处理规则库的本地序列化（MessagePack）和反序列化

use rmp_serde::{Serializer, from_slice};
use serde::Serialize;
use tracing::debug;

use super::store::RuleStore;
use crate::error::{RstResult, RstogglerError};
use crate::config::GlobalConfig;

/// 规则库快照缓存管理器
pub struct SettingsCacheManager;

impl SettingsCacheManager {
    /// 从本地缓存加载规则库
    pub async fn load_from_cache(config: &GlobalConfig) -> RstResult<RuleStore> {
        let cache_path = &config.store_cache_path;
        let cache_data = tokio::fs::read(cache_path).await?;

        // MessagePack反序列化
        let store: RuleStore = from_slice(&cache_data)
            .map_err(|e| RstogglerError::MsgPackError(format!("反序列化失败：{}", e)))?;
        let store = store.into_repaired(&config.default_profile);

        debug!(
            "缓存文件反序列化成功，配置档数：{}，激活档：{}",
            store.profile_names().count(),
            store.active_profile_name()
        );

        Ok(store)
    }

    /// 将规则库缓存到本地
    pub async fn save_to_cache(config: &GlobalConfig, store: &RuleStore) -> RstResult<()> {
        let cache_path = &config.store_cache_path;
        let mut cache_data = Vec::new();

        // MessagePack序列化（字段名模式，保持与规则JSON一致的字段名）
        store.serialize(&mut Serializer::new(&mut cache_data).with_struct_map())
            .map_err(|e| RstogglerError::MsgPackError(format!("序列化失败：{}", e)))?;

        debug!("规则库序列化成功，序列化后数据大小：{} 字节", cache_data.len());

        // 写入文件
        tokio::fs::write(cache_path, cache_data).await?;
        Ok(())
    }

    /// 清除本地缓存
    pub async fn clear_cache(config: &GlobalConfig) -> RstResult<()> {
        let cache_path = &config.store_cache_path;
        if tokio::fs::try_exists(cache_path).await? {
            tokio::fs::remove_file(cache_path).await?;
        }
        Ok(())
    }
}
