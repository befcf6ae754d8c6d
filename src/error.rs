//! 全局错误类型定义

use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

#[derive(Error, Debug)]
pub enum RstogglerError {
    // 规则相关错误
    #[error("正则编译失败：{pattern}：{source}")]
    PatternCompile {
        pattern: String,
        #[source]
        source: RegexError,
    },
    #[error("规则导入失败：{0}")]
    ImportError(String),
    #[error("规则索引越界：{index}（规则数：{len}）")]
    RuleIndexOutOfRange { index: usize, len: usize },

    // 配置档相关错误
    #[error("配置档已存在：{0}")]
    ProfileExists(String),
    #[error("配置档不存在：{0}")]
    ProfileNotFound(String),
    #[error("无效的配置档名称：{0:?}")]
    InvalidProfileName(String),
    #[error("无法删除最后一个配置档：{0}")]
    LastProfile(String),

    // 设置存储相关错误
    #[error("设置数据无效：{0}")]
    SettingsError(String),
    #[error("MessagePack序列化/反序列化失败：{0}")]
    MsgPackError(String),

    // 序列化/反序列化错误
    #[error("JSON解析失败：{0}")]
    Json(#[from] SerdeJsonError),

    // 基础错误
    #[error("IO操作失败：{0}")]
    Io(#[from] IoError),
}

// 全局Result类型
pub type RstResult<T> = Result<T, RstogglerError>;
