//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分层缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 定义了缓存系统中可能发生的各种错误类型
#[derive(Error, Debug)]
pub enum CacheError {
    /// 缓存层操作失败
    #[error("Tier '{tier}' operation failed: {message}")]
    Tier { tier: String, message: String },

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 结果形态与配置不一致
    #[error("Operation '{operation}' is declared as {declared} but used as {actual}")]
    ShapeMismatch {
        operation: String,
        declared: String,
        actual: String,
    },

    /// 未找到操作或缓存层
    #[error("Not found: {0}")]
    NotFound(String),

    /// 无法表示缺失值的结果形态得到了缺失值
    #[error("Absent value cannot be represented by operation '{0}'")]
    AbsentValue(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML解析错误
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CacheError {
    /// 构造缓存层错误
    pub fn tier(tier: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CacheError::Tier {
            tier: tier.into(),
            message: message.to_string(),
        }
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
