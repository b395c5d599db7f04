//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分层缓存系统的配置结构和解析逻辑。

use crate::error::Result;
use crate::shape::ResultShape;
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 缓存层和操作名称允许的字符
const NAME_PATTERN: &str = r"^[A-Za-z0-9_\-]+$";

/// 名称最大长度
const MAX_NAME_LENGTH: usize = 64;

/// 最长TTL：30天
const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    /// 缓存层定义，按名称索引
    #[serde(default)]
    pub tiers: HashMap<String, TierConfig>,
    /// 缓存操作定义，按名称索引
    #[serde(default)]
    pub operations: HashMap<String, OperationConfig>,
}

/// 全局配置
///
/// 定义适用于所有缓存层的默认配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存过期时间（秒）
    pub default_ttl: u64,
    /// 是否启用指标收集
    pub enable_metrics: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            enable_metrics: true,
        }
    }
}

/// 缓存层配置
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TierConfig {
    /// 内存缓存层
    Memory(MemoryTierConfig),
    /// Redis缓存层
    Redis(RedisTierConfig),
}

impl TierConfig {
    /// 缓存层类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            TierConfig::Memory(_) => "memory",
            TierConfig::Redis(_) => "redis",
        }
    }

    /// 配置的TTL（秒）
    pub fn ttl(&self) -> Option<u64> {
        match self {
            TierConfig::Memory(c) => c.ttl,
            TierConfig::Redis(c) => c.ttl,
        }
    }
}

/// 内存缓存层配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MemoryTierConfig {
    /// 最大条目数
    pub max_capacity: u64,
    /// 过期时间（秒），None表示使用全局默认值
    pub ttl: Option<u64>,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10000,
            ttl: None,
        }
    }
}

/// Redis缓存层配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisTierConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 键前缀，None表示使用缓存层名称
    pub key_prefix: Option<String>,
    /// 过期时间（秒），None表示使用全局默认值
    pub ttl: Option<u64>,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for RedisTierConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            key_prefix: None,
            ttl: None,
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
        }
    }
}

/// 缓存操作配置
#[derive(Deserialize, Clone, Debug)]
pub struct OperationConfig {
    /// 使用的缓存层名称，按从近到远的顺序
    pub tiers: Vec<String>,
    /// 键参数名列表，按声明顺序
    pub key: Vec<String>,
    /// 结果形态
    #[serde(default)]
    pub shape: ResultShape,
}

impl Config {
    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 缓存层的有效TTL（秒），未单独配置时使用全局默认值
    pub fn effective_ttl(&self, tier: &TierConfig) -> u64 {
        tier.ttl().unwrap_or(self.global.default_ttl)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内。
    /// 无键参数的操作在这里被拒绝。
    pub fn validate(&self) -> std::result::Result<(), String> {
        // 验证配置版本
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        // 验证全局配置
        if self.global.default_ttl == 0 {
            return Err("Global default_ttl cannot be zero".to_string());
        }

        if self.global.default_ttl > MAX_TTL_SECS {
            return Err("Global default_ttl cannot exceed 30 days (2592000 seconds)".to_string());
        }

        let name_pattern = Regex::new(NAME_PATTERN).map_err(|e| e.to_string())?;
        let check_name = |what: &str, name: &str| -> std::result::Result<(), String> {
            if name.is_empty() {
                return Err(format!("{} name cannot be empty", what));
            }
            if name.len() > MAX_NAME_LENGTH {
                return Err(format!(
                    "{} name '{}' exceeds maximum length of {} characters",
                    what, name, MAX_NAME_LENGTH
                ));
            }
            if !name_pattern.is_match(name) {
                return Err(format!(
                    "{} name '{}' may only contain letters, digits, '-' and '_'",
                    what, name
                ));
            }
            Ok(())
        };

        // 验证缓存层配置
        for (name, tier) in &self.tiers {
            check_name("Tier", name)?;

            if let Some(ttl) = tier.ttl() {
                if ttl == 0 {
                    return Err(format!("Tier '{}' TTL cannot be zero", name));
                }
                if ttl > MAX_TTL_SECS {
                    return Err(format!("Tier '{}' TTL cannot exceed 30 days", name));
                }
            }

            match tier {
                TierConfig::Memory(memory) => {
                    if memory.max_capacity == 0 {
                        return Err(format!("Tier '{}' max_capacity cannot be zero", name));
                    }

                    if memory.max_capacity > 10_000_000 {
                        return Err(format!(
                            "Tier '{}' max_capacity cannot exceed 10,000,000",
                            name
                        ));
                    }
                }
                TierConfig::Redis(redis) => {
                    if let Some(prefix) = &redis.key_prefix {
                        if prefix.is_empty() {
                            return Err(format!("Tier '{}' key_prefix cannot be empty", name));
                        }
                    }

                    let timeout = redis.connection_timeout_ms;
                    if !(100..=30000).contains(&timeout) {
                        return Err(format!(
                            "Tier '{}' connection_timeout_ms must be between 100 and 30000 ms",
                            name
                        ));
                    }

                    let timeout = redis.command_timeout_ms;
                    if !(100..=60000).contains(&timeout) {
                        return Err(format!(
                            "Tier '{}' command_timeout_ms must be between 100 and 60000 ms",
                            name
                        ));
                    }
                }
            }
        }

        // 验证操作配置
        for (name, operation) in &self.operations {
            check_name("Operation", name)?;

            if operation.tiers.is_empty() {
                return Err(format!("Operation '{}' must use at least one tier", name));
            }

            let mut seen = HashSet::new();
            for tier in &operation.tiers {
                if !self.tiers.contains_key(tier) {
                    return Err(format!(
                        "Operation '{}' refers to unknown tier '{}'",
                        name, tier
                    ));
                }
                if !seen.insert(tier) {
                    return Err(format!(
                        "Operation '{}' uses tier '{}' more than once",
                        name, tier
                    ));
                }
            }

            crate::key::validate_params(name, &operation.key).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}
