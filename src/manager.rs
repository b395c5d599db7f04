//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责根据配置创建缓存层和缓存操作描述符，
//! 并提供按名称解析的入口（`#[cacheable]` 宏生成的代码调用这些入口）。

use crate::config::{Config, OperationConfig, TierConfig};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::metrics::GLOBAL_METRICS;
use crate::operation::CacheOperation;
use crate::orchestrator::SharedTier;
use crate::shape::CacheResult;
use crate::tier::{CacheValue, MemoryTier, RedisTier};
use dashmap::DashMap;
use lazy_static::lazy_static;
use serde::{de::DeserializeOwned, Serialize};
use std::any::{Any, TypeId};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

type Erased = Arc<dyn Any + Send + Sync>;

lazy_static! {
    /// 已配置的缓存层，TTL已经解析为有效值
    static ref TIER_CONFIGS: DashMap<String, TierConfig> = DashMap::new();
    /// 已配置的缓存操作
    static ref OPERATION_CONFIGS: DashMap<String, OperationConfig> = DashMap::new();
    /// 外部注册的缓存层实例，按 (名称, 键值类型) 索引
    static ref REGISTERED_TIERS: DashMap<(String, TypeId), Erased> = DashMap::new();
    /// 按 (名称, 键值结果类型) 缓存的操作描述符
    static ref OPERATIONS: DashMap<(String, TypeId), Erased> = DashMap::new();
}

/// 缓存管理器
///
/// 负责初始化和管理进程内的缓存层与缓存操作
pub struct CacheManager;

impl CacheManager {
    /// 初始化缓存管理器
    ///
    /// 验证配置后注册所有缓存层和缓存操作，之前的注册内容会被清除。
    /// 缓存层实例在首次取用某个操作时为该操作创建。
    ///
    /// # 参数
    ///
    /// * `config` - 缓存系统配置
    #[instrument(skip(config), level = "info", fields(tier_count = config.tiers.len(), operation_count = config.operations.len()))]
    pub fn init(config: Config) -> Result<()> {
        config.validate().map_err(CacheError::Config)?;

        Self::reset();
        GLOBAL_METRICS.set_enabled(config.global.enable_metrics);

        for (name, tier) in &config.tiers {
            let ttl = config.effective_ttl(tier);
            let resolved = match tier.clone() {
                TierConfig::Memory(mut memory) => {
                    memory.ttl = Some(ttl);
                    TierConfig::Memory(memory)
                }
                TierConfig::Redis(mut redis) => {
                    redis.ttl = Some(ttl);
                    TierConfig::Redis(redis)
                }
            };
            debug!("Registered tier {} ({}, ttl={}s)", name, resolved.kind(), ttl);
            TIER_CONFIGS.insert(name.clone(), resolved);
        }

        for (name, operation) in &config.operations {
            debug!(
                "Registered operation {} (tiers={:?}, key={:?}, shape={})",
                name, operation.tiers, operation.key, operation.shape
            );
            OPERATION_CONFIGS.insert(name.clone(), operation.clone());
        }

        info!(
            "CacheManager initialized with {} tiers and {} operations",
            config.tiers.len(),
            config.operations.len()
        );
        Ok(())
    }

    /// 从TOML文件初始化缓存管理器
    pub fn init_from_file(path: impl AsRef<Path>) -> Result<()> {
        Self::init(Config::from_file(path)?)
    }

    /// 注册一个外部提供的缓存层实例
    ///
    /// 该键值类型的所有操作共享此实例，取代按配置创建的实例。
    /// 应在使用该缓存层的操作首次被取用之前调用；名称必须出现在配置的缓存层中。
    pub fn register_tier<K, V>(name: &str, tier: SharedTier<K, V>) -> Result<()>
    where
        K: CacheKey,
        V: CacheValue,
    {
        if !TIER_CONFIGS.contains_key(name) {
            return Err(CacheError::NotFound(format!("tier {}", name)));
        }
        let erased: Erased = Arc::new(tier);
        REGISTERED_TIERS.insert((name.to_string(), TypeId::of::<(K, V)>()), erased);
        Ok(())
    }

    /// 已注册的操作名称，按字母顺序
    pub fn operation_names() -> Vec<String> {
        let mut names: Vec<String> = OPERATION_CONFIGS.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 重置缓存管理器
    ///
    /// 清除所有已注册的缓存层和操作。
    /// 注意：此方法主要用于测试目的。
    #[doc(hidden)]
    pub fn reset() {
        OPERATIONS.clear();
        REGISTERED_TIERS.clear();
        OPERATION_CONFIGS.clear();
        TIER_CONFIGS.clear();
    }
}

/// 为操作创建缓存层实例
///
/// 外部注册的实例优先；否则按配置创建，每个操作拥有独立的实例，
/// Redis缓存层的键前缀追加操作名称，使不同操作的条目互不覆盖。
fn tier_for<K, V>(tier_name: &str, operation: &str) -> Result<SharedTier<K, V>>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
{
    if let Some(registered) = REGISTERED_TIERS.get(&(tier_name.to_string(), TypeId::of::<(K, V)>())) {
        return registered
            .value()
            .downcast_ref::<SharedTier<K, V>>()
            .cloned()
            .ok_or_else(|| CacheError::NotFound(format!("tier {} for the requested types", tier_name)));
    }

    let config = TIER_CONFIGS
        .get(tier_name)
        .map(|e| e.value().clone())
        .ok_or_else(|| CacheError::NotFound(format!("tier {}", tier_name)))?;

    let tier: SharedTier<K, V> = match config {
        TierConfig::Memory(memory) => Arc::new(MemoryTier::new(
            tier_name,
            memory.max_capacity,
            memory.ttl.map(Duration::from_secs),
        )),
        TierConfig::Redis(mut redis) => {
            let prefix = redis.key_prefix.take().unwrap_or_else(|| tier_name.to_string());
            redis.key_prefix = Some(format!("{}:{}", prefix, operation));
            Arc::new(RedisTier::new(tier_name, &redis)?)
        }
    };
    Ok(tier)
}

/// 获取指定名称的缓存操作描述符
///
/// 首次取用时按配置创建描述符和缓存层并检查结果形态，之后返回同一个实例
pub fn operation<K, V, R>(name: &str) -> Result<Arc<CacheOperation<K, V, R>>>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
    R: CacheResult<V> + 'static,
{
    let id = (name.to_string(), TypeId::of::<(K, V, R)>());
    if let Some(existing) = OPERATIONS.get(&id) {
        return downcast_operation(name, existing.value().clone());
    }

    let config = OPERATION_CONFIGS
        .get(name)
        .map(|e| e.value().clone())
        .ok_or_else(|| CacheError::NotFound(format!("operation {}", name)))?;

    let mut builder = CacheOperation::<K, V>::builder(name)
        .key_params(config.key.iter().cloned())
        .shape(config.shape);
    for tier_name in &config.tiers {
        builder = builder.shared_tier(tier_for::<K, V>(tier_name, name)?);
    }
    let built: Erased = Arc::new(builder.build::<R>()?);

    let entry = OPERATIONS.entry(id).or_insert(built);
    downcast_operation(name, entry.value().clone())
}

fn downcast_operation<K, V, R>(name: &str, erased: Erased) -> Result<Arc<CacheOperation<K, V, R>>>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V> + 'static,
{
    erased
        .downcast::<CacheOperation<K, V, R>>()
        .map_err(|_| CacheError::NotFound(format!("operation {} for the requested types", name)))
}

fn check_params<K, V, R>(op: &CacheOperation<K, V, R>, params: &[&str]) -> Result<()>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V>,
{
    if op.key_params().iter().map(String::as_str).eq(params.iter().copied()) {
        return Ok(());
    }
    Err(CacheError::Config(format!(
        "Operation '{}' is configured with key {:?} but the call site passes {:?}",
        op.name(),
        op.key_params(),
        params
    )))
}

/// 按名称同步解析普通形态的操作
///
/// `params` 为调用点的键参数名，必须与配置中的 `key` 列表一致
pub fn resolve_named<K, V, E, F>(
    name: &str,
    params: &[&str],
    key: K,
    origin: F,
) -> std::result::Result<V, E>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> std::result::Result<V, E>,
{
    let op = operation::<K, V, V>(name)?;
    check_params(&*op, params)?;
    op.resolve(key, origin)
}

/// 按名称同步解析可选形态的操作
pub fn resolve_named_optional<K, V, E, F>(
    name: &str,
    params: &[&str],
    key: K,
    origin: F,
) -> std::result::Result<Option<V>, E>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> std::result::Result<Option<V>, E>,
{
    let op = operation::<K, V, Option<V>>(name)?;
    check_params(&*op, params)?;
    op.resolve(key, origin)
}

/// 按名称异步解析普通形态的操作
pub async fn resolve_named_async<K, V, E, F, Fut>(
    name: &str,
    params: &[&str],
    key: K,
    origin: F,
) -> std::result::Result<V, E>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<V, E>>,
{
    let op = operation::<K, V, V>(name)?;
    check_params(&*op, params)?;
    op.resolve_async(key, origin).await
}

/// 按名称异步解析可选形态的操作
pub async fn resolve_named_optional_async<K, V, E, F, Fut>(
    name: &str,
    params: &[&str],
    key: K,
    origin: F,
) -> std::result::Result<Option<V>, E>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Option<V>, E>>,
{
    let op = operation::<K, V, Option<V>>(name)?;
    check_params(&*op, params)?;
    op.resolve_async(key, origin).await
}
