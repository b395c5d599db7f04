//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存层的接口，以及内置的内存缓存层和Redis缓存层。
//!
//! 缓存层对其他缓存层一无所知，层与层之间的顺序完全由编排器负责。

pub mod memory;
pub mod redis;

use crate::error::Result;
use crate::key::CacheKey;
use async_trait::async_trait;

pub use self::memory::MemoryTier;
pub use self::redis::RedisTier;

/// 缓存值约束
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// 回源计算函数，只会被调用一次
pub type Origin<'a, V> = Box<dyn FnOnce() -> Result<Option<V>> + 'a>;

/// 缓存层特征
///
/// 同时提供阻塞形式和异步形式的读写接口。实现必须支持来自多个并发操作的读写。
#[async_trait]
pub trait CacheTier<K, V>: Send + Sync
where
    K: CacheKey,
    V: CacheValue,
{
    /// 缓存层名称，用于日志和指标
    fn name(&self) -> &str;

    /// 获取缓存值（阻塞）
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// 写入缓存值（阻塞）
    fn put(&self, key: &K, value: &V) -> Result<()>;

    /// 获取缓存值，不存在时调用 `origin` 计算并在结果存在时写入
    ///
    /// 默认实现是先读后写，并不是原子的；能够原子执行的缓存层应当覆盖此方法。
    /// `origin` 返回缺失值或错误时不写入任何内容。
    fn compute_if_absent(&self, key: &K, origin: Origin<'_, V>) -> Result<Option<V>> {
        if let Some(value) = self.get(key)? {
            return Ok(Some(value));
        }
        let computed = origin()?;
        if let Some(value) = &computed {
            self.put(key, value)?;
        }
        Ok(computed)
    }

    /// 获取缓存值（异步）
    async fn get_async(&self, key: &K) -> Result<Option<V>>;

    /// 写入缓存值（异步）
    async fn put_async(&self, key: &K, value: &V) -> Result<()>;
}
