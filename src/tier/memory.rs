//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存的缓存层实现。

use super::{CacheTier, CacheValue, Origin};
use crate::error::Result;
use crate::key::CacheKey;
use async_trait::async_trait;
use moka::sync::Cache;
use std::time::Duration;
use tracing::{debug, instrument};

/// 内存缓存层实现
///
/// 基于内存的高速缓存实现，使用Moka作为底层缓存库。
/// `compute_if_absent` 借助 Moka 的 entry API 原子执行。
#[derive(Clone)]
pub struct MemoryTier<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    name: String,
    cache: Cache<K, V>,
}

impl<K, V> MemoryTier<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// 创建新的内存缓存层实例
    ///
    /// # 参数
    ///
    /// * `name` - 缓存层名称
    /// * `capacity` - 最大条目数
    /// * `ttl` - 条目存活时间，None表示不过期
    pub fn new(name: impl Into<String>, capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            name: name.into(),
            cache: builder.build(),
        }
    }

    /// 是否包含指定键
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    /// 删除缓存项
    pub fn invalidate(&self, key: &K) {
        self.cache.invalidate(key);
    }

    /// 清空缓存层
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl<K, V> CacheTier<K, V> for MemoryTier<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), level = "debug", fields(tier = %self.name))]
    fn get(&self, key: &K) -> Result<Option<V>> {
        let value = self.cache.get(key);
        debug!("memory get: key={:?}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(tier = %self.name))]
    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.cache.insert(key.clone(), value.clone());
        debug!("memory put: key={:?}", key);
        Ok(())
    }

    #[instrument(skip(self, origin), level = "debug", fields(tier = %self.name))]
    fn compute_if_absent(&self, key: &K, origin: Origin<'_, V>) -> Result<Option<V>> {
        let mut failure = None;
        let entry = self
            .cache
            .entry(key.clone())
            .or_optionally_insert_with(|| match origin() {
                Ok(value) => value,
                Err(e) => {
                    failure = Some(e);
                    None
                }
            });

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(entry.map(|entry| entry.into_value()))
    }

    async fn get_async(&self, key: &K) -> Result<Option<V>> {
        self.get(key)
    }

    async fn put_async(&self, key: &K, value: &V) -> Result<()> {
        self.put(key, value)
    }
}
