//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存操作描述符。
//!
//! 描述符在初始化时为每个调用点构建一次，之后只读，在该调用点的所有调用之间共享。
//! 所有配置错误（没有缓存层、没有键参数、结果形态不一致）都在构建时报告。

use crate::error::{CacheError, Result};
use crate::key::{self, CacheKey, KeyArgs, KeyBuilder};
use crate::metrics::GLOBAL_METRICS;
use crate::orchestrator::{self, SharedTier};
use crate::shape::{CacheResult, ResultShape};
use crate::tier::{CacheTier, CacheValue};
use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;

/// 缓存操作描述符
///
/// `K` 为缓存键类型，`V` 为缓存层中存储的值类型，`R` 为调用方看到的结果类型
/// （`V` 为普通形态，`Option<V>` 为可选形态）。
pub struct CacheOperation<K, V, R = V>
where
    K: CacheKey,
    V: CacheValue,
{
    name: String,
    tiers: Vec<SharedTier<K, V>>,
    key_params: Vec<String>,
    shape: ResultShape,
    backfill_runtime: Option<Handle>,
    _result: PhantomData<fn() -> R>,
}

impl<K, V, R> std::fmt::Debug for CacheOperation<K, V, R>
where
    K: CacheKey,
    V: CacheValue,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOperation")
            .field("name", &self.name)
            .field(
                "tiers",
                &self.tiers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("key_params", &self.key_params)
            .field("shape", &self.shape)
            .finish()
    }
}

impl<K, V> CacheOperation<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// 创建描述符构建器
    pub fn builder(name: impl Into<String>) -> OperationBuilder<K, V> {
        OperationBuilder::new(name)
    }
}

impl<K, V, R> CacheOperation<K, V, R>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V>,
{
    /// 操作名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明的结果形态
    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// 键参数名列表
    pub fn key_params(&self) -> &[String] {
        &self.key_params
    }

    /// 缓存层，按从近到远的顺序
    pub fn tiers(&self) -> &[SharedTier<K, V>] {
        &self.tiers
    }

    /// 缓存层名称，按从近到远的顺序
    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    /// 为该操作创建键构建器，参数个数必须与 `A` 一致
    pub fn key_builder<A: KeyArgs<Key = K>>(&self) -> Result<KeyBuilder<A>> {
        KeyBuilder::new(self.key_params.iter().cloned())
    }

    /// 同步解析
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `origin` - 回源函数，仅在所有缓存层都未命中时调用一次
    pub fn resolve<E, F>(&self, key: K, origin: F) -> std::result::Result<R, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        let start = Instant::now();
        let result = orchestrator::resolve_blocking(&self.name, &key, &self.tiers, origin);
        GLOBAL_METRICS.record_duration(&self.name, "sync", start.elapsed().as_secs_f64());
        result
    }

    /// 由参数构建缓存键并同步解析
    pub fn resolve_args<A, E, F>(&self, args: A, origin: F) -> std::result::Result<R, E>
    where
        A: KeyArgs<Key = K>,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        self.resolve(key::build_key(args), origin)
    }

    /// 异步解析
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `origin` - 返回 future 的回源函数，仅在所有缓存层都未命中时调用一次
    pub async fn resolve_async<E, F, Fut>(&self, key: K, origin: F) -> std::result::Result<R, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
    {
        let start = Instant::now();
        let result = orchestrator::resolve_async(
            &self.name,
            key,
            &self.tiers,
            self.backfill_runtime.as_ref(),
            origin,
        )
        .await;
        GLOBAL_METRICS.record_duration(&self.name, "async", start.elapsed().as_secs_f64());
        result
    }

    /// 由参数构建缓存键并异步解析
    pub async fn resolve_args_async<A, E, F, Fut>(
        &self,
        args: A,
        origin: F,
    ) -> std::result::Result<R, E>
    where
        A: KeyArgs<Key = K>,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
    {
        self.resolve_async(key::build_key(args), origin).await
    }
}

/// 缓存操作描述符构建器
pub struct OperationBuilder<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    name: String,
    tiers: Vec<SharedTier<K, V>>,
    key_params: Vec<String>,
    shape: Option<ResultShape>,
    backfill_runtime: Option<Handle>,
}

impl<K, V> OperationBuilder<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// 创建新的构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tiers: Vec::new(),
            key_params: Vec::new(),
            shape: None,
            backfill_runtime: None,
        }
    }

    /// 追加一个缓存层，先追加的缓存层更近
    pub fn tier<T: CacheTier<K, V> + 'static>(mut self, tier: T) -> Self {
        self.tiers.push(Arc::new(tier));
        self
    }

    /// 追加一个共享的缓存层
    pub fn shared_tier(mut self, tier: SharedTier<K, V>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// 设置键参数名列表，按声明顺序
    pub fn key_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_params = params.into_iter().map(Into::into).collect();
        self
    }

    /// 声明结果形态，未声明时取结果类型本身的形态
    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// 指定执行异步回填的运行时
    pub fn backfill_runtime(mut self, handle: Handle) -> Self {
        self.backfill_runtime = Some(handle);
        self
    }

    /// 构建描述符
    ///
    /// 没有缓存层、缓存层重名、键参数无效或结果形态与 `R` 不一致时返回错误
    pub fn build<R: CacheResult<V>>(self) -> Result<CacheOperation<K, V, R>> {
        if self.tiers.is_empty() {
            return Err(CacheError::Config(format!(
                "Operation '{}' has no cache tiers",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.name().to_string()) {
                return Err(CacheError::Config(format!(
                    "Operation '{}' uses tier '{}' more than once",
                    self.name,
                    tier.name()
                )));
            }
        }

        key::validate_params(&self.name, &self.key_params)?;

        let shape = self.shape.unwrap_or(R::SHAPE);
        if !shape.accepts(R::SHAPE) {
            return Err(CacheError::ShapeMismatch {
                operation: self.name,
                declared: shape.to_string(),
                actual: R::SHAPE.to_string(),
            });
        }

        Ok(CacheOperation {
            name: self.name,
            tiers: self.tiers,
            key_params: self.key_params,
            shape,
            backfill_runtime: self.backfill_runtime,
            _result: PhantomData,
        })
    }
}
