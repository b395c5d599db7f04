//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了分层缓存的读取、回填、回源和写入流程。
//!
//! 缓存层按从近到远的顺序依次检查，第一个命中的缓存层结束检查。
//! 在第 `i` 层命中时，值只回填到 `0..i` 层；所有缓存层都未命中时，
//! 回源函数恰好调用一次，存在的结果写入所有缓存层，缺失的结果不写入任何缓存层。
//!
//! 同步模式下回填在返回前依次完成；异步模式下回填在独立任务中并发执行，
//! 调用方不等待回填完成，而回源结果的写入会等待全部完成后才返回。

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::metrics::{Event, GLOBAL_METRICS};
use crate::shape::CacheResult;
use crate::tier::{CacheTier, CacheValue};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// 共享的缓存层句柄
pub type SharedTier<K, V> = Arc<dyn CacheTier<K, V>>;

fn no_tiers<E: From<CacheError>>(operation: &str) -> E {
    CacheError::Config(format!("Operation '{}' has no cache tiers", operation)).into()
}

fn absent<V, R, E>(operation: &str) -> Result<R, E>
where
    R: CacheResult<V>,
    E: From<CacheError>,
{
    R::absent().ok_or_else(|| CacheError::AbsentValue(operation.to_string()).into())
}

/// 同步解析
///
/// 只有一个缓存层时使用该层的 `compute_if_absent` 一步完成；
/// 多个缓存层时依次读取、回填，全部未命中时回源并写入所有缓存层。
/// 缓存层的任何错误都会作为整个调用的错误返回。
#[instrument(skip_all, level = "debug", fields(operation = %operation, key = ?key))]
pub fn resolve_blocking<K, V, R, E, F>(
    operation: &str,
    key: &K,
    tiers: &[SharedTier<K, V>],
    origin: F,
) -> Result<R, E>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V>,
    E: From<CacheError>,
    F: FnOnce() -> Result<R, E>,
{
    match tiers {
        [] => Err(no_tiers(operation)),
        [tier] => resolve_single(operation, key, tier.as_ref(), origin),
        _ => resolve_multi(operation, key, tiers, origin),
    }
}

fn resolve_single<K, V, R, E, F>(
    operation: &str,
    key: &K,
    tier: &dyn CacheTier<K, V>,
    origin: F,
) -> Result<R, E>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V>,
    E: From<CacheError>,
    F: FnOnce() -> Result<R, E>,
{
    let mut failure: Option<E> = None;
    let mut computed = false;

    let value = tier.compute_if_absent(
        key,
        Box::new(|| -> crate::error::Result<Option<V>> {
            computed = true;
            GLOBAL_METRICS.record_origin(operation);
            match origin() {
                Ok(result) => Ok(result.into_present()),
                Err(e) => {
                    failure = Some(e);
                    Ok(None)
                }
            }
        }),
    )?;

    if let Some(e) = failure {
        return Err(e);
    }

    match value {
        Some(value) => {
            let event = if computed { Event::Store } else { Event::Hit };
            GLOBAL_METRICS.record(operation, tier.name(), event);
            debug!(tier = tier.name(), computed, "single tier resolved");
            Ok(R::from_present(value))
        }
        None => {
            GLOBAL_METRICS.record(operation, tier.name(), Event::Miss);
            debug!(tier = tier.name(), "single tier resolved to absent");
            absent::<V, R, E>(operation)
        }
    }
}

fn resolve_multi<K, V, R, E, F>(
    operation: &str,
    key: &K,
    tiers: &[SharedTier<K, V>],
    origin: F,
) -> Result<R, E>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V>,
    E: From<CacheError>,
    F: FnOnce() -> Result<R, E>,
{
    for (index, tier) in tiers.iter().enumerate() {
        match tier.get(key)? {
            Some(value) => {
                GLOBAL_METRICS.record(operation, tier.name(), Event::Hit);
                for nearer in &tiers[..index] {
                    nearer.put(key, &value)?;
                    GLOBAL_METRICS.record(operation, nearer.name(), Event::Backfill);
                }
                debug!(tier = tier.name(), index, "hit, backfilled {} nearer tiers", index);
                return Ok(R::from_present(value));
            }
            None => GLOBAL_METRICS.record(operation, tier.name(), Event::Miss),
        }
    }

    GLOBAL_METRICS.record_origin(operation);
    match origin()?.into_present() {
        Some(value) => {
            for tier in tiers {
                tier.put(key, &value)?;
                GLOBAL_METRICS.record(operation, tier.name(), Event::Store);
            }
            debug!("miss, origin result stored in {} tiers", tiers.len());
            Ok(R::from_present(value))
        }
        None => {
            debug!("miss, origin result absent");
            absent::<V, R, E>(operation)
        }
    }
}

/// 异步解析
///
/// 依次等待每个缓存层的读取结果，前一层确认未命中后才读取下一层。
/// 在第 `i > 0` 层命中时，回填在 `backfill` 运行时（未指定时为当前运行时）上的独立任务中执行，
/// 其结果不影响返回给调用方的值；没有可用的 tokio 运行时时跳过回填。全部未命中时回源，存在的结果并发写入所有缓存层，
/// 等待全部写入结束后返回；任一写入失败时返回第一个错误。
///
/// 丢弃返回的 future 会取消正在进行的读取或回源，已派发的回填不受影响。
#[instrument(skip_all, level = "debug", fields(operation = %operation, key = ?key))]
pub async fn resolve_async<K, V, R, E, F, Fut>(
    operation: &str,
    key: K,
    tiers: &[SharedTier<K, V>],
    backfill: Option<&Handle>,
    origin: F,
) -> Result<R, E>
where
    K: CacheKey,
    V: CacheValue,
    R: CacheResult<V>,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    if tiers.is_empty() {
        return Err(no_tiers(operation));
    }

    for (index, tier) in tiers.iter().enumerate() {
        match tier.get_async(&key).await? {
            Some(value) => {
                GLOBAL_METRICS.record(operation, tier.name(), Event::Hit);
                if index > 0 {
                    spawn_backfill(
                        operation,
                        &tiers[..index],
                        key.clone(),
                        value.clone(),
                        backfill,
                    );
                }
                debug!(tier = tier.name(), index, "async hit");
                return Ok(R::from_present(value));
            }
            None => GLOBAL_METRICS.record(operation, tier.name(), Event::Miss),
        }
    }

    GLOBAL_METRICS.record_origin(operation);
    let value = match origin().await?.into_present() {
        Some(value) => value,
        None => {
            debug!("async miss, origin result absent");
            return absent::<V, R, E>(operation);
        }
    };

    let writes = join_all(tiers.iter().map(|tier| tier.put_async(&key, &value))).await;
    let mut first_error = None;
    for (tier, written) in tiers.iter().zip(writes) {
        match written {
            Ok(()) => GLOBAL_METRICS.record(operation, tier.name(), Event::Store),
            Err(e) => {
                warn!(tier = tier.name(), "failed to store origin result: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e.into());
    }

    debug!("async miss, origin result stored in {} tiers", tiers.len());
    Ok(R::from_present(value))
}

/// 派发回填任务
///
/// 并发写入 `targets` 中的所有缓存层，失败只记录日志和指标。
/// 未指定 `handle` 时使用当前的 tokio 运行时；当前不在 tokio 运行时中时
/// 跳过回填，每个目标缓存层记一次 `BackfillError`，返回 `None`。
pub fn spawn_backfill<K, V>(
    operation: &str,
    targets: &[SharedTier<K, V>],
    key: K,
    value: V,
    handle: Option<&Handle>,
) -> Option<JoinHandle<()>>
where
    K: CacheKey,
    V: CacheValue,
{
    let handle = match handle.cloned().map_or_else(Handle::try_current, Ok) {
        Ok(handle) => handle,
        Err(e) => {
            for tier in targets {
                GLOBAL_METRICS.record(operation, tier.name(), Event::BackfillError);
            }
            warn!(
                operation = %operation,
                key = ?key,
                "backfill skipped, no tokio runtime available: {}",
                e
            );
            return None;
        }
    };

    let operation = operation.to_string();
    let targets = targets.to_vec();
    let task = async move {
        let writes = join_all(targets.iter().map(|tier| tier.put_async(&key, &value))).await;
        for (tier, written) in targets.iter().zip(writes) {
            match written {
                Ok(()) => {
                    GLOBAL_METRICS.record(&operation, tier.name(), Event::Backfill);
                    debug!(operation = %operation, tier = tier.name(), key = ?key, "backfilled");
                }
                Err(e) => {
                    GLOBAL_METRICS.record(&operation, tier.name(), Event::BackfillError);
                    warn!(
                        operation = %operation,
                        tier = tier.name(),
                        key = ?key,
                        "backfill failed: {}",
                        e
                    );
                }
            }
        }
    };

    Some(handle.spawn(task))
}
