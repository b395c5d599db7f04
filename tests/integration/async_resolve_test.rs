//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 异步解析集成测试

use crate::common::{eventually, setup_logging, unique_name, AppError, RecordingTier};
use oxtier::error::CacheError;
use oxtier::metrics::{Event, GLOBAL_METRICS};
use oxtier::orchestrator::{spawn_backfill, SharedTier};
use oxtier::shape::CacheResult;
use oxtier::CacheOperation;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[path = "../common/mod.rs"]
mod common;

type Tier = Arc<RecordingTier<String, String>>;

fn recording(name: &str) -> Tier {
    RecordingTier::new(name).shared()
}

fn operation<R: CacheResult<String>>(name: &str, tiers: &[Tier]) -> CacheOperation<String, String, R> {
    let mut builder = CacheOperation::<String, String>::builder(name).key_params(["id"]);
    for tier in tiers {
        builder = builder.shared_tier(tier.clone());
    }
    builder.build::<R>().unwrap()
}

/// 在第二层命中时立即返回，回填在后台完成
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_hit_backfills_in_background() {
    setup_logging();
    let name = unique_name("async_backfill");
    let (l1, l2) = (recording("L1"), recording("L2"));
    l2.seed("42".to_string(), "v42".to_string());
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = op
        .resolve_async("42".to_string(), || async { Ok("fresh".to_string()) })
        .await;

    assert_eq!(value.unwrap(), "v42");
    assert!(eventually(|| l1.contains(&"42".to_string())).await);
    assert_eq!(l2.puts(), 0);
    assert!(eventually(|| GLOBAL_METRICS.count(&name, "L1", Event::Backfill) == 1).await);
}

/// 回填写入被挡住时调用方照常返回
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_backfill_does_not_block_caller() {
    let name = unique_name("async_gated");
    let gate = Arc::new(Semaphore::new(0));
    let l1 = RecordingTier::new("L1").with_put_gate(gate.clone()).shared();
    let l2 = recording("L2");
    l2.seed("k".to_string(), "v".to_string());
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = tokio::time::timeout(
        Duration::from_secs(1),
        op.resolve_async("k".to_string(), || async { Ok("fresh".to_string()) }),
    )
    .await
    .expect("caller must not wait for the backfill");

    assert_eq!(value.unwrap(), "v");
    assert!(!l1.contains(&"k".to_string()));

    gate.add_permits(1);
    assert!(eventually(|| l1.contains(&"k".to_string())).await);
}

/// 分离执行的回填失败不影响返回值，只记录指标
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_backfill_error_is_swallowed() {
    let name = unique_name("async_backfill_error");
    let (l1, l2) = (recording("L1"), recording("L2"));
    l1.fail_puts(true);
    l2.seed("k".to_string(), "v".to_string());
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = op
        .resolve_async("k".to_string(), || async { Ok("fresh".to_string()) })
        .await;

    assert_eq!(value.unwrap(), "v");
    assert!(eventually(|| GLOBAL_METRICS.count(&name, "L1", Event::BackfillError) == 1).await);
    assert!(!l1.contains(&"k".to_string()));
}

/// 全部未命中时等待所有写入完成后才返回
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_miss_awaits_all_writes() {
    let name = unique_name("async_miss");
    let (l1, l2) = (recording("L1"), recording("L2"));
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let calls = AtomicUsize::new(0);
    let value: Result<String, AppError> = op
        .resolve_async("7".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("fresh".to_string()) }
        })
        .await;

    assert_eq!(value.unwrap(), "fresh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(l1.peek(&"7".to_string()), Some("fresh".to_string()));
    assert_eq!(l2.peek(&"7".to_string()), Some("fresh".to_string()));
}

/// 回源结果的写入失败返回给调用方，其余缓存层的写入仍然完成
#[tokio::test]
async fn test_async_miss_write_error_propagates() {
    let name = unique_name("async_write_error");
    let (l1, l2) = (recording("L1"), recording("L2"));
    l2.fail_puts(true);
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = op
        .resolve_async("k".to_string(), || async { Ok("fresh".to_string()) })
        .await;

    assert!(matches!(
        value,
        Err(AppError::Cache(CacheError::Tier { ref tier, .. })) if tier == "L2"
    ));
    assert!(l1.contains(&"k".to_string()));
}

/// 第一层命中时不读取更远的缓存层
#[tokio::test]
async fn test_async_reads_stop_at_first_hit() {
    let name = unique_name("async_first_hit");
    let (l1, l2) = (recording("L1"), recording("L2"));
    l1.seed("k".to_string(), "near".to_string());
    l2.seed("k".to_string(), "far".to_string());
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = op
        .resolve_async("k".to_string(), || async { Ok("fresh".to_string()) })
        .await;

    assert_eq!(value.unwrap(), "near");
    assert_eq!(l2.gets(), 0);
    assert_eq!(l1.puts(), 0);
}

/// 在第三层命中时回填前两层，命中层和更远的缓存层不被写入
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_hit_at_third_tier_backfills_nearer_tiers_only() {
    let name = unique_name("async_third_tier");
    let (l1, l2, l3, l4) = (recording("L1"), recording("L2"), recording("L3"), recording("L4"));
    l3.seed("k".to_string(), "v3".to_string());
    let op = operation::<String>(&name, &[l1.clone(), l2.clone(), l3.clone(), l4.clone()]);

    let calls = AtomicUsize::new(0);
    let value: Result<String, AppError> = op
        .resolve_async("k".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("fresh".to_string()) }
        })
        .await;

    assert_eq!(value.unwrap(), "v3");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(eventually(|| l1.contains(&"k".to_string()) && l2.contains(&"k".to_string())).await);
    assert_eq!(l1.peek(&"k".to_string()), Some("v3".to_string()));
    assert_eq!(l2.peek(&"k".to_string()), Some("v3".to_string()));
    assert_eq!(l3.puts(), 0);
    assert_eq!(l4.gets(), 0);
    assert_eq!(l4.puts(), 0);
    assert!(!l4.contains(&"k".to_string()));
}

/// 不在 tokio 运行时中时命中照常返回，回填被跳过并记录指标
#[test]
fn test_hit_outside_tokio_runtime_skips_backfill() {
    let name = unique_name("async_no_runtime");
    let (l1, l2) = (recording("L1"), recording("L2"));
    l2.seed("k".to_string(), "v".to_string());
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = futures::executor::block_on(
        op.resolve_async("k".to_string(), || async { Ok("fresh".to_string()) }),
    );

    assert_eq!(value.unwrap(), "v");
    assert_eq!(l1.puts(), 0);
    assert!(!l1.contains(&"k".to_string()));
    assert_eq!(GLOBAL_METRICS.count(&name, "L1", Event::BackfillError), 1);
}

/// 可选形态下缺失的回源结果不写入
#[tokio::test]
async fn test_async_optional_absent_is_never_stored() {
    let name = unique_name("async_absent");
    let (l1, l2) = (recording("L1"), recording("L2"));
    let op = operation::<Option<String>>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<Option<String>, AppError> = op
        .resolve_async("missing".to_string(), || async { Ok(None) })
        .await;

    assert_eq!(value.unwrap(), None);
    assert_eq!(l1.puts() + l2.puts(), 0);
}

/// 回源错误原样返回
#[tokio::test]
async fn test_async_origin_error_propagates() {
    let name = unique_name("async_origin_error");
    let (l1, l2) = (recording("L1"), recording("L2"));
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let value: Result<String, AppError> = op
        .resolve_async("k".to_string(), || async {
            Err(AppError::Origin("timeout".to_string()))
        })
        .await;

    assert!(matches!(value, Err(AppError::Origin(_))));
    assert_eq!(l1.puts() + l2.puts(), 0);
}

/// 丢弃进行中的调用会取消读取，回源函数不会被调用
#[tokio::test]
async fn test_cancellation_during_read_skips_origin() {
    let name = unique_name("async_cancel_read");
    let l1 = RecordingTier::new("L1")
        .with_get_delay(Duration::from_millis(500))
        .shared();
    let l2 = recording("L2");
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let calls = AtomicUsize::new(0);
    let result = tokio::time::timeout(
        Duration::from_millis(20),
        op.resolve_async("k".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, AppError>("fresh".to_string()) }
        }),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(l2.gets(), 0);
    assert_eq!(l1.len() + l2.len(), 0);
}

/// 丢弃等待回源的调用时不写入任何缓存层
#[tokio::test]
async fn test_cancellation_during_origin_writes_nothing() {
    let name = unique_name("async_cancel_origin");
    let (l1, l2) = (recording("L1"), recording("L2"));
    let op = operation::<String>(&name, &[l1.clone(), l2.clone()]);

    let result = tokio::time::timeout(
        Duration::from_millis(20),
        op.resolve_async("k".to_string(), || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, AppError>("fresh".to_string())
        }),
    )
    .await;

    assert!(result.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(l1.puts() + l2.puts(), 0);
}

/// 回填在指定的运行时上执行
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backfill_runs_on_configured_runtime() {
    let name = unique_name("async_runtime");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("backfill-worker")
        .enable_all()
        .build()
        .unwrap();

    let (l1, l2) = (recording("L1"), recording("L2"));
    l2.seed("k".to_string(), "v".to_string());
    let op = CacheOperation::<String, String>::builder(name.as_str())
        .shared_tier(l1.clone())
        .shared_tier(l2.clone())
        .key_params(["id"])
        .backfill_runtime(runtime.handle().clone())
        .build::<String>()
        .unwrap();

    let value: Result<String, AppError> = op
        .resolve_async("k".to_string(), || async { Ok("fresh".to_string()) })
        .await;

    assert_eq!(value.unwrap(), "v");
    assert!(eventually(|| l1.contains(&"k".to_string())).await);
    assert_eq!(l1.put_threads(), vec!["backfill-worker".to_string()]);
    runtime.shutdown_background();
}

/// 回填任务并发写入所有目标缓存层，单个失败不影响其他缓存层
#[tokio::test]
async fn test_spawn_backfill_writes_every_target() {
    let name = unique_name("spawn_backfill");
    let (l1, l2) = (recording("L1"), recording("L2"));
    l1.fail_puts(true);
    let targets: Vec<SharedTier<String, String>> =
        vec![l1.clone() as SharedTier<_, _>, l2.clone() as SharedTier<_, _>];

    spawn_backfill(&name, &targets, "k".to_string(), "v".to_string(), None)
        .expect("inside a tokio runtime")
        .await
        .unwrap();

    assert_eq!(l1.puts(), 1);
    assert_eq!(l2.peek(&"k".to_string()), Some("v".to_string()));
    assert_eq!(GLOBAL_METRICS.count(&name, "L1", Event::BackfillError), 1);
    assert_eq!(GLOBAL_METRICS.count(&name, "L2", Event::Backfill), 1);
}
