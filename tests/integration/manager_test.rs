//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存管理器集成测试

use crate::common::{setup_logging, AppError, RecordingTier};
use oxtier::error::CacheError;
use oxtier::manager::{self, resolve_named, resolve_named_async, resolve_named_optional};
use oxtier::metrics::GLOBAL_METRICS;
use oxtier::{CacheManager, Config, ResultShape};
use serial_test::serial;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[path = "../common/mod.rs"]
mod common;

const CONFIG: &str = r#"
config_version = 1

[global]
default_ttl = 60

[tiers.local]
kind = "memory"
max_capacity = 100

[tiers.shared]
kind = "memory"
max_capacity = 1000
ttl = 600

[operations.user_by_id]
tiers = ["local", "shared"]
key = ["id"]
shape = "optional"

[operations.score]
tiers = ["local"]
key = ["id"]

[operations.rank]
tiers = ["local", "shared"]
key = ["id"]

[operations.price]
tiers = ["local", "shared"]
key = ["sku", "region"]
shape = "primitive"
"#;

fn init() {
    setup_logging();
    CacheManager::init(Config::from_toml_str(CONFIG).unwrap()).unwrap();
}

#[test]
#[serial]
fn test_init_from_file() {
    setup_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    CacheManager::init_from_file(file.path()).unwrap();

    assert_eq!(
        CacheManager::operation_names(),
        vec![
            "price".to_string(),
            "rank".to_string(),
            "score".to_string(),
            "user_by_id".to_string()
        ]
    );
}

#[test]
#[serial]
fn test_init_rejects_invalid_config() {
    setup_logging();
    let config = Config::from_toml_str(
        r#"
        [tiers.local]
        kind = "memory"

        [operations.broken]
        tiers = ["local", "missing"]
        key = ["id"]
        "#,
    )
    .unwrap();

    let err = CacheManager::init(config).unwrap_err();
    assert!(matches!(err, CacheError::Config(ref msg) if msg.contains("unknown tier 'missing'")));
}

#[test]
#[serial]
fn test_resolve_named_optional_through_configured_tiers() {
    init();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let user: Result<Option<String>, AppError> =
            resolve_named_optional("user_by_id", &["id"], 7u64, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some("alice".to_string()))
            });
        assert_eq!(user.unwrap(), Some("alice".to_string()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let missing: Result<Option<String>, AppError> =
        resolve_named_optional("user_by_id", &["id"], 8u64, || Ok(None));
    assert_eq!(missing.unwrap(), None);
}

#[test]
#[serial]
fn test_operation_is_built_once() {
    init();
    let first = manager::operation::<u64, String, Option<String>>("user_by_id").unwrap();
    let second = manager::operation::<u64, String, Option<String>>("user_by_id").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.shape(), ResultShape::Optional);
    assert_eq!(first.tier_names(), vec!["local".to_string(), "shared".to_string()]);
}

#[test]
#[serial]
fn test_declared_shape_must_match_call_site() {
    init();
    let result: Result<String, AppError> =
        resolve_named("user_by_id", &["id"], 1u64, || Ok("x".to_string()));

    assert!(matches!(
        result,
        Err(AppError::Cache(CacheError::ShapeMismatch { ref declared, .. })) if declared == "optional"
    ));
}

#[test]
#[serial]
fn test_key_params_must_match_call_site() {
    init();
    let result: Result<u64, AppError> =
        resolve_named("price", &["sku"], ("a".to_string(), "eu".to_string()), || Ok(1));

    assert!(matches!(result, Err(AppError::Cache(CacheError::Config(_)))));
}

#[test]
#[serial]
fn test_unknown_operation() {
    init();
    let result: Result<u64, AppError> = resolve_named("nope", &["id"], 1u64, || Ok(1));
    assert!(matches!(result, Err(AppError::Cache(CacheError::NotFound(_)))));
}

#[test]
#[serial]
fn test_operations_do_not_share_entries() {
    init();
    let score: Result<u64, AppError> = resolve_named("score", &["id"], 1u64, || Ok(10));
    assert_eq!(score.unwrap(), 10);

    // 同一缓存层、同一键、同一类型，不同操作
    let rank: Result<u64, AppError> = resolve_named("rank", &["id"], 1u64, || Ok(20));
    assert_eq!(rank.unwrap(), 20);

    let score_again: Result<u64, AppError> = resolve_named("score", &["id"], 1u64, || Ok(99));
    assert_eq!(score_again.unwrap(), 10);
}

#[test]
#[serial]
fn test_registered_tier_replaces_configured_one() {
    init();
    let recording = RecordingTier::<u64, u64>::new("local").shared();
    recording.seed(5, 55);
    CacheManager::register_tier::<u64, u64>("local", recording.clone()).unwrap();

    let value: Result<u64, AppError> = resolve_named("score", &["id"], 5u64, || Ok(0));

    assert_eq!(value.unwrap(), 55);
    assert_eq!(recording.gets(), 1);
    assert!(CacheManager::register_tier::<u64, u64>("ghost", recording).is_err());
}

#[test]
#[serial]
fn test_metrics_can_be_disabled() {
    setup_logging();
    let config = Config::from_toml_str(
        r#"
        [global]
        enable_metrics = false

        [tiers.local]
        kind = "memory"

        [operations.quiet]
        tiers = ["local"]
        key = ["id"]
        "#,
    )
    .unwrap();
    CacheManager::init(config).unwrap();

    let value: Result<u64, AppError> = resolve_named("quiet", &["id"], 1u64, || Ok(1));
    assert_eq!(value.unwrap(), 1);
    assert!(!GLOBAL_METRICS.render().contains("operation=\"quiet\""));

    init();
    assert!(GLOBAL_METRICS.is_enabled());
}

#[tokio::test]
#[serial]
async fn test_resolve_named_async() {
    init();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let value: Result<u64, AppError> = resolve_named_async(
            "price",
            &["sku", "region"],
            ("p".to_string(), "eu".to_string()),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
        )
        .await;
        assert_eq!(value.unwrap(), 42);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
