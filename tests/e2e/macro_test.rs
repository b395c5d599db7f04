//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! `#[cacheable]` 宏端到端测试

use crate::common::{setup_logging, AppError};
use oxtier::macros::cacheable;
use oxtier::{CacheError, CacheManager, Config};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

#[path = "../common/mod.rs"]
mod common;

const CONFIG: &str = r#"
[tiers.local]
kind = "memory"
max_capacity = 100

[tiers.near]
kind = "memory"
max_capacity = 10

[operations.macro_user]
tiers = ["near", "local"]
key = ["id"]

[operations.macro_lookup]
tiers = ["near", "local"]
key = ["id", "region"]
shape = "optional"

[operations.macro_repo]
tiers = ["local"]
key = ["id"]

[operations.macro_mismatch]
tiers = ["local"]
key = ["user_id"]
"#;

static USER_CALLS: AtomicUsize = AtomicUsize::new(0);
static LOOKUP_CALLS: AtomicUsize = AtomicUsize::new(0);

fn init() {
    setup_logging();
    CacheManager::init(Config::from_toml_str(CONFIG).unwrap()).unwrap();
}

#[cacheable(operation = "macro_user")]
fn load_user(id: u64) -> Result<String, AppError> {
    USER_CALLS.fetch_add(1, Ordering::SeqCst);
    if id == 0 {
        return Err(AppError::Origin("no user 0".to_string()));
    }
    Ok(format!("user-{}", id))
}

#[cacheable(operation = "macro_lookup", optional)]
async fn lookup(id: u64, region: String) -> Result<Option<u64>, AppError> {
    LOOKUP_CALLS.fetch_add(1, Ordering::SeqCst);
    tokio::task::yield_now().await;
    if region.is_empty() {
        return Ok(None);
    }
    Ok(Some(id * 10))
}

#[cacheable(operation = "macro_mismatch")]
fn mismatched(id: u64) -> Result<u64, AppError> {
    Ok(id)
}

struct Repo {
    calls: AtomicUsize,
}

impl Repo {
    #[cacheable(operation = "macro_repo")]
    fn find(&self, id: u64) -> Result<u64, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let base: u64 = "100"
            .parse()
            .map_err(|_| AppError::Origin("bad base".to_string()))?;
        Ok(base + id)
    }
}

#[test]
#[serial]
fn test_sync_function_is_cached() {
    init();
    USER_CALLS.store(0, Ordering::SeqCst);

    assert_eq!(load_user(1).unwrap(), "user-1");
    assert_eq!(load_user(1).unwrap(), "user-1");
    assert_eq!(load_user(2).unwrap(), "user-2");
    assert_eq!(USER_CALLS.load(Ordering::SeqCst), 2);
}

#[test]
#[serial]
fn test_origin_errors_are_not_cached() {
    init();
    USER_CALLS.store(0, Ordering::SeqCst);

    assert!(matches!(load_user(0), Err(AppError::Origin(_))));
    assert!(matches!(load_user(0), Err(AppError::Origin(_))));
    assert_eq!(USER_CALLS.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[serial]
async fn test_async_optional_function_is_cached() {
    init();
    LOOKUP_CALLS.store(0, Ordering::SeqCst);

    assert_eq!(lookup(3, "eu".to_string()).await.unwrap(), Some(30));
    assert_eq!(lookup(3, "eu".to_string()).await.unwrap(), Some(30));
    assert_eq!(LOOKUP_CALLS.load(Ordering::SeqCst), 1);

    // 缺失的结果不缓存
    assert_eq!(lookup(3, String::new()).await.unwrap(), None);
    assert_eq!(lookup(3, String::new()).await.unwrap(), None);
    assert_eq!(LOOKUP_CALLS.load(Ordering::SeqCst), 3);
}

#[test]
#[serial]
fn test_method_receiver_is_not_part_of_key() {
    init();
    let first = Repo {
        calls: AtomicUsize::new(0),
    };
    let second = Repo {
        calls: AtomicUsize::new(0),
    };

    assert_eq!(first.find(1).unwrap(), 101);
    assert_eq!(second.find(1).unwrap(), 101);
    assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.calls.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn test_argument_names_must_match_configured_key() {
    init();
    assert!(matches!(
        mismatched(1),
        Err(AppError::Cache(CacheError::Config(ref msg))) if msg.contains("user_id")
    ));
}
