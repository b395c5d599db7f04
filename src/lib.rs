//! oxtier - 分层缓存编排库
//!
//! 在一个昂贵的计算（回源函数）前面放置一组有序的缓存层，
//! 按从近到远的顺序读取，命中时回填更近的缓存层，全部未命中时回源并写入所有缓存层。
//! 同时支持同步和异步两种调用方式。

#![doc(html_root_url = "https://docs.rs/oxtier/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use tokio;

pub mod cli;
pub mod config;
pub mod error;
pub mod key;
pub mod manager;
pub mod metrics;
pub mod operation;
pub mod orchestrator;
pub mod serialization;
pub mod shape;
pub mod telemetry;
pub mod tier;

/// 缓存注解宏
#[cfg(feature = "macros")]
pub mod macros {
    pub use oxtier_macros::cacheable;
}

#[cfg(feature = "macros")]
pub use oxtier_macros::cacheable;

// Re-export commonly used items
pub use config::Config;
pub use error::{CacheError, Result};
pub use key::{build_key, CacheKey, KeyArgs, KeyBuilder};
pub use manager::CacheManager;
pub use operation::{CacheOperation, OperationBuilder};
pub use orchestrator::SharedTier;
pub use shape::{CacheResult, ResultShape};
pub use tier::{CacheTier, CacheValue, MemoryTier, RedisTier};

/// oxtier 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
