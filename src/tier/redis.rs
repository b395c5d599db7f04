//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的缓存层实现。

use super::{CacheTier, CacheValue};
use crate::config::RedisTierConfig;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::serialization::{Serializer, SerializerEnum};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Commands, Connection, RedisResult};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Redis缓存层实现
///
/// 键和值通过序列化器编码后存入Redis。阻塞接口复用一个同步连接，命令失败后
/// 丢弃该连接并在下次调用时重新建立；异步接口在首次使用时建立 `ConnectionManager` 并复用。
pub struct RedisTier<K, V> {
    name: String,
    client: Client,
    blocking: Mutex<Option<Connection>>,
    manager: OnceCell<ConnectionManager>,
    key_prefix: String,
    ttl: Option<u64>,
    connection_timeout: Duration,
    command_timeout: Duration,
    serializer: SerializerEnum,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> std::fmt::Debug for RedisTier<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("name", &self.name)
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K, V> RedisTier<K, V>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
{
    /// 创建新的Redis缓存层实例
    ///
    /// 只解析连接字符串，不会立即建立连接
    ///
    /// # 参数
    ///
    /// * `name` - 缓存层名称
    /// * `config` - Redis缓存层配置
    #[instrument(skip(config), level = "info", name = "init_redis_tier")]
    pub fn new(name: &str, config: &RedisTierConfig) -> Result<Self> {
        let client = Client::open(config.connection_string.expose_secret()).map_err(|e| {
            CacheError::Config(format!("Tier '{}' has an invalid connection string: {}", name, e))
        })?;

        Ok(Self {
            name: name.to_string(),
            client,
            blocking: Mutex::new(None),
            manager: OnceCell::new(),
            key_prefix: config
                .key_prefix
                .clone()
                .unwrap_or_else(|| name.to_string()),
            ttl: config.ttl,
            connection_timeout: Duration::from_millis(config.connection_timeout_ms),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            serializer: SerializerEnum::default(),
            _types: PhantomData,
        })
    }

    /// 计算存储在Redis中的键
    pub fn redis_key(&self, key: &K) -> Result<String> {
        Ok(format!(
            "{}:{}",
            self.key_prefix,
            self.serializer.serialize_key(key)?
        ))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = self
            .client
            .get_connection_with_timeout(self.connection_timeout)
            .map_err(|e| CacheError::tier(&self.name, e))?;
        conn.set_read_timeout(Some(self.command_timeout))
            .map_err(|e| CacheError::tier(&self.name, e))?;
        conn.set_write_timeout(Some(self.command_timeout))
            .map_err(|e| CacheError::tier(&self.name, e))?;
        Ok(conn)
    }

    /// 在复用的同步连接上执行命令
    ///
    /// 同一时刻只有一个阻塞调用持有该连接
    pub(crate) fn with_connection<T>(
        &self,
        command: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Result<T> {
        let mut slot = self
            .blocking
            .lock()
            .map_err(|_| CacheError::tier(&self.name, "connection lock poisoned"))?;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let result = command(&mut conn).map_err(|e| CacheError::tier(&self.name, e))?;
        *slot = Some(conn);
        Ok(result)
    }

    async fn async_connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                tokio::time::timeout(
                    self.connection_timeout,
                    ConnectionManager::new(self.client.clone()),
                )
                .await
                .map_err(|_| CacheError::tier(&self.name, "connection timed out"))?
                .map_err(|e| CacheError::tier(&self.name, e))
            })
            .await?;
        Ok(manager.clone())
    }

    fn decode(&self, bytes: Option<Vec<u8>>) -> Result<Option<V>> {
        bytes
            .map(|data| self.serializer.deserialize(&data))
            .transpose()
    }
}

#[async_trait]
impl<K, V> CacheTier<K, V> for RedisTier<K, V>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), level = "debug", fields(tier = %self.name))]
    fn get(&self, key: &K) -> Result<Option<V>> {
        let redis_key = self.redis_key(key)?;
        let bytes: Option<Vec<u8>> = self.with_connection(|conn| conn.get(&redis_key))?;
        debug!("redis get: key={}, found={}", redis_key, bytes.is_some());
        self.decode(bytes)
    }

    #[instrument(skip(self, value), level = "debug", fields(tier = %self.name))]
    fn put(&self, key: &K, value: &V) -> Result<()> {
        let redis_key = self.redis_key(key)?;
        let bytes = self.serializer.serialize(value)?;
        self.with_connection(|conn| match self.ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(&redis_key, bytes, ttl),
            None => conn.set::<_, _, ()>(&redis_key, bytes),
        })?;
        debug!("redis put: key={}, ttl={:?}", redis_key, self.ttl);
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(tier = %self.name))]
    async fn get_async(&self, key: &K) -> Result<Option<V>> {
        let redis_key = self.redis_key(key)?;
        let mut conn = self.async_connection().await?;
        let bytes: Option<Vec<u8>> =
            tokio::time::timeout(self.command_timeout, conn.get(&redis_key))
                .await
                .map_err(|_| CacheError::tier(&self.name, "GET timed out"))?
                .map_err(|e| CacheError::tier(&self.name, e))?;
        debug!("redis get_async: key={}, found={}", redis_key, bytes.is_some());
        self.decode(bytes)
    }

    #[instrument(skip(self, value), level = "debug", fields(tier = %self.name))]
    async fn put_async(&self, key: &K, value: &V) -> Result<()> {
        let redis_key = self.redis_key(key)?;
        let bytes = self.serializer.serialize(value)?;
        let mut conn = self.async_connection().await?;
        let write = async {
            match self.ttl {
                Some(ttl) => conn.set_ex::<_, _, ()>(&redis_key, bytes, ttl).await,
                None => conn.set::<_, _, ()>(&redis_key, bytes).await,
            }
        };
        tokio::time::timeout(self.command_timeout, write)
            .await
            .map_err(|_| CacheError::tier(&self.name, "SET timed out"))?
            .map_err(|e| CacheError::tier(&self.name, e))?;
        debug!("redis put_async: key={}, ttl={:?}", redis_key, self.ttl);
        Ok(())
    }
}
