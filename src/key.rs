//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存键的构建规则。
//!
//! 单个参数直接作为缓存键使用；多个参数按声明顺序组成元组，
//! 元组的相等性和哈希都是逐字段的结构化比较。

use crate::error::{CacheError, Result};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// 缓存键约束
///
/// 任何可比较、可哈希、可克隆并能跨线程共享的值都可以作为缓存键
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// 组成缓存键的参数列表
///
/// 以元组表示，元组的元素顺序即参数声明顺序。空元组没有实现此特征，
/// 无参数的操作在编译期即被拒绝。
pub trait KeyArgs {
    /// 构建出的缓存键类型
    type Key: CacheKey;

    /// 参数个数
    const ARITY: usize;

    /// 将参数转换为缓存键
    fn into_key(self) -> Self::Key;
}

impl<A: CacheKey> KeyArgs for (A,) {
    type Key = A;
    const ARITY: usize = 1;

    fn into_key(self) -> A {
        self.0
    }
}

macro_rules! composite_key_args {
    ($arity:expr; $($name:ident),+) => {
        impl<$($name: CacheKey),+> KeyArgs for ($($name,)+) {
            type Key = ($($name,)+);
            const ARITY: usize = $arity;

            fn into_key(self) -> Self::Key {
                self
            }
        }
    };
}

composite_key_args!(2; A, B);
composite_key_args!(3; A, B, C);
composite_key_args!(4; A, B, C, D);
composite_key_args!(5; A, B, C, D, E);
composite_key_args!(6; A, B, C, D, E, F);
composite_key_args!(7; A, B, C, D, E, F, G);
composite_key_args!(8; A, B, C, D, E, F, G, H);

/// 由参数构建缓存键
///
/// `build_key((id,))` 返回 `id` 本身，`build_key((id, region))` 返回 `(id, region)`。
pub fn build_key<A: KeyArgs>(args: A) -> A::Key {
    args.into_key()
}

/// 校验键参数名列表
///
/// 参数列表不能为空，参数名不能为空或重复
pub fn validate_params(operation: &str, params: &[String]) -> Result<()> {
    if params.is_empty() {
        return Err(CacheError::Config(format!(
            "Operation '{}' has no key parameters; a cache key needs at least one",
            operation
        )));
    }

    let mut seen = HashSet::new();
    for param in params {
        if param.trim().is_empty() {
            return Err(CacheError::Config(format!(
                "Operation '{}' has an empty key parameter name",
                operation
            )));
        }
        if !seen.insert(param.as_str()) {
            return Err(CacheError::Config(format!(
                "Operation '{}' declares key parameter '{}' more than once",
                operation, param
            )));
        }
    }

    Ok(())
}

/// 缓存键构建器
///
/// 每个调用点在初始化时根据参数名列表创建一次，之后只读
#[derive(Debug, Clone)]
pub struct KeyBuilder<A> {
    params: Vec<String>,
    _args: PhantomData<fn(A)>,
}

impl<A: KeyArgs> KeyBuilder<A> {
    /// 创建新的缓存键构建器
    ///
    /// # 参数
    ///
    /// * `params` - 参数名列表，按声明顺序
    ///
    /// # 返回值
    ///
    /// 参数列表为空、有重复或个数与 `A` 不一致时返回配置错误
    pub fn new<I, S>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        validate_params("<key builder>", &params)?;

        if params.len() != A::ARITY {
            return Err(CacheError::Config(format!(
                "Key parameters {:?} do not match argument arity {}",
                params,
                A::ARITY
            )));
        }

        Ok(Self {
            params,
            _args: PhantomData,
        })
    }

    /// 参数名列表
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// 构建缓存键
    pub fn build(&self, args: A) -> A::Key {
        args.into_key()
    }
}
