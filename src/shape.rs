//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存操作结果的形态，以及缺失值的表示方式。

use serde::Deserialize;
use std::fmt;

/// 结果形态枚举
///
/// 决定结果如何包装，以及结果是否可能缺失
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// 普通值，值本身总是存在
    #[default]
    Plain,
    /// `Option` 包装的值，`None` 表示缺失
    Optional,
    /// 基础类型值，不可能缺失
    Primitive,
}

impl ResultShape {
    /// 该形态是否能表示缺失值
    pub fn admits_absence(self) -> bool {
        matches!(self, ResultShape::Optional)
    }

    /// 声明的形态能否由 `actual` 形态的结果类型承载
    pub fn accepts(self, actual: ResultShape) -> bool {
        self.admits_absence() == actual.admits_absence()
    }
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultShape::Plain => "plain",
            ResultShape::Optional => "optional",
            ResultShape::Primitive => "primitive",
        };
        f.write_str(name)
    }
}

/// 缓存结果特征
///
/// 将调用方看到的结果类型 `Self` 与缓存层中存储的值类型 `V` 联系起来。
/// `V` 本身是普通形态，`Option<V>` 是可选形态。
pub trait CacheResult<V>: Sized {
    /// 结果形态
    const SHAPE: ResultShape;

    /// 取出存在的值，缺失时返回 `None`
    fn into_present(self) -> Option<V>;

    /// 包装一个存在的值
    fn from_present(value: V) -> Self;

    /// 缺失值的表示，无法表示缺失时返回 `None`
    fn absent() -> Option<Self>;
}

impl<V> CacheResult<V> for V {
    const SHAPE: ResultShape = ResultShape::Plain;

    fn into_present(self) -> Option<V> {
        Some(self)
    }

    fn from_present(value: V) -> Self {
        value
    }

    fn absent() -> Option<Self> {
        None
    }
}

impl<V> CacheResult<V> for Option<V> {
    const SHAPE: ResultShape = ResultShape::Optional;

    fn into_present(self) -> Option<V> {
        self
    }

    fn from_present(value: V) -> Self {
        Some(value)
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}
