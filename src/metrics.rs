//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存编排的指标收集和监控功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 编排事件
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// 缓存层命中
    Hit,
    /// 缓存层未命中
    Miss,
    /// 回填写入
    Backfill,
    /// 分离执行的回填写入失败
    BackfillError,
    /// 回源结果写入
    Store,
    /// 调用回源函数
    OriginCall,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Hit => "hit",
            Event::Miss => "miss",
            Event::Backfill => "backfill",
            Event::BackfillError => "backfill_error",
            Event::Store => "store",
            Event::OriginCall => "call",
        }
    }
}

type EventKey = (String, String, Event);

/// 单个事件计数的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCount {
    pub operation: String,
    pub tier: String,
    pub event: &'static str,
    pub count: u64,
}

/// 指标收集器
///
/// 用于收集和存储各缓存操作、各缓存层的运行时指标
#[derive(Debug, Default)]
pub struct Metrics {
    /// 事件计数
    /// key: (operation, tier, event)
    events: DashMap<EventKey, AtomicU64>,
    /// 操作耗时
    /// key: (operation, mode) -> (total_duration_secs, count)
    durations: DashMap<(String, String), (f64, u64)>,
    disabled: AtomicBool,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录缓存层事件
    ///
    /// # 参数
    ///
    /// * `operation` - 操作名称
    /// * `tier` - 缓存层名称
    /// * `event` - 事件类型
    pub fn record(&self, operation: &str, tier: &str, event: Event) {
        if !self.is_enabled() {
            return;
        }
        let key = (operation.to_string(), tier.to_string(), event);
        if let Some(counter) = self.events.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.events
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录回源调用
    pub fn record_origin(&self, operation: &str) {
        self.record(operation, "origin", Event::OriginCall);
    }

    /// 记录操作耗时
    pub fn record_duration(&self, operation: &str, mode: &str, duration_secs: f64) {
        if !self.is_enabled() {
            return;
        }
        let mut entry = self
            .durations
            .entry((operation.to_string(), mode.to_string()))
            .or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 启用或停用指标收集
    pub fn set_enabled(&self, enabled: bool) {
        self.disabled.store(!enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed)
    }

    /// 读取事件计数
    pub fn count(&self, operation: &str, tier: &str, event: Event) -> u64 {
        self.events
            .get(&(operation.to_string(), tier.to_string(), event))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// 清空所有指标
    pub fn reset(&self) {
        self.events.clear();
        self.durations.clear();
    }

    /// 按 (operation, tier, event) 排序的事件计数快照
    pub fn snapshot(&self) -> Vec<EventCount> {
        let mut events: Vec<EventCount> = self
            .events
            .iter()
            .map(|e| {
                let (operation, tier, event) = e.key();
                EventCount {
                    operation: operation.clone(),
                    tier: tier.clone(),
                    event: event.as_str(),
                    count: e.value().load(Ordering::Relaxed),
                }
            })
            .collect();
        events.sort_by(|a, b| (&a.operation, &a.tier, a.event).cmp(&(&b.operation, &b.tier, b.event)));
        events
    }

    /// 将指标格式化为 Prometheus 文本格式
    pub fn render(&self) -> String {

        let mut durations: Vec<((String, String), (f64, u64))> = self
            .durations
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        durations.sort_by(|a, b| a.0.cmp(&b.0));

        let mut output = String::new();
        for event in self.snapshot() {
            output.push_str(&format!(
                "oxtier_events_total{{operation=\"{}\", tier=\"{}\", event=\"{}\"}} {}\n",
                event.operation, event.tier, event.event, event.count
            ));
        }
        for ((operation, mode), (total, count)) in durations {
            output.push_str(&format!(
                "oxtier_resolve_duration_seconds_sum{{operation=\"{}\", mode=\"{}\"}} {}\n",
                operation, mode, total
            ));
            output.push_str(&format!(
                "oxtier_resolve_duration_seconds_count{{operation=\"{}\", mode=\"{}\"}} {}\n",
                operation, mode, count
            ));
        }
        output
    }
}

/// 获取指标字符串
///
/// 将全局指标格式化为字符串返回，用于监控系统采集
pub fn get_metrics_string() -> String {
    GLOBAL_METRICS.render()
}
