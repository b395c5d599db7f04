//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存编排的日志和链路追踪初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 未设置 `RUST_LOG` 时使用的过滤规则
pub const DEFAULT_FILTER: &str = "oxtier=info";

/// 初始化 tracing 和 OpenTelemetry
///
/// 此函数应该在应用程序启动时调用一次。
/// 它配置全局 tracer provider，并设置由环境过滤器、控制台输出层和
/// OpenTelemetry 层组成的全局 subscriber。
///
/// # 参数
///
/// * `service_name` - 服务名称，用作 tracer 名称
/// * `default_filter` - `RUST_LOG` 未设置时的过滤规则，为空时使用 [`DEFAULT_FILTER`]
///
/// # 返回值
///
/// 全局 subscriber 已被其他组件设置时返回 `false`
pub fn init_tracing(service_name: &str, default_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    // 未配置导出器时 provider 不导出任何 span，只为 span 分配 trace 上下文
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// 关闭全局 tracer provider
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
