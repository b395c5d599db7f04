//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置描述命令的实现。

use crate::cli::ConfigArgs;
use crate::config::{Config, OperationConfig, TierConfig};
use anyhow::{anyhow, Context, Result};

pub fn execute(args: &ConfigArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    config.validate().map_err(|e| anyhow!(e))?;

    print!("{}", render(&config));
    Ok(())
}

/// 将配置渲染为可读的文本
pub(crate) fn render(config: &Config) -> String {
    let mut output = String::from("=== Tiers ===\n");

    let mut tiers: Vec<(&String, &TierConfig)> = config.tiers.iter().collect();
    tiers.sort_by(|a, b| a.0.cmp(b.0));
    for (name, tier) in tiers {
        let detail = match tier {
            TierConfig::Memory(memory) => format!("max_capacity={}", memory.max_capacity),
            TierConfig::Redis(redis) => format!(
                "key_prefix={}, command_timeout={}ms",
                redis.key_prefix.as_deref().unwrap_or(name),
                redis.command_timeout_ms
            ),
        };
        output.push_str(&format!(
            "  {} [{}] ttl={}s, {}\n",
            name,
            tier.kind(),
            config.effective_ttl(tier),
            detail
        ));
    }

    output.push_str("\n=== Operations ===\n");
    let mut operations: Vec<(&String, &OperationConfig)> = config.operations.iter().collect();
    operations.sort_by(|a, b| a.0.cmp(b.0));
    for (name, operation) in operations {
        output.push_str(&format!(
            "  {}: {} -> origin, key {}, shape {}\n",
            name,
            operation.tiers.join(" -> "),
            key_shape(&operation.key),
            operation.shape
        ));
    }

    output
}

fn key_shape(params: &[String]) -> String {
    match params {
        [single] => format!("`{}`", single),
        many => format!("({})", many.join(", ")),
    }
}
