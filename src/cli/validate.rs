//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置校验命令的实现。

use crate::cli::ConfigArgs;
use crate::config::Config;
use anyhow::{anyhow, Context, Result};

pub fn execute(args: &ConfigArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    config
        .validate()
        .map_err(|e| anyhow!("{}: {}", args.config.display(), e))?;

    println!(
        "✅ {} is valid ({} tiers, {} operations)",
        args.config.display(),
        config.tiers.len(),
        config.operations.len()
    );

    let mut names: Vec<&String> = config.operations.keys().collect();
    names.sort();
    for name in names {
        println!("  {}", name);
    }

    Ok(())
}
