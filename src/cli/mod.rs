//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxtier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "validate", about = "Parse and validate a tier configuration file")]
    Validate(ConfigArgs),

    #[command(name = "describe", about = "Show the tiers and operations of a configuration file")]
    Describe(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[arg(help = "Path to the TOML configuration file")]
    pub config: PathBuf,
}

mod describe;
mod validate;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    execute(&cli.command)
}

pub fn execute(command: &Commands) -> Result<()> {
    match command {
        Commands::Validate(args) => validate::execute(args),
        Commands::Describe(args) => describe::execute(args),
    }
}
