//! Application configuration from CLI flags and environment.

use clap::{Parser, ValueEnum};

use blockpool_core::PoolConfig;

/// Workload to run against the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Several threads allocate concurrently; every address must be unique.
    Stress,
    /// One thread allocates, returns part of its blocks, refills, then frees all.
    Reuse,
}

impl Scenario {
    /// Name used in reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Stress => "stress",
            Self::Reuse => "reuse",
        }
    }
}

/// blockpool — exercise a fixed-size block pool.
#[derive(Parser, Debug)]
#[command(name = "blockpool", version, about)]
pub struct AppConfig {
    /// Workload to run.
    #[arg(short, long, value_enum, default_value = "stress", env = "BLOCKPOOL_SCENARIO")]
    pub scenario: Scenario,

    /// Bytes per block.
    #[arg(short, long, default_value = "8", env = "BLOCKPOOL_BLOCK_SIZE")]
    pub block_size: usize,

    /// Blocks in the initial blob.
    #[arg(short, long, default_value = "20000", env = "BLOCKPOOL_CAPACITY")]
    pub capacity: usize,

    /// Grow the pool to this total capacity before running.
    #[arg(long)]
    pub grow_to: Option<usize>,

    /// Worker threads for the stress scenario.
    #[arg(short, long, default_value = "4", env = "BLOCKPOOL_THREADS")]
    pub threads: usize,

    /// Allocations per worker thread for the stress scenario.
    #[arg(long, default_value = "5000")]
    pub allocs_per_thread: usize,

    /// Reject returned addresses that do not belong to the pool.
    #[arg(long)]
    pub verify: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Pool settings described by the flags.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.block_size, self.capacity).verify_returns(self.verify)
    }
}
