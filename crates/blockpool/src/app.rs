//! Application entry point and scenario dispatch.

use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::info;

use blockpool_core::{Block, LocalPool, LockMode, Pool, PoolError, PoolStats};

use crate::config::{AppConfig, Scenario};
use crate::errors::AppError;

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: &'static str,
    /// Bytes per block.
    pub block_size: usize,
    /// Final pool capacity.
    pub capacity: usize,
    /// Blobs backing the pool at the end of the run.
    pub blobs: usize,
    /// Blocks held at the peak of the run.
    pub peak_in_use: usize,
    /// Distinct addresses among the blocks held at the peak.
    pub unique_addresses: usize,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
    /// Pool counters at the end of the run.
    pub stats: PoolStats,
}

/// Run the application.
pub fn run(config: &AppConfig) -> Result<()> {
    let report = match config.scenario {
        Scenario::Stress => run_stress(config)?,
        Scenario::Reuse => run_reuse(config)?,
    };
    print_report(&report, config.json)
}

/// Run the concurrent disjointness check.
///
/// `threads` workers each allocate `allocs_per_thread` blocks from one shared
/// pool; the union of all addresses must be free of duplicates.
pub fn run_stress(config: &AppConfig) -> Result<ScenarioReport> {
    let pool: Pool = Pool::with_config(&config.pool_config())?;
    grow_if_requested(&pool, config.grow_to)?;
    info!(
        threads = config.threads,
        allocs_per_thread = config.allocs_per_thread,
        capacity = pool.capacity(),
        "starting stress run"
    );

    let workers = ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build()
        .context("failed to create worker threads")?;

    let start = Instant::now();
    let per_thread: Vec<Vec<Block>> = workers.install(|| {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        (0..config.threads)
            .into_par_iter()
            .map(|_| {
                (0..config.allocs_per_thread)
                    .map(|_| pool.alloc())
                    .collect::<Result<Vec<Block>, PoolError>>()
            })
            .collect::<Result<Vec<Vec<Block>>, PoolError>>()
    })?;

    let held: Vec<Block> = per_thread.into_iter().flatten().collect();
    let unique_addresses = check_disjoint(&held)?;
    let peak_in_use = pool.in_use_count();

    for block in held {
        pool.dealloc(block)?;
    }
    let elapsed_ms = elapsed_ms(start);

    Ok(finish(Scenario::Stress, &pool, peak_in_use, unique_addresses, elapsed_ms))
}

/// Run the single-threaded reuse sequence.
///
/// Allocate half the pool, return the most recent half of those in reverse
/// order, refill the whole pool, then return everything.
pub fn run_reuse(config: &AppConfig) -> Result<ScenarioReport> {
    let pool = LocalPool::with_config(&config.pool_config())?;
    let first = pool.capacity() / 2;
    let keep = first / 2;

    let start = Instant::now();
    let mut held: Vec<Block> = (0..first)
        .map(|_| pool.alloc())
        .collect::<Result<_, PoolError>>()?;
    for block in held.drain(keep..).rev() {
        pool.dealloc(block)?;
    }

    grow_if_requested(&pool, config.grow_to)?;
    while held.len() < pool.capacity() {
        held.push(pool.alloc()?);
    }

    let unique_addresses = check_disjoint(&held)?;
    let peak_in_use = pool.in_use_count();
    for block in held.drain(..) {
        pool.dealloc(block)?;
    }
    let elapsed_ms = elapsed_ms(start);

    Ok(finish(Scenario::Reuse, &pool, peak_in_use, unique_addresses, elapsed_ms))
}

fn grow_if_requested<M: LockMode>(pool: &Pool<M>, grow_to: Option<usize>) -> Result<()> {
    if let Some(target) = grow_to {
        pool.grow(target)
            .with_context(|| format!("failed to grow pool to {target} blocks"))?;
    }
    Ok(())
}

/// Count distinct addresses, failing if any block was handed out twice.
fn check_disjoint(held: &[Block]) -> Result<usize, AppError> {
    let unique: HashSet<Block> = held.iter().copied().collect();
    if unique.len() != held.len() {
        return Err(AppError::DuplicateAddresses(held.len() - unique.len()));
    }
    Ok(unique.len())
}

fn finish<M: LockMode>(
    scenario: Scenario,
    pool: &Pool<M>,
    peak_in_use: usize,
    unique_addresses: usize,
    elapsed_ms: u64,
) -> ScenarioReport {
    ScenarioReport {
        scenario: scenario.name(),
        block_size: pool.block_size(),
        capacity: pool.capacity(),
        blobs: pool.blob_count(),
        peak_in_use,
        unique_addresses,
        elapsed_ms,
        stats: pool.stats(),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn print_report(report: &ScenarioReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    println!("scenario:         {}", report.scenario);
    println!("block size:       {} bytes", report.block_size);
    println!("capacity:         {} blocks in {} blob(s)", report.capacity, report.blobs);
    println!("peak in use:      {}", report.peak_in_use);
    println!("unique addresses: {}", report.unique_addresses);
    println!(
        "allocations:      {} ({} refused while empty)",
        report.stats.allocations, report.stats.empty_hits
    );
    println!("deallocations:    {}", report.stats.deallocations);
    println!("elapsed:          {} ms", report.elapsed_ms);
    Ok(())
}
