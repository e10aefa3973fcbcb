#![forbid(unsafe_code)]
//! Ingestion benchmarks for membuf.
//!
//! Scenarios:
//! - `insert`: single-threaded inserts into live buffers
//! - `concurrent`: parallel writers with a memory-threshold flusher
//! - `flush`: seal + serialize latency of loaded buffers

use std::env;
use std::process;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod concurrent_bench;
mod config;
mod flush_bench;
mod insert_bench;
mod stats;
mod workload;

use crate::concurrent_bench::run_concurrent_bench;
use crate::config::{BenchConfig, Scenario};
use crate::flush_bench::run_flush_bench;
use crate::insert_bench::run_insert_bench;

fn main() -> Result<()> {
    init_tracing();

    if cfg!(debug_assertions) && env::var("MEMBUF_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        eprintln!(
            "error=debug_build_not_allowed message=\"run `cargo run --release -p membuf-bench`\""
        );
        process::exit(2);
    }

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let config = BenchConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        scenario = ?config.scenario,
        collections = config.collections,
        chunks = config.chunks,
        rows_per_chunk = config.rows_per_chunk,
        dimension = config.dimension,
        flush_threshold_bytes = config.flush_threshold_bytes,
        segment_dir = ?config.segment_dir,
        "membuf bench started"
    );

    match config.scenario {
        Scenario::All => {
            run_insert_bench(&config, mode)?;
            run_concurrent_bench(&config, mode)?;
            run_flush_bench(&config, mode)?;
        }
        Scenario::Insert => run_insert_bench(&config, mode)?,
        Scenario::Concurrent => run_concurrent_bench(&config, mode)?,
        Scenario::Flush => run_flush_bench(&config, mode)?,
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}
