use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::BenchConfig;
use crate::stats::summarize_ms;
use crate::workload::{build_manager, chunk, collection_ids};

/// Seal-and-serialize latency for fully loaded live buffers.
pub(crate) fn run_flush_bench(config: &BenchConfig, mode: &str) -> Result<()> {
    let mut samples_ms = Vec::with_capacity(config.measured_runs);
    let mut total = Duration::from_secs(0);
    let mut flushed_bytes = 0usize;
    let mut flushed_collections = 0usize;

    for _ in 0..config.measured_runs {
        let manager = build_manager(config)?;
        for collection_id in collection_ids(config) {
            for op_id in 0..config.chunks as u64 {
                let seed = ((collection_id as u64) << 32) | op_id;
                manager
                    .insert_entities(
                        collection_id,
                        (op_id % 4) as i64,
                        chunk(seed, config.rows_per_chunk, config.dimension),
                        op_id,
                    )
                    .with_context(|| format!("insert into collection {collection_id} failed"))?;
            }
        }
        flushed_bytes = manager.current_total_memory();

        let started_at = Instant::now();
        let flushed = manager.flush_all().context("flush bench pass failed")?;
        let elapsed = started_at.elapsed();

        flushed_collections = flushed.len();
        samples_ms.push(elapsed.as_secs_f64() * 1_000.0);
        total += elapsed;
    }

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&samples_ms);
    let mb_per_sec = (flushed_bytes as f64 * config.measured_runs as f64)
        / (1024.0 * 1024.0)
        / total.as_secs_f64();

    println!(
        "bench=flush mode={mode} collections={flushed_collections} bytes_per_pass={flushed_bytes} measured_runs={} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} mb_per_sec={mb_per_sec:.2}",
        config.measured_runs
    );
    Ok(())
}
