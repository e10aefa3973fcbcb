use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::BenchConfig;
use crate::stats::summarize_ms;
use crate::workload::{build_manager, chunk, collection_ids};

/// Single-threaded insert throughput into live buffers.
pub(crate) fn run_insert_bench(config: &BenchConfig, mode: &str) -> Result<()> {
    let mut samples_ms = Vec::with_capacity(config.measured_runs);
    let mut total = Duration::from_secs(0);
    let mut buffered_bytes = 0usize;

    for _ in 0..config.measured_runs {
        let manager = build_manager(config)?;
        let batches: Vec<_> = collection_ids(config)
            .flat_map(|collection_id| {
                (0..config.chunks).map(move |index| (collection_id, index as u64))
            })
            .map(|(collection_id, index)| {
                let seed = ((collection_id as u64) << 32) | index;
                (
                    collection_id,
                    index,
                    chunk(seed, config.rows_per_chunk, config.dimension),
                )
            })
            .collect();

        let started_at = Instant::now();
        for (collection_id, op_id, batch) in batches {
            manager
                .insert_entities(collection_id, 0, batch, op_id)
                .with_context(|| format!("insert into collection {collection_id} failed"))?;
        }
        let elapsed = started_at.elapsed();

        buffered_bytes = manager.current_mutable_memory();
        samples_ms.push(elapsed.as_secs_f64() * 1_000.0);
        total += elapsed;
        let _ = manager.flush_all().context("flush after insert bench failed")?;
    }

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&samples_ms);
    let rows = (config.measured_runs * config.collections * config.chunks * config.rows_per_chunk)
        as f64;
    let rows_per_sec = rows / total.as_secs_f64();

    println!(
        "bench=insert mode={mode} collections={} chunks={} rows_per_chunk={} dimension={} measured_runs={} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} rows_per_sec={rows_per_sec:.2} buffered_bytes={buffered_bytes}",
        config.collections, config.chunks, config.rows_per_chunk, config.dimension, config.measured_runs
    );
    Ok(())
}
