use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::BenchConfig;
use crate::stats::summarize_ms;
use crate::workload::{build_manager, chunk, BenchManager};

const POLICY_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct FlusherReport {
    flushes: usize,
    peak_bytes: usize,
    flush_ms: Vec<f64>,
}

/// Parallel writers across collections while a flusher drains buffers once
/// total memory crosses the configured threshold.
pub(crate) fn run_concurrent_bench(config: &BenchConfig, mode: &str) -> Result<()> {
    let mut samples_ms = Vec::with_capacity(config.measured_runs);
    let mut total = Duration::from_secs(0);
    let mut report = FlusherReport::default();

    for _ in 0..config.measured_runs {
        let manager = build_manager(config)?;
        let writers_done = AtomicBool::new(false);

        let started_at = Instant::now();
        let run_report = thread::scope(|scope| -> Result<FlusherReport> {
            let flusher = scope.spawn(|| drive_flushes(&manager, config, &writers_done));

            let written = write_all_collections(&manager, config);
            writers_done.store(true, Ordering::Release);

            let run_report = flusher
                .join()
                .map_err(|_| anyhow::anyhow!("flusher thread panicked"))??;
            written?;
            Ok(run_report)
        })?;
        let _ = manager.flush_all().context("final flush failed")?;
        let elapsed = started_at.elapsed();

        samples_ms.push(elapsed.as_secs_f64() * 1_000.0);
        total += elapsed;
        report.flushes += run_report.flushes;
        report.peak_bytes = report.peak_bytes.max(run_report.peak_bytes);
        report.flush_ms.extend(run_report.flush_ms);
    }

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&samples_ms);
    let (flush_p50_ms, flush_p95_ms, _) = summarize_ms(&report.flush_ms);
    let rows = (config.measured_runs * config.collections * config.chunks * config.rows_per_chunk)
        as f64;
    let rows_per_sec = rows / total.as_secs_f64();

    println!(
        "bench=concurrent mode={mode} collections={} chunks={} rows_per_chunk={} threads={} threshold_bytes={} measured_runs={} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} rows_per_sec={rows_per_sec:.2} flushes={} flush_p50_ms={flush_p50_ms:.6} flush_p95_ms={flush_p95_ms:.6} peak_bytes={}",
        config.collections,
        config.chunks,
        config.rows_per_chunk,
        rayon::current_num_threads(),
        config.flush_threshold_bytes,
        config.measured_runs,
        report.flushes,
        report.peak_bytes
    );
    Ok(())
}

fn write_all_collections(manager: &BenchManager, config: &BenchConfig) -> Result<()> {
    (1..=config.collections as i64)
        .into_par_iter()
        .try_for_each(|collection_id| -> Result<()> {
            for op_id in 0..config.chunks as u64 {
                let seed = ((collection_id as u64) << 32) | op_id;
                manager
                    .insert_entities(
                        collection_id,
                        0,
                        chunk(seed, config.rows_per_chunk, config.dimension),
                        op_id,
                    )
                    .with_context(|| format!("insert into collection {collection_id} failed"))?;
            }
            Ok(())
        })
}

fn drive_flushes(
    manager: &BenchManager,
    config: &BenchConfig,
    writers_done: &AtomicBool,
) -> Result<FlusherReport> {
    let mut report = FlusherReport::default();
    while !writers_done.load(Ordering::Acquire) {
        let buffered = manager.current_total_memory();
        report.peak_bytes = report.peak_bytes.max(buffered);

        if buffered >= config.flush_threshold_bytes {
            let started_at = Instant::now();
            let flushed = manager.flush_all().context("policy flush failed")?;
            report.flush_ms.push(started_at.elapsed().as_secs_f64() * 1_000.0);
            report.flushes += 1;
            tracing::debug!(
                buffered,
                collections = flushed.len(),
                "flushed on memory threshold"
            );
        } else {
            thread::sleep(POLICY_INTERVAL);
        }
    }
    Ok(report)
}
