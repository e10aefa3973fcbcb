use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

const COLLECTIONS_DEFAULT: usize = 8;
const ROWS_PER_CHUNK_DEFAULT: usize = 256;
const CHUNKS_DEFAULT: usize = 64;
const DIMENSION_DEFAULT: usize = 128;
const FLUSH_THRESHOLD_BYTES_DEFAULT: usize = 16 * 1024 * 1024;
const MEASURED_RUNS_DEFAULT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scenario {
    All,
    Insert,
    Concurrent,
    Flush,
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "all" => Ok(Self::All),
            "insert" => Ok(Self::Insert),
            "concurrent" => Ok(Self::Concurrent),
            "flush" => Ok(Self::Flush),
            _ => anyhow::bail!(
                "MEMBUF_BENCH_SCENARIO must be one of all,insert,concurrent,flush, got '{raw}'"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BenchConfig {
    pub(crate) scenario: Scenario,
    pub(crate) collections: usize,
    pub(crate) rows_per_chunk: usize,
    pub(crate) chunks: usize,
    pub(crate) dimension: usize,
    pub(crate) flush_threshold_bytes: usize,
    pub(crate) measured_runs: usize,
    /// Segments go to memory when unset.
    pub(crate) segment_dir: Option<PathBuf>,
    pub(crate) sync_on_write: bool,
}

impl BenchConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let scenario = env::var("MEMBUF_BENCH_SCENARIO")
            .unwrap_or_else(|_| "all".to_string())
            .parse()?;
        let collections = parse_usize("MEMBUF_BENCH_COLLECTIONS", COLLECTIONS_DEFAULT)?;
        let rows_per_chunk = parse_usize("MEMBUF_BENCH_ROWS_PER_CHUNK", ROWS_PER_CHUNK_DEFAULT)?;
        let chunks = parse_usize("MEMBUF_BENCH_CHUNKS", CHUNKS_DEFAULT)?;
        let dimension = parse_usize("MEMBUF_BENCH_DIMENSION", DIMENSION_DEFAULT)?;
        let flush_threshold_bytes =
            parse_usize("MEMBUF_FLUSH_THRESHOLD_BYTES", FLUSH_THRESHOLD_BYTES_DEFAULT)?;
        let measured_runs = parse_usize("MEMBUF_BENCH_MEASURED_RUNS", MEASURED_RUNS_DEFAULT)?;
        let segment_dir = parse_optional_path("MEMBUF_SEGMENT_DIR");
        let sync_on_write = parse_bool("MEMBUF_SYNC_ON_WRITE", false)?;

        for (key, value) in [
            ("MEMBUF_BENCH_COLLECTIONS", collections),
            ("MEMBUF_BENCH_ROWS_PER_CHUNK", rows_per_chunk),
            ("MEMBUF_BENCH_CHUNKS", chunks),
            ("MEMBUF_BENCH_DIMENSION", dimension),
            ("MEMBUF_FLUSH_THRESHOLD_BYTES", flush_threshold_bytes),
            ("MEMBUF_BENCH_MEASURED_RUNS", measured_runs),
        ] {
            if value == 0 {
                anyhow::bail!("{key} must be > 0");
            }
        }

        Ok(Self {
            scenario,
            collections,
            rows_per_chunk,
            chunks,
            dimension,
            flush_threshold_bytes,
            measured_runs,
            segment_dir,
            sync_on_write,
        })
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key} must be a boolean, got '{raw}'"),
    }
}

fn parse_optional_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const CONFIG_KEYS: &[&str] = &[
        "MEMBUF_BENCH_SCENARIO",
        "MEMBUF_BENCH_COLLECTIONS",
        "MEMBUF_BENCH_ROWS_PER_CHUNK",
        "MEMBUF_BENCH_CHUNKS",
        "MEMBUF_BENCH_DIMENSION",
        "MEMBUF_FLUSH_THRESHOLD_BYTES",
        "MEMBUF_BENCH_MEASURED_RUNS",
        "MEMBUF_SEGMENT_DIR",
        "MEMBUF_SYNC_ON_WRITE",
    ];

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_env() {
        for key in CONFIG_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_env();

        let config = BenchConfig::from_env().expect("defaults must parse");
        assert_eq!(config.scenario, Scenario::All);
        assert_eq!(config.collections, COLLECTIONS_DEFAULT);
        assert_eq!(config.flush_threshold_bytes, FLUSH_THRESHOLD_BYTES_DEFAULT);
        assert!(config.segment_dir.is_none());
        assert!(!config.sync_on_write);
    }

    #[test]
    fn reads_overrides() {
        let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_env();
        env::set_var("MEMBUF_BENCH_SCENARIO", "concurrent");
        env::set_var("MEMBUF_BENCH_DIMENSION", "16");
        env::set_var("MEMBUF_SEGMENT_DIR", "/tmp/membuf_segments");
        env::set_var("MEMBUF_SYNC_ON_WRITE", "yes");

        let config = BenchConfig::from_env().expect("overrides must parse");
        assert_eq!(config.scenario, Scenario::Concurrent);
        assert_eq!(config.dimension, 16);
        assert_eq!(
            config.segment_dir,
            Some(PathBuf::from("/tmp/membuf_segments"))
        );
        assert!(config.sync_on_write);
        clear_env();
    }

    #[test]
    fn rejects_invalid_values() {
        let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_env();

        env::set_var("MEMBUF_BENCH_SCENARIO", "search");
        assert!(BenchConfig::from_env().is_err());
        clear_env();

        env::set_var("MEMBUF_BENCH_CHUNKS", "0");
        let error = BenchConfig::from_env().expect_err("zero must fail");
        assert!(error.to_string().contains("MEMBUF_BENCH_CHUNKS must be > 0"));
        clear_env();

        env::set_var("MEMBUF_SYNC_ON_WRITE", "maybe");
        assert!(BenchConfig::from_env().is_err());
        clear_env();
    }
}
