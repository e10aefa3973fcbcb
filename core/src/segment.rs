use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::buffer::BufferError;
use crate::{CollectionId, EntityId, OpId, PartitionId};

mod fsync;

use fsync::write_file_atomically;

const SEGMENT_VERSION: u32 = 1;

/// One appended chunk as it lands in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBatch {
    pub op_id: OpId,
    pub row_count: usize,
    pub fields: BTreeMap<String, Option<Vec<u8>>>,
}

/// Rows of one partition flushed out of a collection buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub batches: Vec<SegmentBatch>,
}

impl Segment {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.row_count).sum()
    }

    pub fn max_op_id(&self) -> Option<OpId> {
        self.batches.iter().map(|batch| batch.op_id).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntry {
    pub entity_id: EntityId,
    pub op_id: OpId,
}

/// Deletes recorded against a collection since its last flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteLog {
    pub collection_id: CollectionId,
    pub entries: Vec<DeleteEntry>,
}

/// Durable destination for serialized collection buffers.
pub trait SegmentSink: Send + Sync {
    fn write_segment(&self, segment: &Segment) -> Result<(), BufferError>;

    fn write_deletes(&self, log: &DeleteLog) -> Result<(), BufferError>;
}

/// Keeps written segments in memory. Used by tests and benchmarks.
#[derive(Debug, Default)]
pub struct MemorySink {
    segments: Mutex<Vec<Segment>>,
    delete_logs: Mutex<Vec<DeleteLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.segments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn delete_logs(&self) -> Vec<DeleteLog> {
        self.delete_logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rows written so far for one collection, across all partitions.
    pub fn rows_for(&self, collection_id: CollectionId) -> usize {
        self.segments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|segment| segment.collection_id == collection_id)
            .map(Segment::row_count)
            .sum()
    }
}

impl SegmentSink for MemorySink {
    fn write_segment(&self, segment: &Segment) -> Result<(), BufferError> {
        self.segments
            .lock()
            .map_err(|_| BufferError::Rejected("memory sink lock poisoned".to_string()))?
            .push(segment.clone());
        Ok(())
    }

    fn write_deletes(&self, log: &DeleteLog) -> Result<(), BufferError> {
        self.delete_logs
            .lock()
            .map_err(|_| BufferError::Rejected("memory sink lock poisoned".to_string()))?
            .push(log.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWriterOptions {
    /// When true, segment files and their directory are fsynced on write.
    pub sync_on_write: bool,
}

impl Default for SegmentWriterOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SegmentLine {
    SegmentHeader {
        version: u32,
        collection_id: CollectionId,
        partition_id: PartitionId,
        batches: usize,
    },
    Batch {
        op_id: OpId,
        row_count: usize,
        fields: Vec<FieldLine>,
    },
    DeleteHeader {
        version: u32,
        collection_id: CollectionId,
        entries: usize,
    },
    Delete(DeleteEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FieldLine {
    name: String,
    #[serde(default)]
    crc32: Option<u32>,
    #[serde(default)]
    data: Option<Vec<u8>>,
}

/// Writes each segment as a JSON-lines file:
/// `<root>/<collection>/<partition>/seg_<seq>.jsonl` for rows and
/// `<root>/<collection>/del_<seq>.jsonl` for deletes.
#[derive(Debug)]
pub struct JsonSegmentWriter {
    root: PathBuf,
    options: SegmentWriterOptions,
    next_seq: AtomicU64,
}

impl JsonSegmentWriter {
    pub fn new(root: impl Into<PathBuf>, options: SegmentWriterOptions) -> Self {
        let first_seq = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX / 2))
            .unwrap_or(0);

        Self {
            root: root.into(),
            options,
            next_seq: AtomicU64::new(first_seq),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_dir(&self, collection_id: CollectionId) -> PathBuf {
        self.root.join(collection_id.to_string())
    }

    /// Lists every segment and delete log of a collection in write order.
    pub fn segment_files(&self, collection_id: CollectionId) -> Result<Vec<PathBuf>, BufferError> {
        let dir = self.collection_dir(collection_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        collect_jsonl(&dir, &mut files)?;
        files.sort_by_key(|path| file_seq(path));
        Ok(files)
    }

    fn next_path(&self, dir: PathBuf, prefix: &str) -> PathBuf {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        dir.join(format!("{prefix}_{seq:020}.jsonl"))
    }

    fn write_lines(&self, path: &Path, lines: &[SegmentLine]) -> Result<(), BufferError> {
        if path.exists() {
            return Err(BufferError::InvalidData(format!(
                "segment file {} already exists",
                path.display()
            )));
        }

        let mut bytes = Vec::new();
        for line in lines {
            serde_json::to_writer(&mut bytes, line)?;
            bytes.push(b'\n');
        }
        write_file_atomically(path, &bytes, self.options.sync_on_write)
    }
}

impl SegmentSink for JsonSegmentWriter {
    fn write_segment(&self, segment: &Segment) -> Result<(), BufferError> {
        let dir = self
            .collection_dir(segment.collection_id)
            .join(segment.partition_id.to_string());
        let path = self.next_path(dir, "seg");

        let mut lines = Vec::with_capacity(segment.batches.len() + 1);
        lines.push(SegmentLine::SegmentHeader {
            version: SEGMENT_VERSION,
            collection_id: segment.collection_id,
            partition_id: segment.partition_id,
            batches: segment.batches.len(),
        });
        lines.extend(segment.batches.iter().map(batch_line));

        self.write_lines(&path, &lines)?;
        tracing::debug!(
            collection_id = segment.collection_id,
            partition_id = segment.partition_id,
            rows = segment.row_count(),
            path = %path.display(),
            "wrote segment"
        );
        Ok(())
    }

    fn write_deletes(&self, log: &DeleteLog) -> Result<(), BufferError> {
        let path = self.next_path(self.collection_dir(log.collection_id), "del");

        let mut lines = Vec::with_capacity(log.entries.len() + 1);
        lines.push(SegmentLine::DeleteHeader {
            version: SEGMENT_VERSION,
            collection_id: log.collection_id,
            entries: log.entries.len(),
        });
        lines.extend(log.entries.iter().copied().map(SegmentLine::Delete));

        self.write_lines(&path, &lines)
    }
}

/// Loads a segment file and verifies every field checksum.
pub fn read_segment(path: &Path) -> Result<Segment, BufferError> {
    let mut lines = read_lines(path)?.into_iter();
    let Some(SegmentLine::SegmentHeader {
        version,
        collection_id,
        partition_id,
        batches: expected_batches,
    }) = lines.next()
    else {
        return Err(BufferError::InvalidData(
            "segment file must start with a segment header".to_string(),
        ));
    };
    check_version(version)?;

    let mut batches = Vec::with_capacity(expected_batches);
    for line in lines {
        let SegmentLine::Batch {
            op_id,
            row_count,
            fields,
        } = line
        else {
            return Err(BufferError::InvalidData(
                "unexpected record in segment file".to_string(),
            ));
        };

        let mut decoded = BTreeMap::new();
        for field in fields {
            if let Some(data) = &field.data {
                let checksum = crc32fast::hash(data);
                if field.crc32 != Some(checksum) {
                    return Err(BufferError::InvalidData(format!(
                        "checksum mismatch for field '{}'",
                        field.name
                    )));
                }
            }
            let _ = decoded.insert(field.name, field.data);
        }
        batches.push(SegmentBatch {
            op_id,
            row_count,
            fields: decoded,
        });
    }

    if batches.len() != expected_batches {
        return Err(BufferError::InvalidData(format!(
            "segment declares {expected_batches} batches, found {}",
            batches.len()
        )));
    }

    Ok(Segment {
        collection_id,
        partition_id,
        batches,
    })
}

pub fn read_delete_log(path: &Path) -> Result<DeleteLog, BufferError> {
    let mut lines = read_lines(path)?.into_iter();
    let Some(SegmentLine::DeleteHeader {
        version,
        collection_id,
        entries: expected_entries,
    }) = lines.next()
    else {
        return Err(BufferError::InvalidData(
            "delete log must start with a delete header".to_string(),
        ));
    };
    check_version(version)?;

    let entries = lines
        .map(|line| match line {
            SegmentLine::Delete(entry) => Ok(entry),
            _ => Err(BufferError::InvalidData(
                "unexpected record in delete log".to_string(),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if entries.len() != expected_entries {
        return Err(BufferError::InvalidData(format!(
            "delete log declares {expected_entries} entries, found {}",
            entries.len()
        )));
    }

    Ok(DeleteLog {
        collection_id,
        entries,
    })
}

fn batch_line(batch: &SegmentBatch) -> SegmentLine {
    let fields = batch
        .fields
        .iter()
        .map(|(name, data)| FieldLine {
            name: name.clone(),
            crc32: data.as_deref().map(crc32fast::hash),
            data: data.clone(),
        })
        .collect();

    SegmentLine::Batch {
        op_id: batch.op_id,
        row_count: batch.row_count,
        fields,
    }
}

fn read_lines(path: &Path) -> Result<Vec<SegmentLine>, BufferError> {
    let file = File::open(path)?;
    let mut lines = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|error| {
            BufferError::InvalidData(format!("invalid segment line {}: {error}", index + 1))
        })?;
        lines.push(record);
    }
    Ok(lines)
}

fn check_version(version: u32) -> Result<(), BufferError> {
    if version != SEGMENT_VERSION {
        return Err(BufferError::InvalidData(format!(
            "unsupported segment version {version}"
        )));
    }
    Ok(())
}

fn file_seq(path: &Path) -> Option<u64> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.split_once('_'))
        .and_then(|(_, seq)| seq.parse().ok())
}

fn collect_jsonl(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), BufferError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_jsonl(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|extension| extension == "jsonl")
        {
            files.push(path);
        }
    }
    Ok(())
}
