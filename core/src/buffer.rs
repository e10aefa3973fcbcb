use std::error::Error;
use std::fmt;

use crate::{CollectionId, DataChunk, EntityId, OpId, PartitionId};

/// Failure reported by a collection buffer or the sink it persists into.
#[derive(Debug)]
pub enum BufferError {
    Rejected(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
    InvalidData(String),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(message) => write!(f, "buffer rejected operation: {message}"),
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::InvalidData(message) => write!(f, "invalid segment data: {message}"),
        }
    }
}

impl Error for BufferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Serde(error) => Some(error),
            Self::Rejected(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<std::io::Error> for BufferError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for BufferError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Accumulates inserts and deletes for a single collection until it is
/// serialized.
///
/// The manager calls `add`/`delete` only while the buffer is live, and
/// `serialize` only after it has been sealed. `erase_partition` may reach a
/// buffer in either state and must ignore partitions it does not hold.
pub trait CollectionBuffer: Send {
    fn collection_id(&self) -> CollectionId;

    fn add(
        &mut self,
        partition_id: PartitionId,
        chunk: DataChunk,
        op_id: OpId,
    ) -> Result<(), BufferError>;

    fn delete(&mut self, entity_ids: &[EntityId], op_id: OpId) -> Result<(), BufferError>;

    fn serialize(&mut self) -> Result<(), BufferError>;

    fn erase_partition(&mut self, partition_id: PartitionId);

    /// Bytes currently held in memory by this buffer.
    fn memory_usage(&self) -> usize;
}

/// Creates an empty live buffer the first time a collection is written to.
pub trait BufferFactory: Send + Sync {
    type Buffer: CollectionBuffer;

    fn create(&self, collection_id: CollectionId) -> Self::Buffer;
}
