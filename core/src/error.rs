use std::error::Error;
use std::fmt;

use crate::buffer::BufferError;
use crate::validate::ChunkError;
use crate::CollectionId;

/// Error type for buffer manager operations.
#[derive(Debug)]
pub enum MemError {
    /// No schema snapshot could be resolved for the collection.
    SchemaNotFound(CollectionId),
    /// The chunk failed validation and never reached a buffer.
    InvalidChunk(ChunkError),
    /// The live buffer refused an add or delete.
    Buffer {
        collection_id: CollectionId,
        source: BufferError,
    },
    /// A flush pass stopped at the first buffer that failed to serialize.
    ///
    /// `flushed` lists collections serialized earlier in the same pass.
    /// `dropped` counts sealed buffers after the failing one; they are not
    /// queued again.
    Serialization {
        collection_id: CollectionId,
        flushed: Vec<CollectionId>,
        dropped: usize,
        source: BufferError,
    },
    /// A writer panicked while holding a manager lock.
    LockPoisoned(&'static str),
}

impl MemError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SchemaNotFound(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidChunk(_))
    }

    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Buffer { .. } | Self::Serialization { .. })
    }

    /// Faults inside the manager itself rather than in the input or the
    /// buffers it drives.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::LockPoisoned(_))
    }
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaNotFound(collection_id) => {
                write!(f, "could not get schema snapshot for collection {collection_id}")
            }
            Self::InvalidChunk(error) => write!(f, "invalid chunk: {error}"),
            Self::Buffer {
                collection_id,
                source,
            } => write!(f, "collection {collection_id} buffer failed: {source}"),
            Self::Serialization {
                collection_id,
                source,
                ..
            } => write!(f, "flush collection {collection_id} failed: {source}"),
            Self::LockPoisoned(name) => write!(f, "{name} lock poisoned"),
        }
    }
}

impl Error for MemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidChunk(error) => Some(error),
            Self::Buffer { source, .. } | Self::Serialization { source, .. } => Some(source),
            Self::SchemaNotFound(_) | Self::LockPoisoned(_) => None,
        }
    }
}

impl From<ChunkError> for MemError {
    fn from(value: ChunkError) -> Self {
        Self::InvalidChunk(value)
    }
}
