#![forbid(unsafe_code)]
//! Write buffering for membuf collections.
//!
//! Inserts are validated against the collection schema and accumulated in a
//! live buffer per collection. Flushing seals live buffers and serializes them
//! to a segment sink without blocking new writes.

pub mod buffer;
pub mod error;
pub mod manager;
pub mod mem_collection;
pub mod schema;
pub mod segment;
pub mod types;
pub mod validate;

pub use buffer::{BufferError, BufferFactory, CollectionBuffer};
pub use error::MemError;
pub use manager::MemManager;
pub use mem_collection::{MemCollection, MemCollectionFactory};
pub use schema::{
    CollectionSchema, DataType, FieldParams, FieldSchema, SchemaError, SchemaRegistry,
    SchemaResolver, DIMENSION_PARAM,
};
pub use segment::{
    read_delete_log, read_segment, DeleteEntry, DeleteLog, JsonSegmentWriter, MemorySink,
    Segment, SegmentBatch, SegmentSink, SegmentWriterOptions,
};
pub use types::{CollectionId, DataChunk, EntityId, OpId, PartitionId};
pub use validate::{row_size, validate_chunk, ChunkError, RowSize};
