use std::sync::Arc;

use anyhow::{Context, Result};
use membuf_core::{
    CollectionId, CollectionSchema, DataChunk, DataType, FieldSchema, JsonSegmentWriter,
    MemCollectionFactory, MemManager, MemorySink, SchemaRegistry, SegmentSink,
    SegmentWriterOptions,
};

use crate::config::BenchConfig;

pub(crate) type BenchManager = MemManager<Arc<SchemaRegistry>, MemCollectionFactory>;

/// Registers `config.collections` collections with an id, a flag and a float
/// vector field, and builds a manager writing to the configured sink.
pub(crate) fn build_manager(config: &BenchConfig) -> Result<BenchManager> {
    let registry = Arc::new(SchemaRegistry::new());
    for collection_id in collection_ids(config) {
        let schema = CollectionSchema::new(
            collection_id,
            vec![
                FieldSchema::new("id", DataType::Int64),
                FieldSchema::new("flag", DataType::Bool),
                FieldSchema::vector("vec", DataType::FloatVector, config.dimension as u64),
            ],
        )
        .with_context(|| format!("invalid bench schema for collection {collection_id}"))?;
        let _ = registry.register(schema);
    }

    let sink: Arc<dyn SegmentSink> = match &config.segment_dir {
        Some(dir) => Arc::new(JsonSegmentWriter::new(
            dir,
            SegmentWriterOptions {
                sync_on_write: config.sync_on_write,
            },
        )),
        None => Arc::new(MemorySink::new()),
    };

    Ok(MemManager::new(registry, MemCollectionFactory::new(sink)))
}

pub(crate) fn collection_ids(config: &BenchConfig) -> impl Iterator<Item = CollectionId> {
    1..=config.collections as CollectionId
}

pub(crate) fn chunk(seed: u64, rows: usize, dimension: usize) -> DataChunk {
    let ids = (0..rows as u64)
        .flat_map(|row| (seed.wrapping_mul(1_000_003).wrapping_add(row)).to_le_bytes())
        .collect();
    let flags = (0..rows).map(|row| u8::from(row % 2 == 0)).collect();
    let vectors = (0..rows * dimension)
        .flat_map(|index| {
            let mixed = (seed as usize)
                .wrapping_mul(31)
                .wrapping_add(index.wrapping_mul(17))
                % 10_000;
            (mixed as f32 / 10_000.0).to_le_bytes()
        })
        .collect();

    DataChunk::new(rows)
        .with_field("id", ids)
        .with_field("flag", flags)
        .with_field("vec", vectors)
}
