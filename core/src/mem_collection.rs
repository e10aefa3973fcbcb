use std::collections::BTreeMap;
use std::mem::size_of;
use std::sync::Arc;

use crate::buffer::{BufferError, BufferFactory, CollectionBuffer};
use crate::segment::{DeleteEntry, DeleteLog, Segment, SegmentBatch, SegmentSink};
use crate::{CollectionId, DataChunk, EntityId, OpId, PartitionId};

const DELETE_ENTRY_BYTES: usize = size_of::<EntityId>();

/// In-memory collection buffer that serializes each partition into one
/// segment of a [`SegmentSink`].
pub struct MemCollection {
    collection_id: CollectionId,
    sink: Arc<dyn SegmentSink>,
    partitions: BTreeMap<PartitionId, Vec<SegmentBatch>>,
    deletes: Vec<DeleteEntry>,
    last_op_id: Option<OpId>,
    memory_bytes: usize,
}

impl MemCollection {
    pub fn new(collection_id: CollectionId, sink: Arc<dyn SegmentSink>) -> Self {
        Self {
            collection_id,
            sink,
            partitions: BTreeMap::new(),
            deletes: Vec::new(),
            last_op_id: None,
            memory_bytes: 0,
        }
    }

    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.partitions.keys().copied().collect()
    }

    pub fn row_count(&self, partition_id: PartitionId) -> usize {
        self.partitions
            .get(&partition_id)
            .map(|batches| batches.iter().map(|batch| batch.row_count).sum())
            .unwrap_or(0)
    }

    pub fn pending_deletes(&self) -> &[DeleteEntry] {
        &self.deletes
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty() && self.deletes.is_empty()
    }

    fn check_op_order(&self, op_id: OpId) -> Result<(), BufferError> {
        match self.last_op_id {
            Some(last) if op_id < last => Err(BufferError::Rejected(format!(
                "operation {op_id} arrived after operation {last} in collection {}",
                self.collection_id
            ))),
            _ => Ok(()),
        }
    }
}

impl CollectionBuffer for MemCollection {
    fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    fn add(
        &mut self,
        partition_id: PartitionId,
        chunk: DataChunk,
        op_id: OpId,
    ) -> Result<(), BufferError> {
        self.check_op_order(op_id)?;
        self.last_op_id = Some(op_id);
        if chunk.is_empty() {
            return Ok(());
        }

        self.memory_bytes = self.memory_bytes.saturating_add(chunk.payload_bytes());
        self.partitions
            .entry(partition_id)
            .or_default()
            .push(SegmentBatch {
                op_id,
                row_count: chunk.row_count(),
                fields: chunk.into_fields(),
            });
        Ok(())
    }

    fn delete(&mut self, entity_ids: &[EntityId], op_id: OpId) -> Result<(), BufferError> {
        self.check_op_order(op_id)?;
        self.last_op_id = Some(op_id);

        self.deletes.extend(
            entity_ids
                .iter()
                .map(|&entity_id| DeleteEntry { entity_id, op_id }),
        );
        self.memory_bytes = self
            .memory_bytes
            .saturating_add(entity_ids.len().saturating_mul(DELETE_ENTRY_BYTES));
        Ok(())
    }

    /// Writes one segment per partition, then the delete log. Partitions are
    /// released as soon as their segment is written, so a failed call can be
    /// retried without writing them twice.
    fn serialize(&mut self) -> Result<(), BufferError> {
        while let Some((partition_id, batches)) = self.partitions.pop_first() {
            let segment = Segment {
                collection_id: self.collection_id,
                partition_id,
                batches,
            };
            if let Err(error) = self.sink.write_segment(&segment) {
                let _ = self.partitions.insert(partition_id, segment.batches);
                return Err(error);
            }
            self.memory_bytes = self
                .memory_bytes
                .saturating_sub(batches_bytes(&segment.batches));
        }

        if !self.deletes.is_empty() {
            let log = DeleteLog {
                collection_id: self.collection_id,
                entries: std::mem::take(&mut self.deletes),
            };
            if let Err(error) = self.sink.write_deletes(&log) {
                self.deletes = log.entries;
                return Err(error);
            }
        }

        self.memory_bytes = 0;
        Ok(())
    }

    fn erase_partition(&mut self, partition_id: PartitionId) {
        if let Some(batches) = self.partitions.remove(&partition_id) {
            self.memory_bytes = self.memory_bytes.saturating_sub(batches_bytes(&batches));
        }
    }

    fn memory_usage(&self) -> usize {
        self.memory_bytes
    }
}

/// Builds [`MemCollection`] buffers that all write into the same sink.
#[derive(Clone)]
pub struct MemCollectionFactory {
    sink: Arc<dyn SegmentSink>,
}

impl MemCollectionFactory {
    pub fn new(sink: Arc<dyn SegmentSink>) -> Self {
        Self { sink }
    }
}

impl BufferFactory for MemCollectionFactory {
    type Buffer = MemCollection;

    fn create(&self, collection_id: CollectionId) -> MemCollection {
        MemCollection::new(collection_id, Arc::clone(&self.sink))
    }
}

fn batches_bytes(batches: &[SegmentBatch]) -> usize {
    batches
        .iter()
        .flat_map(|batch| batch.fields.values().flatten())
        .map(Vec::len)
        .fold(0usize, usize::saturating_add)
}

#[cfg(test)]
mod tests;
