//! Two-tier insert buffering.
//!
//! Live buffers sit in a map keyed by collection and take inserts and
//! deletes. Sealing moves a buffer into the sealed queue, where it waits for
//! the next flush pass. Serialization runs under its own lock so writers
//! never wait on segment I/O.
//!
//! Lock order: `live` before `sealed`, and `serialization` before `sealed`.
//! `sealed` is never held while acquiring another lock.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::{Mutex, MutexGuard};

use crate::buffer::{BufferFactory, CollectionBuffer};
use crate::error::MemError;
use crate::schema::SchemaResolver;
use crate::validate::validate_chunk;
use crate::{CollectionId, DataChunk, EntityId, OpId, PartitionId};

pub struct MemManager<R, F: BufferFactory> {
    schemas: R,
    factory: F,
    live: Mutex<BTreeMap<CollectionId, F::Buffer>>,
    sealed: Mutex<Vec<F::Buffer>>,
    serialization: Mutex<()>,
}

impl<R, F> MemManager<R, F>
where
    R: SchemaResolver,
    F: BufferFactory,
{
    pub fn new(schemas: R, factory: F) -> Self {
        Self {
            schemas,
            factory,
            live: Mutex::new(BTreeMap::new()),
            sealed: Mutex::new(Vec::new()),
            serialization: Mutex::new(()),
        }
    }

    pub fn schemas(&self) -> &R {
        &self.schemas
    }

    /// Validates `chunk` against the current schema snapshot of the collection.
    pub fn validate_chunk(
        &self,
        collection_id: CollectionId,
        chunk: &DataChunk,
    ) -> Result<(), MemError> {
        let Some(schema) = self.schemas.resolve(collection_id) else {
            tracing::error!(collection_id, "could not get schema snapshot");
            return Err(MemError::SchemaNotFound(collection_id));
        };

        validate_chunk(&schema, chunk).map_err(|error| {
            tracing::warn!(collection_id, field = error.field(), %error, "rejected chunk");
            MemError::InvalidChunk(error)
        })
    }

    pub fn insert_entities(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
        chunk: DataChunk,
        op_id: OpId,
    ) -> Result<(), MemError> {
        self.validate_chunk(collection_id, &chunk)?;

        let mut live = self.lock_live()?;
        self.live_buffer(&mut live, collection_id)
            .add(partition_id, chunk, op_id)
            .map_err(|source| MemError::Buffer {
                collection_id,
                source,
            })
    }

    pub fn delete_entities(
        &self,
        collection_id: CollectionId,
        entity_ids: &[EntityId],
        op_id: OpId,
    ) -> Result<(), MemError> {
        let mut live = self.lock_live()?;
        self.live_buffer(&mut live, collection_id)
            .delete(entity_ids, op_id)
            .map_err(|source| MemError::Buffer {
                collection_id,
                source,
            })
    }

    /// Runs `operation` on the collection's live buffer, creating an empty one
    /// first if needed. The mutable-set lock is held for the whole call.
    pub fn with_buffer<T>(
        &self,
        collection_id: CollectionId,
        operation: impl FnOnce(&mut F::Buffer) -> T,
    ) -> Result<T, MemError> {
        let mut live = self.lock_live()?;
        Ok(operation(self.live_buffer(&mut live, collection_id)))
    }

    /// Moves the collection's live buffer to the sealed queue. Later writes to
    /// the collection start a fresh live buffer.
    pub fn seal_collection(&self, collection_id: CollectionId) {
        let mut live = recover(&self.live, "mutable set");
        if let Some(buffer) = live.remove(&collection_id) {
            recover(&self.sealed, "immutable set").push(buffer);
        }
    }

    pub fn seal_all(&self) {
        let mut live = recover(&self.live, "mutable set");
        let mut sealed = recover(&self.sealed, "immutable set");
        sealed.extend(mem::take(&mut *live).into_values());
    }

    /// Seals one collection, then serializes every sealed buffer.
    pub fn flush_collection(
        &self,
        collection_id: CollectionId,
    ) -> Result<BTreeSet<CollectionId>, MemError> {
        self.seal_collection(collection_id);
        self.flush_sealed()
    }

    /// Seals every live buffer, then serializes every sealed buffer. Returns
    /// the collections that were serialized.
    pub fn flush_all(&self) -> Result<BTreeSet<CollectionId>, MemError> {
        self.seal_all();
        self.flush_sealed()
    }

    /// Drops everything buffered for a collection, live or sealed.
    pub fn erase_collection(&self, collection_id: CollectionId) {
        let erased_live = recover(&self.live, "mutable set")
            .remove(&collection_id)
            .is_some();

        let erased_sealed = {
            let _serializing = recover(&self.serialization, "serialization");
            let mut sealed = recover(&self.sealed, "immutable set");
            let before = sealed.len();
            sealed.retain(|buffer| buffer.collection_id() != collection_id);
            before - sealed.len()
        };

        tracing::info!(
            collection_id,
            erased_live,
            erased_sealed,
            "erased collection buffers"
        );
    }

    /// Drops one partition from the collection's live buffer and from every
    /// sealed buffer, whichever collection it belongs to.
    pub fn erase_partition(&self, collection_id: CollectionId, partition_id: PartitionId) {
        if let Some(buffer) = recover(&self.live, "mutable set").get_mut(&collection_id) {
            buffer.erase_partition(partition_id);
        }

        let _serializing = recover(&self.serialization, "serialization");
        for buffer in recover(&self.sealed, "immutable set").iter_mut() {
            buffer.erase_partition(partition_id);
        }
    }

    pub fn current_mutable_memory(&self) -> usize {
        recover(&self.live, "mutable set")
            .values()
            .map(CollectionBuffer::memory_usage)
            .fold(0usize, usize::saturating_add)
    }

    pub fn current_immutable_memory(&self) -> usize {
        let _serializing = recover(&self.serialization, "serialization");
        recover(&self.sealed, "immutable set")
            .iter()
            .map(CollectionBuffer::memory_usage)
            .fold(0usize, usize::saturating_add)
    }

    pub fn current_total_memory(&self) -> usize {
        self.current_mutable_memory()
            .saturating_add(self.current_immutable_memory())
    }

    pub fn live_collections(&self) -> Vec<CollectionId> {
        recover(&self.live, "mutable set").keys().copied().collect()
    }

    /// Number of sealed buffers waiting for the next flush pass.
    pub fn pending_flush_len(&self) -> usize {
        recover(&self.sealed, "immutable set").len()
    }

    fn flush_sealed(&self) -> Result<BTreeSet<CollectionId>, MemError> {
        let batch = {
            let _live = self.lock_live()?;
            let mut sealed = self
                .sealed
                .lock()
                .map_err(|_| MemError::LockPoisoned("immutable set"))?;
            mem::take(&mut *sealed)
        };

        // The batch is already out of the sealed queue; it must reach serialize.
        let _serializing = recover(&self.serialization, "serialization");

        let total = batch.len();
        let mut flushed = Vec::with_capacity(total);
        for (index, mut buffer) in batch.into_iter().enumerate() {
            let collection_id = buffer.collection_id();
            tracing::debug!(collection_id, "flushing collection");
            if let Err(source) = buffer.serialize() {
                let dropped = total - index - 1;
                tracing::error!(collection_id, dropped, error = %source, "flush collection failed");
                return Err(MemError::Serialization {
                    collection_id,
                    flushed,
                    dropped,
                    source,
                });
            }
            tracing::debug!(collection_id, "flushed collection");
            flushed.push(collection_id);
        }

        Ok(flushed.into_iter().collect())
    }

    fn lock_live(&self) -> Result<MutexGuard<'_, BTreeMap<CollectionId, F::Buffer>>, MemError> {
        self.live
            .lock()
            .map_err(|_| MemError::LockPoisoned("mutable set"))
    }

    fn live_buffer<'a>(
        &self,
        live: &'a mut BTreeMap<CollectionId, F::Buffer>,
        collection_id: CollectionId,
    ) -> &'a mut F::Buffer {
        live.entry(collection_id)
            .or_insert_with(|| self.factory.create(collection_id))
    }
}

fn recover<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(lock = name, "recovering poisoned lock");
        poisoned.into_inner()
    })
}
