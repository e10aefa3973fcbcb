use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::segment::MemorySink;

fn chunk(rows: usize) -> DataChunk {
    DataChunk::new(rows).with_field("id", vec![0; rows * 8])
}

fn new_collection(sink: &Arc<MemorySink>) -> MemCollection {
    let sink: Arc<dyn SegmentSink> = sink.clone();
    MemCollection::new(5, sink)
}

/// Fails the first `failures` segment writes, then delegates to memory.
struct FlakySink {
    failures: AtomicUsize,
    inner: MemorySink,
}

impl SegmentSink for FlakySink {
    fn write_segment(&self, segment: &Segment) -> Result<(), BufferError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BufferError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write_segment(segment)
    }

    fn write_deletes(&self, log: &DeleteLog) -> Result<(), BufferError> {
        self.inner.write_deletes(log)
    }
}

#[test]
fn add_and_delete_track_memory() {
    let sink = Arc::new(MemorySink::new());
    let mut collection = new_collection(&sink);
    assert!(collection.is_empty());
    assert_eq!(collection.memory_usage(), 0);

    collection.add(1, chunk(3), 1).expect("add must succeed");
    collection.add(2, chunk(2), 2).expect("add must succeed");
    assert_eq!(collection.memory_usage(), 40);
    assert_eq!(collection.partition_ids(), vec![1, 2]);
    assert_eq!(collection.row_count(1), 3);
    assert_eq!(collection.row_count(7), 0);

    collection.delete(&[100, 101], 3).expect("delete must succeed");
    assert_eq!(collection.memory_usage(), 56);
    assert_eq!(collection.pending_deletes().len(), 2);
    assert_eq!(collection.collection_id(), 5);
}

#[test]
fn empty_chunk_is_accepted_without_growing_memory() {
    let sink = Arc::new(MemorySink::new());
    let mut collection = new_collection(&sink);
    collection
        .add(1, DataChunk::new(0), 1)
        .expect("add must succeed");
    assert!(collection.is_empty());
    assert_eq!(collection.memory_usage(), 0);
}

#[test]
fn rejects_operations_older_than_last_applied() {
    let sink = Arc::new(MemorySink::new());
    let mut collection = new_collection(&sink);
    collection.add(1, chunk(1), 10).expect("add must succeed");
    collection.add(1, chunk(1), 10).expect("same op id must succeed");

    let error = collection.add(1, chunk(1), 9).expect_err("must fail");
    assert!(matches!(error, BufferError::Rejected(_)));
    let error = collection.delete(&[1], 3).expect_err("must fail");
    assert!(matches!(error, BufferError::Rejected(_)));

    assert_eq!(collection.row_count(1), 2);
    assert!(collection.pending_deletes().is_empty());
}

#[test]
fn erase_partition_releases_memory_and_ignores_unknown_partitions() {
    let sink = Arc::new(MemorySink::new());
    let mut collection = new_collection(&sink);
    collection.add(1, chunk(2), 1).expect("add must succeed");
    collection.add(2, chunk(1), 2).expect("add must succeed");

    collection.erase_partition(42);
    assert_eq!(collection.memory_usage(), 24);

    collection.erase_partition(1);
    assert_eq!(collection.memory_usage(), 8);
    assert_eq!(collection.partition_ids(), vec![2]);
}

#[test]
fn serialize_writes_one_segment_per_partition_and_clears() {
    let sink = Arc::new(MemorySink::new());
    let mut collection = new_collection(&sink);
    collection.add(1, chunk(2), 1).expect("add must succeed");
    collection.add(2, chunk(1), 2).expect("add must succeed");
    collection.add(1, chunk(4), 3).expect("add must succeed");
    collection.delete(&[7], 4).expect("delete must succeed");

    collection.serialize().expect("serialize must succeed");

    let segments = sink.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].partition_id, 1);
    assert_eq!(segments[0].row_count(), 6);
    assert_eq!(segments[0].max_op_id(), Some(3));
    assert_eq!(segments[1].partition_id, 2);
    assert_eq!(
        sink.delete_logs(),
        vec![DeleteLog {
            collection_id: 5,
            entries: vec![DeleteEntry {
                entity_id: 7,
                op_id: 4
            }],
        }]
    );

    assert!(collection.is_empty());
    assert_eq!(collection.memory_usage(), 0);

    collection.serialize().expect("empty serialize must succeed");
    assert_eq!(sink.segments().len(), 2);
}

#[test]
fn failed_serialize_keeps_unwritten_partitions_for_retry() {
    let sink = Arc::new(FlakySink {
        failures: AtomicUsize::new(1),
        inner: MemorySink::new(),
    });
    let mut collection = MemCollection::new(5, sink.clone());
    collection.add(1, chunk(1), 1).expect("add must succeed");
    collection.add(2, chunk(2), 2).expect("add must succeed");

    let error = collection.serialize().expect_err("must fail");
    assert!(matches!(error, BufferError::Io(_)));
    assert_eq!(collection.partition_ids(), vec![1, 2]);
    assert_eq!(collection.memory_usage(), 24);

    collection.serialize().expect("retry must succeed");
    assert_eq!(sink.inner.rows_for(5), 3);
    assert_eq!(sink.inner.segments().len(), 2);
    assert!(collection.is_empty());
}

#[test]
fn factory_binds_buffers_to_shared_sink() {
    let sink = Arc::new(MemorySink::new());
    let factory = MemCollectionFactory::new(sink.clone());

    let mut first = factory.create(1);
    let mut second = factory.create(2);
    first.add(1, chunk(1), 1).expect("add must succeed");
    second.add(1, chunk(2), 1).expect("add must succeed");
    first.serialize().expect("serialize must succeed");
    second.serialize().expect("serialize must succeed");

    assert_eq!(sink.rows_for(1), 1);
    assert_eq!(sink.rows_for(2), 2);
}
