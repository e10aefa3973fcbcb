use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use membuf_core::{
    read_delete_log, read_segment, CollectionSchema, DataChunk, DataType, FieldSchema,
    JsonSegmentWriter, MemCollectionFactory, MemManager, SchemaRegistry, SegmentWriterOptions,
};

fn test_root(prefix: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("membuf_{prefix}_{timestamp}"))
}

fn schema(collection_id: i64) -> CollectionSchema {
    CollectionSchema::new(
        collection_id,
        vec![
            FieldSchema::new("id", DataType::Int64),
            FieldSchema::new("flag", DataType::Bool),
            FieldSchema::vector("vec", DataType::BinaryVector, 16),
        ],
    )
    .expect("schema must be valid")
}

fn chunk(first_id: i64, rows: usize) -> DataChunk {
    let ids = (first_id..first_id + rows as i64)
        .flat_map(i64::to_le_bytes)
        .collect();
    DataChunk::new(rows)
        .with_field("id", ids)
        .with_field("flag", vec![1; rows])
        .with_field("vec", vec![0xAB; rows * 2])
}

#[test]
fn inserts_and_deletes_reach_segment_files() {
    let root = test_root("ingest_flow");
    let registry = Arc::new(SchemaRegistry::new());
    let _ = registry.register(schema(1));
    let _ = registry.register(schema(2));

    let writer = Arc::new(JsonSegmentWriter::new(
        &root,
        SegmentWriterOptions { sync_on_write: false },
    ));
    let manager = MemManager::new(
        Arc::clone(&registry),
        MemCollectionFactory::new(writer.clone()),
    );

    manager
        .insert_entities(1, 100, chunk(0, 4), 1)
        .expect("insert must succeed");
    manager
        .insert_entities(1, 101, chunk(4, 2), 2)
        .expect("insert must succeed");
    manager
        .insert_entities(2, 100, chunk(0, 1), 3)
        .expect("insert must succeed");
    manager
        .delete_entities(1, &[1, 2], 4)
        .expect("delete must succeed");
    assert!(manager.current_total_memory() > 0);

    let flushed = manager.flush_all().expect("flush must succeed");
    assert_eq!(flushed, BTreeSet::from([1, 2]));
    assert_eq!(manager.current_total_memory(), 0);

    let files = writer.segment_files(1).expect("listing must succeed");
    assert_eq!(files.len(), 3);
    let mut rows = 0;
    let mut deletes = 0;
    for path in &files {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("file name must be utf-8");
        if name.starts_with("seg_") {
            let segment = read_segment(path).expect("segment must load");
            assert_eq!(segment.collection_id, 1);
            rows += segment.row_count();
        } else {
            deletes += read_delete_log(path)
                .expect("delete log must load")
                .entries
                .len();
        }
    }
    assert_eq!(rows, 6);
    assert_eq!(deletes, 2);

    let error = manager
        .insert_entities(3, 1, chunk(0, 1), 5)
        .expect_err("unknown collection must fail");
    assert!(error.is_not_found());

    manager.erase_collection(2);
    registry.drop_collection(2);
    assert!(manager
        .insert_entities(2, 1, chunk(0, 1), 6)
        .expect_err("dropped collection must fail")
        .is_not_found());

    fs::remove_dir_all(&root).expect("temp directory should be removable");
}
