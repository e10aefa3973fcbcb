use serde_json::json;

use super::*;

#[test]
fn rejects_duplicate_and_empty_field_names() {
    let error = CollectionSchema::new(
        1,
        vec![
            FieldSchema::new("id", DataType::Int64),
            FieldSchema::new("id", DataType::Int32),
        ],
    )
    .expect_err("must fail");
    assert_eq!(error, SchemaError::DuplicateField("id".to_string()));

    let error = CollectionSchema::new(1, vec![FieldSchema::new("  ", DataType::Bool)])
        .expect_err("must fail");
    assert_eq!(error, SchemaError::EmptyFieldName);
}

#[test]
fn dimension_reads_integer_param() {
    let field = FieldSchema::vector("vec", DataType::FloatVector, 16);
    assert_eq!(field.dimension(), Some(16));

    let mut field = FieldSchema::new("vec", DataType::FloatVector);
    assert_eq!(field.dimension(), None);

    let _ = field.params.insert(DIMENSION_PARAM.to_string(), json!(0));
    assert_eq!(field.dimension(), Some(0));

    let _ = field.params.insert(DIMENSION_PARAM.to_string(), json!(2.5));
    assert_eq!(field.dimension(), None);

    let _ = field.params.insert(DIMENSION_PARAM.to_string(), json!(-4));
    assert_eq!(field.dimension(), None);

    let _ = field.params.insert(DIMENSION_PARAM.to_string(), json!("8"));
    assert_eq!(field.dimension(), None);
}

#[test]
fn field_schema_reads_from_json() {
    let field: FieldSchema = serde_json::from_value(json!({
        "name": "embedding",
        "data_type": "binary_vector",
        "params": {"dim": 64}
    }))
    .expect("field must deserialize");

    assert_eq!(field.data_type, DataType::BinaryVector);
    assert!(field.data_type.is_vector());
    assert_eq!(field.dimension(), Some(64));
}

#[test]
fn registry_resolves_latest_snapshot() {
    let registry = SchemaRegistry::new();
    assert!(registry.resolve(7).is_none());

    let first = CollectionSchema::new(7, vec![FieldSchema::new("id", DataType::Int64)])
        .expect("schema must be valid");
    assert!(registry.register(first).is_none());

    let second = CollectionSchema::new(
        7,
        vec![
            FieldSchema::new("id", DataType::Int64),
            FieldSchema::new("score", DataType::Float),
        ],
    )
    .expect("schema must be valid");
    let previous = registry.register(second).expect("previous snapshot expected");
    assert_eq!(previous.fields().len(), 1);

    let resolved = registry.resolve(7).expect("schema must resolve");
    assert_eq!(
        resolved.field_names().collect::<Vec<_>>(),
        vec!["id", "score"]
    );
    assert_eq!(
        resolved.field("score").map(|field| field.data_type),
        Some(DataType::Float)
    );
    assert!(resolved.field("missing").is_none());
    assert_eq!(registry.len(), 1);

    assert!(registry.drop_collection(7));
    assert!(!registry.drop_collection(7));
    assert!(registry.is_empty());
}
