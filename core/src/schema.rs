use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CollectionId;

/// Type parameter key holding a vector field's dimension.
pub const DIMENSION_PARAM: &str = "dim";

pub type FieldParams = Map<String, Value>;

/// Storage type of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Json,
    FloatVector,
    BinaryVector,
}

impl DataType {
    pub fn is_vector(self) -> bool {
        matches!(self, Self::FloatVector | Self::BinaryVector)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Json => "json",
            Self::FloatVector => "float_vector",
            Self::BinaryVector => "binary_vector",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub params: FieldParams,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            params: FieldParams::new(),
        }
    }

    pub fn vector(name: impl Into<String>, data_type: DataType, dimension: u64) -> Self {
        let mut field = Self::new(name, data_type);
        let _ = field
            .params
            .insert(DIMENSION_PARAM.to_string(), Value::from(dimension));
        field
    }

    /// Returns the declared dimension when `dim` holds a non-negative integer.
    pub fn dimension(&self) -> Option<u64> {
        self.params.get(DIMENSION_PARAM).and_then(Value::as_u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    EmptyFieldName,
    DuplicateField(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyFieldName => write!(f, "field name must not be empty"),
            Self::DuplicateField(name) => write!(f, "duplicate field '{name}'"),
        }
    }
}

impl Error for SchemaError {}

/// Resolved field list of one collection, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    collection_id: CollectionId,
    fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    pub fn new(
        collection_id: CollectionId,
        fields: Vec<FieldSchema>,
    ) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName);
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self {
            collection_id,
            fields,
        })
    }

    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|field| field.name.as_str())
    }
}

/// Source of the current schema snapshot for a collection.
pub trait SchemaResolver: Send + Sync {
    fn resolve(&self, collection_id: CollectionId) -> Option<Arc<CollectionSchema>>;
}

impl<T: SchemaResolver + ?Sized> SchemaResolver for Arc<T> {
    fn resolve(&self, collection_id: CollectionId) -> Option<Arc<CollectionSchema>> {
        (**self).resolve(collection_id)
    }
}

/// In-memory schema catalog. Registering a collection again replaces its
/// snapshot; callers resolving afterwards see the new definition.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<BTreeMap<CollectionId, Arc<CollectionSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, schema: CollectionSchema) -> Option<Arc<CollectionSchema>> {
        let mut schemas = self
            .schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        schemas.insert(schema.collection_id(), Arc::new(schema))
    }

    pub fn drop_collection(&self, collection_id: CollectionId) -> bool {
        let mut schemas = self
            .schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        schemas.remove(&collection_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaResolver for SchemaRegistry {
    fn resolve(&self, collection_id: CollectionId) -> Option<Arc<CollectionSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&collection_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests;
