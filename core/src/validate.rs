use std::error::Error;
use std::fmt;
use std::mem::size_of;

use crate::schema::{CollectionSchema, DataType, FieldSchema};
use crate::DataChunk;

/// Bytes one row occupies in a field's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSize {
    Fixed(u64),
    /// Variable-width types are not size checked.
    Unchecked,
}

/// Error type for chunk validation. All variants are caller input errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// A schema field has no entry in the chunk.
    MissingField { field: String },
    /// A field payload does not hold exactly `row_count` rows.
    SizeMismatch {
        field: String,
        expected: Option<u64>,
        got: usize,
    },
    /// A vector field has no integer `dim` type parameter.
    MissingDimension { field: String },
}

impl ChunkError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field }
            | Self::SizeMismatch { field, .. }
            | Self::MissingDimension { field } => field,
        }
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missed chunk field: {field}"),
            Self::SizeMismatch {
                field,
                expected: Some(expected),
                got,
            } => write!(
                f,
                "illegal data size for chunk field {field}: expected {expected} bytes, got {got}"
            ),
            Self::SizeMismatch {
                field,
                expected: None,
                got,
            } => write!(
                f,
                "illegal data size for chunk field {field}: expected size overflows, got {got}"
            ),
            Self::MissingDimension { field } => {
                write!(f, "vector field {field} params must contain a dimension")
            }
        }
    }
}

impl Error for ChunkError {}

/// Computes the row stride for a field from its declared type.
///
/// Binary vectors pack eight dimensions per byte; the division truncates.
pub fn row_size(field: &FieldSchema) -> Result<RowSize, ChunkError> {
    let fixed = match field.data_type {
        DataType::Bool => size_of::<bool>(),
        DataType::Int8 => size_of::<i8>(),
        DataType::Int16 => size_of::<i16>(),
        DataType::Int32 => size_of::<i32>(),
        DataType::Int64 => size_of::<i64>(),
        DataType::Float => size_of::<f32>(),
        DataType::Double => size_of::<f64>(),
        // A saturated stride can never match a non-empty payload.
        DataType::FloatVector => {
            return Ok(RowSize::Fixed(
                vector_dimension(field)?.saturating_mul(size_of::<f32>() as u64),
            ))
        }
        DataType::BinaryVector => return Ok(RowSize::Fixed(vector_dimension(field)? / 8)),
        DataType::String | DataType::Json => return Ok(RowSize::Unchecked),
    };
    Ok(RowSize::Fixed(fixed as u64))
}

/// Checks that `chunk` carries every schema field with a payload of exactly
/// `row_count` rows. Null payloads are skipped; extra chunk fields are ignored.
pub fn validate_chunk(schema: &CollectionSchema, chunk: &DataChunk) -> Result<(), ChunkError> {
    for field in schema.fields() {
        let Some(data) = chunk.field(&field.name) else {
            return Err(ChunkError::MissingField {
                field: field.name.clone(),
            });
        };
        let Some(data) = data else {
            continue;
        };

        let RowSize::Fixed(stride) = row_size(field)? else {
            continue;
        };
        let expected = u64::try_from(chunk.row_count())
            .ok()
            .and_then(|rows| rows.checked_mul(stride));
        let matches = expected.is_some_and(|expected| u64::try_from(data.len()) == Ok(expected));
        if !matches {
            return Err(ChunkError::SizeMismatch {
                field: field.name.clone(),
                expected,
                got: data.len(),
            });
        }
    }

    Ok(())
}

fn vector_dimension(field: &FieldSchema) -> Result<u64, ChunkError> {
    field.dimension().ok_or_else(|| ChunkError::MissingDimension {
        field: field.name.clone(),
    })
}
