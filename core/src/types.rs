use std::collections::BTreeMap;

pub type CollectionId = i64;
pub type PartitionId = i64;
pub type EntityId = i64;
pub type OpId = u64;

/// Columnar batch of rows headed for a collection buffer.
///
/// Every field maps to the raw bytes of `row_count` values laid out back to
/// back. A `None` entry marks a field that was not provided in this batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataChunk {
    row_count: usize,
    fields: BTreeMap<String, Option<Vec<u8>>>,
}

impl DataChunk {
    pub fn new(row_count: usize) -> Self {
        Self {
            row_count,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert_field(name, Some(data));
        self
    }

    pub fn with_null_field(mut self, name: impl Into<String>) -> Self {
        self.insert_field(name, None);
        self
    }

    pub fn insert_field(&mut self, name: impl Into<String>, data: Option<Vec<u8>>) {
        let _ = self.fields.insert(name.into(), data);
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Looks up a field. The outer `None` means the field is missing from the
    /// chunk, the inner one means it was sent as null.
    pub fn field(&self, name: &str) -> Option<Option<&[u8]>> {
        self.fields.get(name).map(|data| data.as_deref())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&[u8]>)> + '_ {
        self.fields
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_deref()))
    }

    /// Total bytes held by the field payloads of this chunk.
    pub fn payload_bytes(&self) -> usize {
        self.fields
            .values()
            .flatten()
            .map(Vec::len)
            .fold(0usize, usize::saturating_add)
    }

    pub(crate) fn into_fields(self) -> BTreeMap<String, Option<Vec<u8>>> {
        self.fields
    }
}
