//! # Index Arrays
//!
//! ## Role
//! Row records identifying the destination cell of each sample row.
//!
//! Each record holds *unmapped* endpoint identifiers (e.g. `input`, `output`)
//! plus placeholder `row`/`col` fields that are filled in once the owning
//! matrix provides its lookup dictionaries. Every field is an unsigned integer
//! of a declared width; the ordered `(name, width)` list is the array's dtype.
//!
//! ## Storage
//! Flat row-major `Vec<u64>`, one stride per record. Side files store the same
//! thing as JSON: `{"dtype": [{"name": "input", "kind": "u4"}, ...], "rows": [[...], ...]}`.

use serde::{Deserialize, Serialize};

use crate::error::{PresamplesError, Result};

/// Declared width of one index field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "u1")]
    U1,
    #[serde(rename = "u2")]
    U2,
    #[serde(rename = "u4")]
    U4,
    #[serde(rename = "u8")]
    U8,
}

impl FieldKind {
    /// Largest value representable in this field
    pub fn max_value(self) -> u64 {
        match self {
            FieldKind::U1 => u8::MAX as u64,
            FieldKind::U2 => u16::MAX as u64,
            FieldKind::U4 => u32::MAX as u64,
            FieldKind::U8 => u64::MAX,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub kind: FieldKind,
}

impl IndexField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawIndexArray {
    dtype: Vec<IndexField>,
    rows: Vec<Vec<u64>>,
}

/// Column-addressed array of index records
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexArray", into = "RawIndexArray")]
pub struct IndexArray {
    fields: Vec<IndexField>,
    data: Vec<u64>,
}

impl TryFrom<RawIndexArray> for IndexArray {
    type Error = PresamplesError;

    fn try_from(raw: RawIndexArray) -> Result<Self> {
        IndexArray::from_rows(raw.dtype, raw.rows)
    }
}

impl From<IndexArray> for RawIndexArray {
    fn from(array: IndexArray) -> Self {
        let rows = array.records().map(<[u64]>::to_vec).collect();
        RawIndexArray {
            dtype: array.fields,
            rows,
        }
    }
}

impl IndexArray {
    /// Create an empty array with the given dtype
    pub fn new(fields: Vec<IndexField>) -> Self {
        Self {
            fields,
            data: Vec::new(),
        }
    }

    /// Build from records, checking record widths and field ranges
    pub fn from_rows(fields: Vec<IndexField>, rows: Vec<Vec<u64>>) -> Result<Self> {
        let mut array = Self::new(fields);
        array.data.reserve(rows.len() * array.fields.len());
        for row in &rows {
            array.push(row)?;
        }
        Ok(array)
    }

    /// Append one record
    pub fn push(&mut self, record: &[u64]) -> Result<()> {
        if record.len() != self.fields.len() {
            return Err(PresamplesError::shape_mismatch(format!(
                "index record has {} values, dtype has {} fields",
                record.len(),
                self.fields.len()
            )));
        }
        for (value, field) in record.iter().zip(&self.fields) {
            if *value > field.kind.max_value() {
                return Err(PresamplesError::invalid_metadata(format!(
                    "value {} does not fit field '{}' ({:?})",
                    value, field.name, field.kind
                )));
            }
        }
        self.data.extend_from_slice(record);
        Ok(())
    }

    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        if self.fields.is_empty() {
            0
        } else {
            self.data.len() / self.fields.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of a field by name
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Same field names, order and widths
    pub fn same_dtype(&self, other: &IndexArray) -> bool {
        self.fields == other.fields
    }

    #[inline]
    pub fn get(&self, row: usize, field: usize) -> u64 {
        self.data[row * self.fields.len() + field]
    }

    #[inline]
    pub fn set(&mut self, row: usize, field: usize, value: u64) {
        let stride = self.fields.len();
        self.data[row * stride + field] = value;
    }

    pub fn record(&self, row: usize) -> &[u64] {
        let stride = self.fields.len();
        &self.data[row * stride..(row + 1) * stride]
    }

    pub fn records(&self) -> impl Iterator<Item = &[u64]> {
        // chunks_exact panics on a zero stride
        self.data.chunks_exact(self.fields.len().max(1))
    }

    /// Copy of one field across all records
    pub fn column(&self, name: &str) -> Option<Vec<u64>> {
        let pos = self.field_position(name)?;
        Some((0..self.len()).map(|row| self.get(row, pos)).collect())
    }

    /// Concatenate arrays sharing one dtype, preserving order
    pub fn concat(parts: &[&IndexArray]) -> Option<IndexArray> {
        let first = parts.first()?;
        if parts.iter().any(|p| !p.same_dtype(first)) {
            return None;
        }
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.data.len()).sum());
        for part in parts {
            data.extend_from_slice(&part.data);
        }
        Some(IndexArray {
            fields: first.fields.clone(),
            data,
        })
    }

    /// New array holding the given records in the given order
    pub fn select(&self, rows: &[usize]) -> IndexArray {
        let mut data = Vec::with_capacity(rows.len() * self.fields.len());
        for &row in rows {
            data.extend_from_slice(self.record(row));
        }
        IndexArray {
            fields: self.fields.clone(),
            data,
        }
    }
}
