//! # Data Module
//!
//! In-memory representations of presample packages. This is the core "Model" layer.
//!
//! ## Design Philosophy
//! - **Manifests are plain serde structs:** `datapackage.json` round-trips
//!   through `Manifest` without loss, so packages written elsewhere still load.
//! - **Index arrays are column-addressed:** fields are looked up by label
//!   (`"input"`, `"row"`, ...) because labels, not positions, are what the
//!   resource metadata names.
//! - **Matrix owners are a trait:** the loader writes through `MatrixOwner`
//!   and never needs to know the concrete matrix type.

pub mod indices;
pub mod manifest;
pub mod matrix;
pub mod samples;

// Re-export commonly used types
pub use indices::{FieldKind, IndexArray, IndexField};
pub use manifest::{
    FileRef, Manifest, MatrixLabels, MatrixResource, ParameterResource, Resource, SeedSpec,
};
pub use matrix::{Lookup, Matrix, MatrixOwner, MatrixStore, SparseMatrix};
pub use samples::SampleMatrix;

/// Placeholder written into `row`/`col` index fields until the owning matrix
/// translates identifiers. Max signed 32 bit integer, compatible with Windows.
pub const MAX_SIGNED_32BIT_INT: u64 = 2_147_483_647;

/// Destination matrix whose factorization must be dropped after writes
pub const TECHNOSPHERE_MATRIX: &str = "technosphere_matrix";
pub const BIOSPHERE_MATRIX: &str = "biosphere_matrix";
pub const CHARACTERIZATION_MATRIX: &str = "characterization_matrix";

pub const PRODUCT_DICT: &str = "_product_dict";
pub const ACTIVITY_DICT: &str = "_activity_dict";
pub const BIOSPHERE_DICT: &str = "_biosphere_dict";

/// Exchange type tag stored in the `type` field of technosphere indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExchangeType {
    Production,
    Technosphere,
    Biosphere,
    Substitution,
    Unknown,
}

impl ExchangeType {
    /// Field name carrying the tag in an index array
    pub const FIELD: &'static str = "type";

    /// Integer code as stored on disk
    pub fn code(self) -> u64 {
        match self {
            ExchangeType::Production => 0,
            ExchangeType::Technosphere => 1,
            ExchangeType::Biosphere => 2,
            ExchangeType::Substitution => 3,
            // -1 stored in a u1 field
            ExchangeType::Unknown => 255,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            0 => ExchangeType::Production,
            1 => ExchangeType::Technosphere,
            2 => ExchangeType::Biosphere,
            3 => ExchangeType::Substitution,
            _ => ExchangeType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeType::Production => "production",
            ExchangeType::Technosphere => "technosphere",
            ExchangeType::Biosphere => "biosphere",
            ExchangeType::Substitution => "substitution",
            ExchangeType::Unknown => "unknown",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "production" => Some(ExchangeType::Production),
            "technosphere" => Some(ExchangeType::Technosphere),
            "biosphere" => Some(ExchangeType::Biosphere),
            "substitution" => Some(ExchangeType::Substitution),
            "unknown" => Some(ExchangeType::Unknown),
            _ => None,
        }
    }
}

impl From<ExchangeType> for u64 {
    fn from(tag: ExchangeType) -> u64 {
        tag.code()
    }
}
