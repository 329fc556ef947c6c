//! # Model Module
//!
//! The algorithms behind loading, independent of package directories where
//! possible.
//!
//! - `indexer`: reproducible choice of the Monte-Carlo column per iteration
//! - `sample_arrays`: one column read across a stack of mapped sample files
//! - `consolidate`: same-typed matrix resources merged, duplicate cells collapsed
//! - `parameters`: per-package and cross-package named parameter views

pub mod consolidate;
pub mod indexer;
pub mod parameters;
pub mod sample_arrays;

pub use consolidate::{
    collapse_matrix_indices, fix_supply_use, CollapsePlan, ConsolidatedGroup, GroupMember,
};
pub use indexer::Indexer;
pub use parameters::{
    ColumnSource, ConsolidatedParameters, IndexedParametersMapping, ParameterView,
    ParametersMapping,
};
pub use sample_arrays::SampleArrays;
