//! # I/O Module
//!
//! Everything that touches the filesystem: memory-mapped `.npy` sample files,
//! content hashes, and package directories (manifest, side files, create/append).

pub mod hashing;
pub mod npy;
pub mod package;

pub use npy::{SampleArray, SampleDtype};
pub use package::{
    append_package, convert_parameter_dict, create_package, read_manifest,
    split_inventory_presamples, validate, MatrixData, ParameterData,
};
