//! # Presamples Library Root
//!
//! ## Role
//! Package, index and replay precomputed Monte-Carlo samples ("presamples")
//! for sparse matrix cells and named parameters.
//!
//! - Packages are write-once directories: a `datapackage.json` manifest plus
//!   hashed `.npy` sample files and JSON index/name side files.
//! - Each package has an `Indexer` choosing the sample column per iteration,
//!   seeded for reproducible studies or sequential.
//! - `PackagesDataLoader` merges many packages; package order decides which
//!   one wins for a given parameter name.
//!
//! ## Module Structure
//! ```text
//! presamples
//! ├── config      # Loader and package-creation options
//! ├── data        # Manifest model, index arrays, sample matrices, matrix owner traits
//! ├── error       # PresamplesError + Result
//! ├── io          # .npy sample files, hashing, package read/write
//! ├── model       # Indexer, sample reader, consolidation, parameter views
//! └── pipelines   # Multi-package loader, single package, campaigns
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let mut loader = PackagesDataLoader::new(&campaign, LoaderConfig::default())?;
//! loader.index_arrays(&model);
//! for _ in 0..iterations {
//!     loader.update_matrices(Some(&mut model), None)?;
//!     let rain = loader.parameters().value("rain")?;
//!     loader.advance();
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;

pub use config::{ColumnPolicy, LoaderConfig, PackageOptions};
pub use data::{
    ExchangeType, IndexArray, Lookup, Manifest, Matrix, MatrixLabels, MatrixOwner, MatrixStore,
    SampleMatrix, SeedSpec, SparseMatrix,
};
pub use error::{PresamplesError, Result};
pub use io::package::{
    append_package, convert_parameter_dict, create_package, split_inventory_presamples, validate,
    MatrixData, ParameterData,
};
pub use model::{collapse_matrix_indices, Indexer, ParameterView, ParametersMapping};
pub use pipelines::{Campaign, PackagesDataLoader, PresamplesPackage};
