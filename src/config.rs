//! # Configuration Logic
//!
//! ## Role
//! Options for loading and for creating packages.
//!
//! - `LoaderConfig`: seed override applied to every package, and how the sample
//!   reader treats a column index past an array's width.
//! - `PackageOptions`: identity, location and seed of a new package.
//!
//! Both deserialize with `serde`, so a host can keep them in a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::SeedSpec;
use crate::error::{PresamplesError, Result};

/// Column access outside `0..ncols` of a sample array
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPolicy {
    /// Out-of-range columns are an error
    #[default]
    Strict,
    /// Column taken modulo each array's own width
    Wrap,
}

impl ColumnPolicy {
    /// Resolve `column` against an array `ncols` wide
    #[inline]
    pub fn resolve(self, column: usize, ncols: usize) -> Option<usize> {
        match self {
            ColumnPolicy::Strict => (column < ncols).then_some(column),
            ColumnPolicy::Wrap => (ncols > 0).then(|| column % ncols),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Overrides every package's manifest seed when set
    pub seed: Option<SeedSpec>,
    pub column_policy: ColumnPolicy,
}

impl LoaderConfig {
    pub fn with_seed(mut self, seed: SeedSpec) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_column_policy(mut self, policy: ColumnPolicy) -> Self {
        self.column_policy = policy;
        self
    }

    /// Parse from JSON, e.g. `{"seed": 42, "column_policy": "wrap"}`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageOptions {
    /// Package id; a random UUID when unset
    pub id: Option<String>,
    /// Human-readable name; the id when unset
    pub name: Option<String>,
    /// Parent directory of the package; the current directory when unset
    pub dirpath: Option<PathBuf>,
    /// Replace an existing package directory with the same id
    pub overwrite: bool,
    pub seed: Option<SeedSpec>,
}

impl PackageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dirpath(mut self, dirpath: impl AsRef<Path>) -> Self {
        self.dirpath = Some(dirpath.as_ref().to_path_buf());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn seed(mut self, seed: SeedSpec) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the parent directory and id before anything is written
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.dirpath {
            if !dir.is_dir() {
                return Err(PresamplesError::config(format!(
                    "`dirpath` must be a directory: {}",
                    dir.display()
                )));
            }
        }
        if let Some(id) = &self.id {
            if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
                return Err(PresamplesError::config(format!(
                    "package id must be a plain directory name, got '{}'",
                    id
                )));
            }
        }
        Ok(())
    }
}
