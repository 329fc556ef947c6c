//! # Package Manifest
//!
//! ## Role
//! Serde model of `datapackage.json`, the one metadata file in every package.
//!
//! ## Layout
//! ```json
//! {
//!   "id": "3f2c...", "name": "human readable", "profile": "data-package",
//!   "seed": 42 | "sequential" | null, "ncols": 100 | null,
//!   "resources": [
//!     {"type": "technosphere", "matrix": "technosphere_matrix",
//!      "samples": {"filepath": "...samples.npy", "hash": "...", "shape": [3, 100], "dtype": "<f8"},
//!      "indices": {"filepath": "...indices.json", "hash": "..."},
//!      "row from label": "input", "row to label": "row", "row dict": "_product_dict",
//!      "col from label": "output", "col to label": "col", "col dict": "_activity_dict"},
//!     {"label": "winter",
//!      "samples": {...}, "names": {"filepath": "...names.json", "hash": "..."}}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PresamplesError, Result};

pub const MANIFEST_FILENAME: &str = "datapackage.json";
pub const PACKAGE_PROFILE: &str = "data-package";
pub const RESOURCE_PROFILE: &str = "data-resource";

/// Seed stored in a manifest (`null` is represented by `Option::None`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum SeedSpec {
    /// Seeded random column indices
    Value(u64),
    /// Columns in order, wrapping around after `ncols`
    Sequential,
}

impl TryFrom<Value> for SeedSpec {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(SeedSpec::Value)
                .ok_or_else(|| format!("seed must be a non-negative integer, got {}", n)),
            Value::String(s) if s == "sequential" => Ok(SeedSpec::Sequential),
            other => Err(format!(
                "seed must be an integer or \"sequential\", got {}",
                other
            )),
        }
    }
}

impl From<SeedSpec> for Value {
    fn from(seed: SeedSpec) -> Value {
        match seed {
            SeedSpec::Value(v) => Value::from(v),
            SeedSpec::Sequential => Value::from("sequential"),
        }
    }
}

/// Reference to one data file inside the package directory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    /// Path relative to the package directory
    pub filepath: String,
    /// Hex SHA-256 of the raw file bytes
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediatype: Option<String>,
}

/// Destination matrix and lookup metadata of a matrix resource.
///
/// Two resources can only be consolidated when these are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixLabels {
    pub matrix: String,
    #[serde(rename = "row from label")]
    pub row_from_label: String,
    #[serde(rename = "row to label")]
    pub row_to_label: String,
    #[serde(rename = "row dict")]
    pub row_dict: String,
    #[serde(rename = "col from label", default, skip_serializing_if = "Option::is_none")]
    pub col_from_label: Option<String>,
    #[serde(rename = "col to label", default, skip_serializing_if = "Option::is_none")]
    pub col_to_label: Option<String>,
    #[serde(rename = "col dict", default, skip_serializing_if = "Option::is_none")]
    pub col_dict: Option<String>,
}

impl MatrixLabels {
    /// Row-only labels (diagonal resources such as characterization factors)
    pub fn rows(matrix: &str, from: &str, to: &str, dict: &str) -> Self {
        Self {
            matrix: matrix.to_string(),
            row_from_label: from.to_string(),
            row_to_label: to.to_string(),
            row_dict: dict.to_string(),
            col_from_label: None,
            col_to_label: None,
            col_dict: None,
        }
    }

    /// Add column labels
    pub fn with_cols(mut self, from: &str, to: &str, dict: &str) -> Self {
        self.col_from_label = Some(from.to_string());
        self.col_to_label = Some(to.to_string());
        self.col_dict = Some(dict.to_string());
        self
    }

    /// `(from label, to label, dict)` for columns, if declared
    pub fn col_labels(&self) -> Option<(&str, &str, &str)> {
        match (&self.col_from_label, &self.col_to_label, &self.col_dict) {
            (Some(from), Some(to), Some(dict)) => Some((from, to, dict)),
            _ => None,
        }
    }

    pub fn has_cols(&self) -> bool {
        self.col_dict.is_some()
    }

    /// All `* label` values (index fields the metadata refers to)
    pub fn label_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.row_from_label.as_str(), self.row_to_label.as_str()];
        if let Some(from) = &self.col_from_label {
            fields.push(from);
        }
        if let Some(to) = &self.col_to_label {
            fields.push(to);
        }
        fields
    }

    /// Column labels are all-or-nothing once a column dictionary is given
    pub fn validate(&self) -> Result<()> {
        let given = [&self.col_from_label, &self.col_to_label, &self.col_dict]
            .iter()
            .filter(|o| o.is_some())
            .count();
        if given != 0 && given != 3 {
            return Err(PresamplesError::invalid_metadata(
                "Must give each of ('col from label', 'col to label', 'col dict')",
            ));
        }
        Ok(())
    }
}

/// Samples destined for cells of a named matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixResource {
    /// Resource kind (`technosphere`, `biosphere`, `cf`, or custom)
    #[serde(rename = "type")]
    pub kind: String,
    pub samples: FileRef,
    pub indices: FileRef,
    #[serde(flatten)]
    pub labels: MatrixLabels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Samples for named scalar parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterResource {
    pub label: String,
    pub samples: FileRef,
    pub names: FileRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resource {
    Matrix(MatrixResource),
    Parameter(ParameterResource),
}

impl Resource {
    pub fn samples(&self) -> &FileRef {
        match self {
            Resource::Matrix(r) => &r.samples,
            Resource::Parameter(r) => &r.samples,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Resource::Matrix(r) => r.index,
            Resource::Parameter(r) => r.index,
        }
    }

    /// Every file this resource references, samples first
    pub fn files(&self) -> [&FileRef; 2] {
        match self {
            Resource::Matrix(r) => [&r.samples, &r.indices],
            Resource::Parameter(r) => [&r.samples, &r.names],
        }
    }

    pub fn as_matrix(&self) -> Option<&MatrixResource> {
        match self {
            Resource::Matrix(r) => Some(r),
            Resource::Parameter(_) => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&ParameterResource> {
        match self {
            Resource::Parameter(r) => Some(r),
            Resource::Matrix(_) => None,
        }
    }
}

/// Contents of `datapackage.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub name: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub seed: Option<SeedSpec>,
    #[serde(default)]
    pub ncols: Option<usize>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

fn default_profile() -> String {
    PACKAGE_PROFILE.to_string()
}

impl Manifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, seed: Option<SeedSpec>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            profile: default_profile(),
            seed,
            ncols: None,
            resources: Vec::new(),
        }
    }

    pub fn matrix_resources(&self) -> impl Iterator<Item = &MatrixResource> {
        self.resources.iter().filter_map(Resource::as_matrix)
    }

    pub fn parameter_resources(&self) -> impl Iterator<Item = &ParameterResource> {
        self.resources.iter().filter_map(Resource::as_parameter)
    }

    /// Next free resource index (resource indices need not be consecutive)
    pub fn next_index(&self) -> usize {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| r.index().unwrap_or(i))
            .max()
            .map_or(0, |max| max + 1)
    }
}
