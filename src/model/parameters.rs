//! # Named Parameters
//!
//! ## Role
//! Read-only access to named parameter samples.
//!
//! - `ParametersMapping`: every parameter resource of one package. Name ->
//!   full sample row. Names are unique within a package.
//! - `IndexedParametersMapping`: the same, read at one column, fixed or taken
//!   live from an `Indexer`.
//! - `ConsolidatedParameters` / `ParameterView`: names across packages. The
//!   last package (in load order) defining a name wins. Overridden packages
//!   are kept in `replaced` as `(path, package name)`.
//!
//! The consolidated structure is computed once. Values are read through
//! indexer references, so advancing a loader changes values without a rebuild.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ColumnPolicy;
use crate::data::ParameterResource;
use crate::error::{PresamplesError, Result};
use crate::io::npy::SampleArray;
use crate::io::package::read_names;
use crate::model::indexer::Indexer;
use crate::model::sample_arrays::SampleArrays;

/// Parameter names and samples of one package
#[derive(Debug)]
pub struct ParametersMapping {
    path: PathBuf,
    package_name: String,
    names: Vec<String>,
    /// name -> (resource position, row within resource)
    mapping: HashMap<String, (usize, usize)>,
    samples: SampleArrays,
}

impl ParametersMapping {
    /// Load the given parameter resources of the package at `path`
    pub fn load<'a>(
        path: &Path,
        package_name: &str,
        resources: impl IntoIterator<Item = &'a ParameterResource>,
        policy: ColumnPolicy,
    ) -> Result<Self> {
        let mut parts = Vec::new();
        for resource in resources {
            let names = read_names(&path.join(&resource.names.filepath))?;
            let samples = SampleArray::open(&path.join(&resource.samples.filepath))?;
            parts.push((names, samples));
        }
        Self::from_parts(path, package_name, parts, policy)
    }

    /// Build from `(names, samples)` pairs, one per resource
    pub fn from_parts(
        path: &Path,
        package_name: &str,
        parts: Vec<(Vec<String>, SampleArray)>,
        policy: ColumnPolicy,
    ) -> Result<Self> {
        let mut names = Vec::new();
        let mut mapping = HashMap::new();
        let mut duplicates = Vec::new();
        let mut arrays = Vec::with_capacity(parts.len());

        for (i, (resource_names, samples)) in parts.into_iter().enumerate() {
            if samples.n_rows() != resource_names.len() {
                return Err(PresamplesError::shape_mismatch(format!(
                    "{} has {} sample rows but {} names",
                    samples.path().display(),
                    samples.n_rows(),
                    resource_names.len()
                )));
            }
            for (j, name) in resource_names.into_iter().enumerate() {
                if mapping.insert(name.clone(), (i, j)).is_some() {
                    duplicates.push(name);
                } else {
                    names.push(name);
                }
            }
            arrays.push(samples);
        }
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(PresamplesError::NameConflict { names: duplicates });
        }

        Ok(Self {
            path: path.to_path_buf(),
            package_name: package_name.to_string(),
            names,
            mapping,
            samples: SampleArrays::new(arrays, policy),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Names in resource order; also the row order of `samples()`
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mapping.contains_key(name)
    }

    /// `(resource position, row within resource)`
    pub fn location(&self, name: &str) -> Option<(usize, usize)> {
        self.mapping.get(name).copied()
    }

    pub fn samples(&self) -> &SampleArrays {
        &self.samples
    }

    /// Every sample of one parameter
    pub fn get(&self, name: &str) -> Option<Vec<f64>> {
        let (i, j) = self.location(name)?;
        Some(self.samples.arrays()[i].row(j))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec<f64>)> + '_ {
        self.names.iter().filter_map(|name| {
            let row = self.get(name)?;
            Some((name.as_str(), row))
        })
    }

    /// `(package path, package name, parameter name)` for every parameter
    pub fn ids(&self) -> Vec<(&Path, &str, &str)> {
        self.names
            .iter()
            .map(|name| (self.path.as_path(), self.package_name.as_str(), name.as_str()))
            .collect()
    }

    /// Read at one column
    pub fn indexed<'a>(&'a self, column: ColumnSource<'a>) -> IndexedParametersMapping<'a> {
        IndexedParametersMapping {
            mapping: self,
            column,
        }
    }

    fn stacked_row(&self, name: &str) -> Option<usize> {
        // names are stored in stacked row order
        let (i, j) = self.location(name)?;
        let offset: usize = self.samples.arrays()[..i].iter().map(SampleArray::n_rows).sum();
        Some(offset + j)
    }
}

/// Column used by an `IndexedParametersMapping`
#[derive(Clone, Copy, Debug)]
pub enum ColumnSource<'a> {
    Fixed(usize),
    /// The indexer's current index, looked up on every read
    Indexer(&'a Indexer),
}

impl ColumnSource<'_> {
    pub fn column(&self) -> usize {
        match self {
            ColumnSource::Fixed(column) => *column,
            ColumnSource::Indexer(indexer) => indexer.index().unwrap_or(0),
        }
    }
}

/// A `ParametersMapping` read at one column
#[derive(Clone, Copy, Debug)]
pub struct IndexedParametersMapping<'a> {
    mapping: &'a ParametersMapping,
    column: ColumnSource<'a>,
}

impl<'a> IndexedParametersMapping<'a> {
    pub fn mapping(&self) -> &'a ParametersMapping {
        self.mapping
    }

    pub fn column(&self) -> usize {
        self.column.column()
    }

    /// Current value of one parameter, `None` for an unknown name
    pub fn get(&self, name: &str) -> Result<Option<f64>> {
        match self.mapping.stacked_row(name) {
            Some(row) => self.mapping.samples.value(row, self.column()),
            None => Ok(None),
        }
    }

    /// Current values of all parameters, in `names()` order
    pub fn array(&self) -> Result<Vec<f64>> {
        self.mapping.samples.sample(self.column())
    }

    pub fn names(&self) -> &'a [String] {
        self.mapping.names()
    }
}

/// Winning package per parameter name across loaded packages
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsolidatedParameters {
    names: Vec<String>,
    winners: HashMap<String, usize>,
    replaced: HashMap<String, Vec<(PathBuf, String)>>,
}

impl ConsolidatedParameters {
    /// Scan groups in order; later groups override earlier ones
    pub fn build<'a>(groups: impl IntoIterator<Item = &'a ParametersMapping>) -> Self {
        let groups: Vec<&ParametersMapping> = groups.into_iter().collect();
        let mut out = Self::default();
        for (i, group) in groups.iter().enumerate() {
            for name in group.names() {
                match out.winners.insert(name.clone(), i) {
                    Some(previous) => {
                        let loser = groups[previous];
                        out.replaced.entry(name.clone()).or_default().push((
                            loser.path().to_path_buf(),
                            loser.package_name().to_string(),
                        ));
                    }
                    None => out.names.push(name.clone()),
                }
            }
        }
        debug!(
            names = out.names.len(),
            replaced = out.replaced.len(),
            "Consolidated parameters"
        );
        out
    }

    /// Names in first-definition order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of the winning group for `name`
    pub fn source_of(&self, name: &str) -> Option<usize> {
        self.winners.get(name).copied()
    }

    /// Overridden definitions per name, oldest first
    pub fn replaced(&self) -> &HashMap<String, Vec<(PathBuf, String)>> {
        &self.replaced
    }

    /// Bind to the groups it was built from, each read at its own column
    pub fn view<'a>(&'a self, groups: Vec<IndexedParametersMapping<'a>>) -> ParameterView<'a> {
        ParameterView {
            structure: self,
            groups,
        }
    }
}

/// Live, merged parameter values across packages
#[derive(Clone, Debug)]
pub struct ParameterView<'a> {
    structure: &'a ConsolidatedParameters,
    groups: Vec<IndexedParametersMapping<'a>>,
}

impl<'a> ParameterView<'a> {
    pub fn names(&self) -> &'a [String] {
        self.structure.names()
    }

    pub fn len(&self) -> usize {
        self.structure.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structure.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structure.winners.contains_key(name)
    }

    /// Current value from the winning package, `None` for an unknown name
    pub fn value(&self, name: &str) -> Result<Option<f64>> {
        match self.winner(name) {
            Some(group) => group.get(name),
            None => Ok(None),
        }
    }

    /// Winning group position for `name` (see `groups()`)
    pub fn source_of(&self, name: &str) -> Option<usize> {
        self.structure.source_of(name)
    }

    pub fn groups(&self) -> &[IndexedParametersMapping<'a>] {
        &self.groups
    }

    pub fn replaced(&self) -> &'a HashMap<String, Vec<(PathBuf, String)>> {
        &self.structure.replaced
    }

    /// `(package path, package name, parameter name)` of each winning definition
    pub fn ids(&self) -> Vec<(&'a Path, &'a str, &'a str)> {
        self.structure
            .names
            .iter()
            .filter_map(|name| {
                let mapping = self.winner(name)?.mapping();
                Some((mapping.path(), mapping.package_name(), name.as_str()))
            })
            .collect()
    }

    /// Current values in `names()` order
    pub fn consolidated_array(&self) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.len());
        for name in self.names() {
            if let Some(value) = self.value(name)? {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Current column of each name's winning package, in `names()` order
    pub fn consolidated_indices(&self) -> Vec<usize> {
        self.names()
            .iter()
            .filter_map(|name| self.winner(name).map(|g| g.column()))
            .collect()
    }

    /// Names whose definitions overrode an earlier package
    pub fn overridden_names(&self) -> HashSet<&'a str> {
        self.structure.replaced.keys().map(String::as_str).collect()
    }

    fn winner(&self, name: &str) -> Option<&IndexedParametersMapping<'a>> {
        self.groups.get(self.structure.source_of(name)?)
    }
}
