//! # Multi-Package Loader
//!
//! ## Role
//! Load an ordered list of packages and replay their samples into
//! caller-owned matrices, one Monte-Carlo iteration at a time.
//!
//! ## Lifecycle
//! 1. `PackagesDataLoader::new(paths, config)`: validate each package, build
//!    its indexer, consolidate its matrix resources by type, collect its
//!    parameter resources. Every indexer is advanced once.
//! 2. `index_arrays(owner)`: translate identifiers to matrix coordinates with
//!    the owner's lookup dictionaries. Repeatable; groups whose dictionary is
//!    not built yet are left for a later call.
//! 3. Per iteration: `advance()`, then `update_matrices(..)` and/or read
//!    `parameters()`.
//!
//! Package order is override order: for named parameters the last package
//! defining a name wins.
//!
//! A loader with no matrix data is *matrix-empty*: indexing and updating are
//! no-ops rather than errors.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info_span, trace};

use crate::config::{ColumnPolicy, LoaderConfig};
use crate::data::{Manifest, MatrixOwner, MatrixResource, SeedSpec, TECHNOSPHERE_MATRIX};
use crate::error::{PresamplesError, Result};
use crate::io::npy::SampleArray;
use crate::io::package::{read_indices, validate};
use crate::model::consolidate::{ConsolidatedGroup, GroupMember};
use crate::model::indexer::Indexer;
use crate::model::parameters::{ColumnSource, ConsolidatedParameters, ParameterView, ParametersMapping};

/// One loaded package: its indexer, matrix groups and parameters
#[derive(Debug)]
pub struct LoadedPackage {
    path: PathBuf,
    manifest: Manifest,
    indexer: Indexer,
    matrix_data: Vec<ConsolidatedGroup>,
    parameters: Option<ParametersMapping>,
}

impl LoadedPackage {
    /// Validate and load one package directory
    pub fn load(path: &Path, config: &LoaderConfig) -> Result<Self> {
        info_span!("load_package", path = ?path).in_scope(|| {
            let manifest = validate(path)?;
            let seed = config.seed.or(manifest.seed);
            // Packages without data have no column count
            let ncols = manifest.ncols.filter(|&n| n > 0).unwrap_or(1);
            let indexer = Indexer::new(ncols, seed);

            let mut groups: BTreeMap<&str, Vec<&MatrixResource>> = BTreeMap::new();
            for resource in manifest.matrix_resources() {
                groups.entry(resource.kind.as_str()).or_default().push(resource);
            }
            let mut matrix_data = Vec::with_capacity(groups.len());
            for (kind, resources) in groups {
                let members = resources
                    .into_iter()
                    .map(|r| load_member(path, r, manifest.ncols))
                    .collect::<Result<Vec<_>>>()?;
                matrix_data.push(ConsolidatedGroup::consolidate(
                    kind,
                    members,
                    config.column_policy,
                )?);
            }

            let parameters = if manifest.parameter_resources().next().is_some() {
                let mapping = ParametersMapping::load(
                    path,
                    &manifest.name,
                    manifest.parameter_resources(),
                    config.column_policy,
                )?;
                for array in mapping.samples().arrays() {
                    check_ncols(array, manifest.ncols)?;
                }
                Some(mapping)
            } else {
                None
            };

            debug!(
                id = %manifest.id,
                matrix_groups = matrix_data.len(),
                parameters = parameters.as_ref().map_or(0, ParametersMapping::len),
                "Package loaded"
            );
            Ok(Self {
                path: path.to_path_buf(),
                manifest,
                indexer,
                matrix_data,
                parameters,
            })
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Seed stored in the manifest (the indexer may use a loader override)
    pub fn seed(&self) -> Option<SeedSpec> {
        self.manifest.seed
    }

    pub fn ncols(&self) -> Option<usize> {
        self.manifest.ncols
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Consolidated matrix groups, ordered by resource type
    pub fn matrix_data(&self) -> &[ConsolidatedGroup] {
        &self.matrix_data
    }

    pub fn parameters(&self) -> Option<&ParametersMapping> {
        self.parameters.as_ref()
    }
}

fn load_member(dir: &Path, resource: &MatrixResource, ncols: Option<usize>) -> Result<GroupMember> {
    let indices = read_indices(&dir.join(&resource.indices.filepath))?;
    let samples = SampleArray::open(&dir.join(&resource.samples.filepath))?;
    check_ncols(&samples, ncols)?;
    Ok(GroupMember {
        labels: resource.labels.clone(),
        indices,
        samples,
    })
}

fn check_ncols(array: &SampleArray, ncols: Option<usize>) -> Result<()> {
    match ncols {
        Some(expected) if array.n_cols() != expected => {
            Err(PresamplesError::InconsistentSampleCount {
                expected,
                found: array.n_cols(),
            })
        }
        _ => Ok(()),
    }
}

/// Loads packages in order and applies their samples to matrices
pub struct PackagesDataLoader {
    config: LoaderConfig,
    packages: Vec<LoadedPackage>,
    owner: Option<Box<dyn MatrixOwner>>,
    parameters: OnceCell<ConsolidatedParameters>,
}

impl PackagesDataLoader {
    /// Load every package in `paths`, in order
    pub fn new<I, P>(paths: I, config: LoaderConfig) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let packages = paths
            .into_iter()
            .map(|p| LoadedPackage::load(p.as_ref(), &config))
            .collect::<Result<Vec<_>>>()?;
        let mut loader = Self {
            config,
            packages,
            owner: None,
            parameters: OnceCell::new(),
        };
        loader.advance();
        debug!(
            packages = loader.packages.len(),
            matrix_empty = loader.is_matrix_empty(),
            "Loader ready"
        );
        Ok(loader)
    }

    /// Bind a matrix owner used when none is passed to `update_matrices`
    pub fn with_owner(mut self, owner: Box<dyn MatrixOwner>) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn owner(&self) -> Option<&dyn MatrixOwner> {
        self.owner.as_deref()
    }

    pub fn owner_mut(&mut self) -> Option<&mut (dyn MatrixOwner + 'static)> {
        self.owner.as_deref_mut()
    }

    pub fn take_owner(&mut self) -> Option<Box<dyn MatrixOwner>> {
        self.owner.take()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn column_policy(&self) -> ColumnPolicy {
        self.config.column_policy
    }

    /// Number of loaded packages, including those without matrix data
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// No package carries matrix data
    pub fn is_matrix_empty(&self) -> bool {
        self.packages.iter().all(|p| p.matrix_data.is_empty())
    }

    pub fn packages(&self) -> &[LoadedPackage] {
        &self.packages
    }

    /// Step every package's indexer, in package order
    pub fn advance(&mut self) {
        for package in &mut self.packages {
            package.indexer.advance();
        }
    }

    /// Fill matrix coordinates from `owner`'s lookup dictionaries
    pub fn index_arrays(&mut self, owner: &dyn MatrixOwner) {
        index_packages(&mut self.packages, owner);
    }

    /// `index_arrays` against the bound owner
    pub fn index_bound_arrays(&mut self) -> Result<()> {
        if self.is_matrix_empty() {
            return Ok(());
        }
        let owner = self.owner.as_deref().ok_or(PresamplesError::MissingMatrixOwner)?;
        index_packages(&mut self.packages, owner);
        Ok(())
    }

    /// Write the current sample of every indexed group into `owner`'s matrices.
    ///
    /// `owner` falls back to the bound owner. `subset` restricts the written
    /// matrices by name. Matrices the owner does not have are skipped.
    pub fn update_matrices(
        &mut self,
        owner: Option<&mut dyn MatrixOwner>,
        subset: Option<&[&str]>,
    ) -> Result<()> {
        if self.is_matrix_empty() {
            return Ok(());
        }
        match owner {
            Some(owner) => update_packages(&self.packages, owner, subset),
            None => {
                let owner = self
                    .owner
                    .as_deref_mut()
                    .ok_or(PresamplesError::MissingMatrixOwner)?;
                update_packages(&self.packages, owner, subset)
            }
        }
    }

    /// Named parameters merged across packages, read at each package's
    /// current column
    pub fn parameters(&self) -> ParameterView<'_> {
        let structure = self.parameters.get_or_init(|| {
            ConsolidatedParameters::build(self.packages.iter().filter_map(|p| p.parameters.as_ref()))
        });
        let groups = self
            .packages
            .iter()
            .filter_map(|p| {
                p.parameters
                    .as_ref()
                    .map(|m| m.indexed(ColumnSource::Indexer(&p.indexer)))
            })
            .collect();
        structure.view(groups)
    }
}

fn index_packages(packages: &mut [LoadedPackage], owner: &dyn MatrixOwner) {
    for package in packages.iter_mut() {
        for group in &mut package.matrix_data {
            if group.is_indexed() {
                continue;
            }
            let labels = group.labels();
            let Some(rows) = owner.lookup_row(&labels.row_dict) else {
                debug!(dict = %labels.row_dict, "Row dictionary not built yet");
                continue;
            };
            let cols = match &labels.col_dict {
                Some(dict) => match owner.lookup_col(dict) {
                    Some(cols) => Some(cols),
                    None => {
                        debug!(dict = %dict, "Column dictionary not built yet");
                        continue;
                    }
                },
                None => None,
            };
            group.index_with(rows, cols);
        }
    }
}

fn update_packages(
    packages: &[LoadedPackage],
    owner: &mut dyn MatrixOwner,
    subset: Option<&[&str]>,
) -> Result<()> {
    for package in packages.iter().filter(|p| !p.matrix_data.is_empty()) {
        let column = package.indexer.index().unwrap_or(0);
        for group in &package.matrix_data {
            let name = group.matrix();
            if !group.is_indexed() || subset.is_some_and(|s| !s.contains(&name)) {
                continue;
            }
            let Some(matrix) = owner.matrix(name) else {
                trace!(matrix = name, "Owner has no such matrix");
                continue;
            };
            let values = group.sample(column)?;
            let (n_rows, n_cols) = matrix.shape();
            let cells: Vec<(usize, usize, f64)> = values
                .into_iter()
                .zip(group.targets())
                .filter_map(|(value, target)| target.map(|(row, col)| (row, col, value)))
                .collect();
            // Whole group is checked before any cell is written
            let outside = cells.iter().find(|&&(r, c, _)| r >= n_rows || c >= n_cols);
            if let Some(&(row, col, _)) = outside {
                return Err(PresamplesError::shape_mismatch(format!(
                    "cell ({}, {}) outside {} with shape ({}, {})",
                    row, col, name, n_rows, n_cols
                )));
            }
            for (row, col, value) in cells {
                matrix.set(row, col, value);
            }
            trace!(matrix = name, column, package = %package.manifest.id, "Matrix updated");
            if name == TECHNOSPHERE_MATRIX {
                owner.invalidate_factorization();
            }
        }
    }
    Ok(())
}

impl fmt::Display for PackagesDataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackagesDataLoader with {} packages:", self.packages.len())?;
        for package in &self.packages {
            write!(f, "\n\t{}", package.path.display())?;
        }
        Ok(())
    }
}

impl fmt::Debug for PackagesDataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagesDataLoader")
            .field("config", &self.config)
            .field("packages", &self.packages)
            .field("owner", &self.owner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageOptions;
    use crate::data::{ExchangeType, Lookup, Matrix, MatrixStore, SampleMatrix};
    use crate::io::package::{create_package, MatrixData, ParameterData};

    fn tech_package(dir: &Path, id: &str) -> PathBuf {
        let samples = SampleMatrix::from_rows(vec![vec![10.0, 20.0], vec![11.0, 21.0]]).unwrap();
        let data = MatrixData::technosphere(
            samples,
            &[(100, 100, ExchangeType::Production), (100, 101, ExchangeType::Technosphere)],
        )
        .unwrap();
        create_package(
            &[data],
            &[],
            &PackageOptions::new()
                .id(id)
                .dirpath(dir)
                .seed(SeedSpec::Sequential),
        )
        .unwrap()
        .1
    }

    fn store() -> MatrixStore {
        let products: Lookup = [(100, 0), (101, 1)].into_iter().collect();
        let activities: Lookup = [(100, 0), (101, 1)].into_iter().collect();
        MatrixStore::new()
            .with_matrix(TECHNOSPHERE_MATRIX, 2, 2)
            .with_lookup("_product_dict", products)
            .with_lookup("_activity_dict", activities)
    }

    #[test]
    fn test_update_writes_signed_values() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let path = tech_package(dir.path(), "t");
        let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).unwrap();
        let mut owner = store();
        owner.set_factorized();

        loader.index_arrays(&owner);
        loader.update_matrices(Some(&mut owner), None).unwrap();
        let m = owner.get(TECHNOSPHERE_MATRIX).unwrap();
        assert_eq!(m.get(0, 0), 10.0);
        assert_eq!(m.get(0, 1), -11.0);
        assert!(!owner.is_factorized());

        loader.advance();
        loader.update_matrices(Some(&mut owner), None).unwrap();
        assert_eq!(owner.get(TECHNOSPHERE_MATRIX).unwrap().get(0, 0), 20.0);
    }

    #[test]
    fn test_out_of_shape_cell_writes_nothing() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let path = tech_package(dir.path(), "t");
        let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).unwrap();

        let products: Lookup = [(100, 0)].into_iter().collect();
        let activities: Lookup = [(100, 0), (101, 5)].into_iter().collect();
        let mut owner = MatrixStore::new()
            .with_matrix(TECHNOSPHERE_MATRIX, 2, 2)
            .with_lookup("_product_dict", products)
            .with_lookup("_activity_dict", activities);
        owner.set_factorized();
        loader.index_arrays(&owner);

        assert!(matches!(
            loader.update_matrices(Some(&mut owner), None),
            Err(PresamplesError::ShapeMismatch { .. })
        ));
        let m = owner.get(TECHNOSPHERE_MATRIX).unwrap();
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.get(0, 0), 0.0);
        assert!(owner.is_factorized());
    }

    #[test]
    fn test_missing_owner() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let path = tech_package(dir.path(), "t");
        let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).unwrap();
        assert!(matches!(
            loader.update_matrices(None, None),
            Err(PresamplesError::MissingMatrixOwner)
        ));

        let mut loader = loader.with_owner(Box::new(store()));
        loader.index_bound_arrays().unwrap();
        loader.update_matrices(None, None).unwrap();
    }

    #[test]
    fn test_staged_indexing_and_subset() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let path = tech_package(dir.path(), "t");
        let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).unwrap();

        let mut owner = store();
        let activities = owner.remove_lookup("_activity_dict").unwrap();
        loader.index_arrays(&owner);
        assert!(!loader.packages()[0].matrix_data()[0].is_indexed());

        owner.insert_lookup("_activity_dict", activities);
        loader.index_arrays(&owner);
        assert!(loader.packages()[0].matrix_data()[0].is_indexed());

        loader
            .update_matrices(Some(&mut owner), Some(&["biosphere_matrix"]))
            .unwrap();
        assert_eq!(owner.get(TECHNOSPHERE_MATRIX).unwrap().nnz(), 0);
    }

    #[test]
    fn test_parameter_only_package_is_matrix_empty() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let params = ParameterData::new("p", vec!["x".into()], SampleMatrix::from_vector(vec![1.0, 2.0]));
        let (_, path) = create_package(&[], &[params], &PackageOptions::new().dirpath(dir.path())).unwrap();
        let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).unwrap();
        assert!(loader.is_matrix_empty());
        assert_eq!(loader.len(), 1);
        loader.update_matrices(None, None).unwrap();
        assert!(loader.parameters().contains("x"));
    }

    #[test]
    fn test_display() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let path = tech_package(dir.path(), "shown");
        let loader = PackagesDataLoader::new(vec![path.clone()], LoaderConfig::default()).unwrap();
        let text = loader.to_string();
        assert!(text.starts_with("PackagesDataLoader with 1 packages:"));
        assert!(text.contains("shown"));
    }
}
