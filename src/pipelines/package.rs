//! # Single Package Interface
//!
//! Read-only handle on one validated package directory, with its own indexer
//! (advanced once on open) and its parameter mapping.

use std::path::{Path, PathBuf};

use tracing::info_span;

use crate::config::ColumnPolicy;
use crate::data::{Manifest, Resource, SeedSpec};
use crate::error::Result;
use crate::io::package::{read_manifest, validate, write_manifest};
use crate::model::indexer::Indexer;
use crate::model::parameters::{ColumnSource, IndexedParametersMapping, ParametersMapping};

#[derive(Debug)]
pub struct PresamplesPackage {
    path: PathBuf,
    manifest: Manifest,
    indexer: Indexer,
    parameters: ParametersMapping,
}

impl PresamplesPackage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ColumnPolicy::default())
    }

    pub fn open_with(path: impl AsRef<Path>, policy: ColumnPolicy) -> Result<Self> {
        let path = path.as_ref();
        info_span!("open_package", path = ?path).in_scope(|| {
            let manifest = validate(path)?;
            let mut indexer = Indexer::new(manifest.ncols.unwrap_or(0), manifest.seed);
            indexer.advance();
            let parameters = ParametersMapping::load(
                path,
                &manifest.name,
                manifest.parameter_resources(),
                policy,
            )?;
            Ok(Self {
                path: path.to_path_buf(),
                manifest,
                indexer,
                parameters,
            })
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Manifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn seed(&self) -> Option<SeedSpec> {
        self.manifest.seed
    }

    pub fn ncols(&self) -> Option<usize> {
        self.manifest.ncols
    }

    pub fn resources(&self) -> &[Resource] {
        &self.manifest.resources
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.manifest.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.resources.is_empty()
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn advance(&mut self) -> usize {
        self.indexer.advance()
    }

    /// Store a new seed in the manifest.
    ///
    /// The open indexer keeps its stream; the seed applies on the next open.
    pub fn change_seed(&mut self, seed: Option<SeedSpec>) -> Result<()> {
        let mut manifest = read_manifest(&self.path)?;
        manifest.seed = seed;
        write_manifest(&self.path, &manifest)?;
        self.manifest = manifest;
        Ok(())
    }

    /// Name -> full sample row
    pub fn parameters(&self) -> &ParametersMapping {
        &self.parameters
    }

    /// Parameters at this package's current column
    pub fn indexed_parameters(&self) -> IndexedParametersMapping<'_> {
        self.parameters.indexed(ColumnSource::Indexer(&self.indexer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageOptions;
    use crate::data::SampleMatrix;
    use crate::io::package::{create_package, ParameterData};

    fn package(dir: &Path) -> PathBuf {
        let params = ParameterData::new(
            "weather",
            vec!["rain".into(), "sun".into()],
            SampleMatrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap(),
        );
        create_package(
            &[],
            &[params],
            &PackageOptions::new()
                .id("pp")
                .name("weather package")
                .dirpath(dir)
                .seed(SeedSpec::Sequential),
        )
        .unwrap()
        .1
    }

    #[test]
    fn test_open_and_read() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let mut pkg = PresamplesPackage::open(package(dir.path())).unwrap();
        assert_eq!(pkg.name(), "weather package");
        assert_eq!(pkg.id(), "pp");
        assert_eq!(pkg.ncols(), Some(3));
        assert_eq!(pkg.len(), 1);
        assert_eq!(pkg.indexer().count(), 1);

        assert_eq!(pkg.parameters().get("sun"), Some(vec![4.0, 5.0, 6.0]));
        assert_eq!(pkg.indexed_parameters().get("sun").unwrap(), Some(4.0));
        pkg.advance();
        assert_eq!(pkg.indexed_parameters().get("sun").unwrap(), Some(5.0));
        assert_eq!(pkg.indexed_parameters().array().unwrap(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_change_seed_persists() {
        let dir = tempfile::tempdir().expect("Create temp dir");
        let path = package(dir.path());
        let mut pkg = PresamplesPackage::open(&path).unwrap();
        pkg.change_seed(Some(SeedSpec::Value(99))).unwrap();
        assert_eq!(pkg.seed(), Some(SeedSpec::Value(99)));

        let reopened = PresamplesPackage::open(&path).unwrap();
        assert_eq!(reopened.seed(), Some(SeedSpec::Value(99)));
        assert_eq!(reopened.indexer().seed(), Some(SeedSpec::Value(99)));
    }
}
