//! # Package Directories
//!
//! ## Role
//! Read, validate and write presample packages on disk.
//!
//! ## Layout
//! ```text
//! <dirpath>/<id>/
//! ├── datapackage.json
//! ├── <id>.<index>.samples.npy    # one per resource
//! ├── <id>.<index>.indices.json   # matrix resources
//! └── <id>.<index>.names.json     # parameter resources
//! ```
//!
//! Packages are write-once. `append_package` only ever adds resources and
//! rewrites the manifest; existing data files are left untouched.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info_span};

use crate::config::PackageOptions;
use crate::data::manifest::{MANIFEST_FILENAME, RESOURCE_PROFILE};
use crate::data::{
    ExchangeType, FieldKind, FileRef, IndexArray, IndexField, Manifest, MatrixLabels,
    MatrixResource, ParameterResource, Resource, SampleMatrix, ACTIVITY_DICT, BIOSPHERE_DICT,
    BIOSPHERE_MATRIX, CHARACTERIZATION_MATRIX, MAX_SIGNED_32BIT_INT, PRODUCT_DICT,
    TECHNOSPHERE_MATRIX,
};
use crate::error::{PresamplesError, Result};
use crate::io::hashing::file_hash;
use crate::io::npy::write_samples;

const NPY_MEDIATYPE: &str = "application/octet-stream";
const JSON_MEDIATYPE: &str = "application/json";

// ============================================================================
// Reading and validation
// ============================================================================

/// Read `datapackage.json` without checking any data files
pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILENAME);
    let file = File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PresamplesError::ManifestMissing {
            path: dir.to_path_buf(),
        },
        _ => PresamplesError::Io(e),
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Write `datapackage.json`, replacing any existing manifest
pub fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    let file = BufWriter::new(File::create(dir.join(MANIFEST_FILENAME))?);
    serde_json::to_writer_pretty(file, manifest)?;
    Ok(())
}

/// Check that every file the manifest references exists and matches its hash.
///
/// Stops at the first bad file; the error names that file.
pub fn validate(dir: &Path) -> Result<Manifest> {
    info_span!("validate_package", path = ?dir).in_scope(|| {
        let manifest = read_manifest(dir)?;
        for resource in &manifest.resources {
            for file in resource.files() {
                verify_file(dir, file)?;
            }
        }
        debug!(
            id = %manifest.id,
            resources = manifest.resources.len(),
            "Package validated"
        );
        Ok(manifest)
    })
}

fn verify_file(dir: &Path, file: &FileRef) -> Result<()> {
    let path = dir.join(&file.filepath);
    if !path.is_file() {
        return Err(PresamplesError::ResourceFileMissing { path });
    }
    let actual = file_hash(&path)?;
    if actual != file.hash {
        return Err(PresamplesError::HashMismatch {
            path,
            expected: file.hash.clone(),
            actual,
        });
    }
    Ok(())
}

/// Load an index side file
pub fn read_indices(path: &Path) -> Result<IndexArray> {
    let file = File::open(path).map_err(|e| missing_or_io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PresamplesError::format(path, e.to_string()))
}

/// Load a parameter names side file
pub fn read_names(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| missing_or_io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PresamplesError::format(path, e.to_string()))
}

fn missing_or_io(path: &Path, e: std::io::Error) -> PresamplesError {
    match e.kind() {
        std::io::ErrorKind::NotFound => PresamplesError::ResourceFileMissing {
            path: path.to_path_buf(),
        },
        _ => PresamplesError::Io(e),
    }
}

// ============================================================================
// Input data
// ============================================================================

/// Samples for cells of one matrix, with their index records and metadata
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixData {
    pub kind: String,
    pub samples: SampleMatrix,
    pub indices: IndexArray,
    pub labels: MatrixLabels,
}

impl MatrixData {
    /// Technosphere exchanges `(input id, output id, type)`
    pub fn technosphere(samples: SampleMatrix, rows: &[(u64, u64, ExchangeType)]) -> Result<Self> {
        let mut indices = IndexArray::new(vec![
            IndexField::new("input", FieldKind::U4),
            IndexField::new("output", FieldKind::U4),
            IndexField::new("row", FieldKind::U4),
            IndexField::new("col", FieldKind::U4),
            IndexField::new(ExchangeType::FIELD, FieldKind::U1),
        ]);
        for &(input, output, tag) in rows {
            indices.push(&[
                input,
                output,
                MAX_SIGNED_32BIT_INT,
                MAX_SIGNED_32BIT_INT,
                tag.code(),
            ])?;
        }
        let labels = MatrixLabels::rows(TECHNOSPHERE_MATRIX, "input", "row", PRODUCT_DICT)
            .with_cols("output", "col", ACTIVITY_DICT);
        Ok(Self::from_parts("technosphere", samples, indices, labels))
    }

    /// Biosphere exchanges `(flow id, activity id)`
    pub fn biosphere(samples: SampleMatrix, rows: &[(u64, u64)]) -> Result<Self> {
        let mut indices = IndexArray::new(vec![
            IndexField::new("input", FieldKind::U4),
            IndexField::new("output", FieldKind::U4),
            IndexField::new("row", FieldKind::U4),
            IndexField::new("col", FieldKind::U4),
        ]);
        for &(input, output) in rows {
            indices.push(&[input, output, MAX_SIGNED_32BIT_INT, MAX_SIGNED_32BIT_INT])?;
        }
        let labels = MatrixLabels::rows(BIOSPHERE_MATRIX, "input", "row", BIOSPHERE_DICT)
            .with_cols("output", "col", ACTIVITY_DICT);
        Ok(Self::from_parts("biosphere", samples, indices, labels))
    }

    /// Characterization factors, one flow id per row (diagonal matrix)
    pub fn cf(samples: SampleMatrix, flows: &[u64]) -> Result<Self> {
        let mut indices = IndexArray::new(vec![
            IndexField::new("flow", FieldKind::U4),
            IndexField::new("row", FieldKind::U4),
        ]);
        for &flow in flows {
            indices.push(&[flow, MAX_SIGNED_32BIT_INT])?;
        }
        let labels = MatrixLabels::rows(CHARACTERIZATION_MATRIX, "flow", "row", BIOSPHERE_DICT);
        Ok(Self::from_parts("cf", samples, indices, labels))
    }

    /// Format raw records with the built-in formatter for `kind`.
    ///
    /// Records are `[input, output, type code]` for `technosphere`,
    /// `[input, output]` for `biosphere` and `[flow]` for `cf`.
    pub fn formatted(kind: &str, samples: SampleMatrix, records: &[Vec<u64>]) -> Result<Self> {
        let width = match kind {
            "technosphere" => 3,
            "biosphere" => 2,
            "cf" => 1,
            _ => {
                return Err(PresamplesError::UnknownFormatter {
                    kind: kind.to_string(),
                })
            }
        };
        if let Some(bad) = records.iter().find(|r| r.len() != width) {
            return Err(PresamplesError::shape_mismatch(format!(
                "'{}' records have {} values, got {}",
                kind,
                width,
                bad.len()
            )));
        }
        match kind {
            "technosphere" => {
                let rows: Vec<_> = records
                    .iter()
                    .map(|r| (r[0], r[1], ExchangeType::from_code(r[2])))
                    .collect();
                Self::technosphere(samples, &rows)
            }
            "biosphere" => {
                let rows: Vec<_> = records.iter().map(|r| (r[0], r[1])).collect();
                Self::biosphere(samples, &rows)
            }
            _ => {
                let flows: Vec<_> = records.iter().map(|r| r[0]).collect();
                Self::cf(samples, &flows)
            }
        }
    }

    /// Any other matrix, with an explicit index layout and metadata
    pub fn custom(
        kind: impl Into<String>,
        samples: SampleMatrix,
        indices: IndexArray,
        labels: MatrixLabels,
    ) -> Result<Self> {
        validate_matrix_metadata(&labels, &indices)?;
        Ok(Self::from_parts(kind, samples, indices, labels))
    }

    fn from_parts(
        kind: impl Into<String>,
        samples: SampleMatrix,
        indices: IndexArray,
        labels: MatrixLabels,
    ) -> Self {
        Self {
            kind: kind.into(),
            samples,
            indices,
            labels,
        }
    }
}

/// Every label the metadata names must be a field of the index array
pub fn validate_matrix_metadata(labels: &MatrixLabels, indices: &IndexArray) -> Result<()> {
    labels.validate()?;
    let mut missing: Vec<&str> = labels
        .label_fields()
        .into_iter()
        .filter(|label| indices.field_position(label).is_none())
        .collect();
    if !missing.is_empty() {
        missing.dedup();
        return Err(PresamplesError::invalid_metadata(format!(
            "The following necessary columns are not in the indices: {:?}",
            missing
        )));
    }
    Ok(())
}

/// Samples for named parameters, one row per name
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterData {
    pub label: String,
    pub names: Vec<String>,
    pub samples: SampleMatrix,
}

impl ParameterData {
    pub fn new(label: impl Into<String>, names: Vec<String>, samples: SampleMatrix) -> Self {
        Self {
            label: label.into(),
            names,
            samples,
        }
    }
}

/// Split inventory rows into biosphere and technosphere matrix data.
///
/// Rows tagged `Biosphere` go to the biosphere data (their tag is dropped);
/// everything else is technosphere. A half with no rows is left out.
pub fn split_inventory_presamples(
    samples: &SampleMatrix,
    rows: &[(u64, u64, ExchangeType)],
) -> Result<Vec<MatrixData>> {
    if samples.n_rows() != rows.len() {
        return Err(PresamplesError::shape_mismatch(format!(
            "{} sample rows, {} index rows",
            samples.n_rows(),
            rows.len()
        )));
    }
    let (bio, tech): (Vec<usize>, Vec<usize>) =
        (0..rows.len()).partition(|&i| rows[i].2 == ExchangeType::Biosphere);

    let mut out = Vec::with_capacity(2);
    if !bio.is_empty() {
        let pairs: Vec<_> = bio.iter().map(|&i| (rows[i].0, rows[i].1)).collect();
        out.push(MatrixData::biosphere(samples.select_rows(&bio), &pairs)?);
    }
    if !tech.is_empty() {
        let triples: Vec<_> = tech.iter().map(|&i| rows[i]).collect();
        out.push(MatrixData::technosphere(samples.select_rows(&tech), &triples)?);
    }
    Ok(out)
}

/// Named sample vectors to `(names sorted, one sample row per name)`
pub fn convert_parameter_dict<K, I>(parameters: I) -> Result<(Vec<String>, SampleMatrix)>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Vec<f64>)>,
{
    let sorted: BTreeMap<String, Vec<f64>> = parameters
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect();
    let names: Vec<String> = sorted.keys().cloned().collect();
    let samples = SampleMatrix::from_rows(sorted.into_values().collect())?;
    Ok((names, samples))
}

// ============================================================================
// Writing
// ============================================================================

/// Create a new package directory. Returns `(id, package directory)`.
///
/// All inputs are checked before anything touches the filesystem.
pub fn create_package(
    matrix_data: &[MatrixData],
    parameter_data: &[ParameterData],
    options: &PackageOptions,
) -> Result<(String, PathBuf)> {
    options.validate()?;
    let id = options
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let name = options.name.clone().unwrap_or_else(|| id.clone());

    info_span!("create_package", id = %id).in_scope(|| {
        let ncols = check_inputs(matrix_data, parameter_data, None)?;
        let names: Vec<&str> = parameter_data
            .iter()
            .flat_map(|p| p.names.iter().map(String::as_str))
            .collect();
        check_unique_names(&names)?;

        let parent = match &options.dirpath {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let dir = parent.join(&id);
        if dir.exists() {
            if !options.overwrite {
                return Err(PresamplesError::PackageExists { path: dir });
            }
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir(&dir)?;

        let mut manifest = Manifest::new(id.clone(), name, options.seed);
        manifest.ncols = ncols;
        write_resources(&dir, &mut manifest, matrix_data, parameter_data, 0)?;
        write_manifest(&dir, &manifest)?;

        debug!(
            path = ?dir,
            resources = manifest.resources.len(),
            "Package created"
        );
        Ok((id, dir))
    })
}

/// Add resources to an existing package. Returns `(id, package directory)`.
///
/// New sample arrays must have the package's column count, and new parameter
/// names must not already be defined in the package.
pub fn append_package(
    dir: &Path,
    matrix_data: &[MatrixData],
    parameter_data: &[ParameterData],
) -> Result<(String, PathBuf)> {
    info_span!("append_package", path = ?dir).in_scope(|| {
        let mut manifest = validate(dir)?;
        let ncols = check_inputs(matrix_data, parameter_data, manifest.ncols)?;

        if !parameter_data.is_empty() {
            let mut existing = HashSet::new();
            for resource in manifest.parameter_resources() {
                existing.extend(read_names(&dir.join(&resource.names.filepath))?);
            }
            let mut clashes: Vec<String> = parameter_data
                .iter()
                .flat_map(|p| p.names.iter())
                .filter(|n| existing.contains(*n))
                .cloned()
                .collect();
            if !clashes.is_empty() {
                clashes.sort();
                clashes.dedup();
                return Err(PresamplesError::NameConflict { names: clashes });
            }
            let names: Vec<&str> = parameter_data
                .iter()
                .flat_map(|p| p.names.iter().map(String::as_str))
                .collect();
            check_unique_names(&names)?;
        }

        manifest.ncols = ncols;
        let offset = manifest.next_index();
        write_resources(dir, &mut manifest, matrix_data, parameter_data, offset)?;
        write_manifest(dir, &manifest)?;

        debug!(
            resources = manifest.resources.len(),
            first_index = offset,
            "Package appended"
        );
        Ok((manifest.id.clone(), dir.to_path_buf()))
    })
}

/// Shared checks for create and append; returns the package column count
fn check_inputs(
    matrix_data: &[MatrixData],
    parameter_data: &[ParameterData],
    mut ncols: Option<usize>,
) -> Result<Option<usize>> {
    if matrix_data.is_empty() && parameter_data.is_empty() {
        return Err(PresamplesError::config(
            "Must specify at least one of matrix data and parameter data",
        ));
    }

    let mut check_cols = |found: usize| -> Result<()> {
        match ncols {
            Some(expected) if expected != found => {
                Err(PresamplesError::InconsistentSampleCount { expected, found })
            }
            Some(_) => Ok(()),
            None => {
                ncols = Some(found);
                Ok(())
            }
        }
    };

    for data in matrix_data {
        check_cols(data.samples.n_cols())?;
        validate_matrix_metadata(&data.labels, &data.indices)?;
        if data.samples.n_rows() != data.indices.len() {
            return Err(PresamplesError::shape_mismatch(format!(
                "{} sample rows, {} index rows in '{}' data",
                data.samples.n_rows(),
                data.indices.len(),
                data.kind
            )));
        }
    }
    for data in parameter_data {
        if data.samples.n_rows() != data.names.len() {
            return Err(PresamplesError::shape_mismatch(format!(
                "{} sample rows, {} names in '{}'",
                data.samples.n_rows(),
                data.names.len(),
                data.label
            )));
        }
        check_cols(data.samples.n_cols())?;
    }
    Ok(ncols)
}

fn check_unique_names(names: &[&str]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut duplicates: Vec<String> = names
        .iter()
        .filter(|n| !seen.insert(**n))
        .map(|n| n.to_string())
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }
    duplicates.sort();
    duplicates.dedup();
    Err(PresamplesError::NameConflict { names: duplicates })
}

fn write_resources(
    dir: &Path,
    manifest: &mut Manifest,
    matrix_data: &[MatrixData],
    parameter_data: &[ParameterData],
    offset: usize,
) -> Result<()> {
    let mut index = offset;
    for data in matrix_data {
        let samples = write_samples_file(dir, &manifest.id, index, &data.samples)?;
        let indices_fp = format!("{}.{}.indices.json", manifest.id, index);
        write_json(&dir.join(&indices_fp), &data.indices)?;
        manifest.resources.push(Resource::Matrix(MatrixResource {
            kind: data.kind.clone(),
            samples,
            indices: json_file_ref(dir, indices_fp)?,
            labels: data.labels.clone(),
            index: Some(index),
            profile: Some(RESOURCE_PROFILE.to_string()),
        }));
        debug!(index, kind = %data.kind, rows = data.indices.len(), "Wrote matrix resource");
        index += 1;
    }
    for data in parameter_data {
        let samples = write_samples_file(dir, &manifest.id, index, &data.samples)?;
        let names_fp = format!("{}.{}.names.json", manifest.id, index);
        write_json(&dir.join(&names_fp), &data.names)?;
        manifest.resources.push(Resource::Parameter(ParameterResource {
            label: data.label.clone(),
            samples,
            names: json_file_ref(dir, names_fp)?,
            index: Some(index),
            profile: Some(RESOURCE_PROFILE.to_string()),
        }));
        debug!(index, label = %data.label, names = data.names.len(), "Wrote parameter resource");
        index += 1;
    }
    Ok(())
}

fn write_samples_file(dir: &Path, id: &str, index: usize, samples: &SampleMatrix) -> Result<FileRef> {
    let filepath = format!("{}.{}.samples.npy", id, index);
    let path = dir.join(&filepath);
    write_samples(&path, samples)?;
    Ok(FileRef {
        hash: file_hash(&path)?,
        filepath,
        shape: Some(samples.shape().to_vec()),
        dtype: Some("<f8".to_string()),
        format: Some("npy".to_string()),
        mediatype: Some(NPY_MEDIATYPE.to_string()),
    })
}

fn json_file_ref(dir: &Path, filepath: String) -> Result<FileRef> {
    Ok(FileRef {
        hash: file_hash(&dir.join(&filepath))?,
        filepath,
        shape: None,
        dtype: None,
        format: Some("json".to_string()),
        mediatype: Some(JSON_MEDIATYPE.to_string()),
    })
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer(file, value)?;
    Ok(())
}
