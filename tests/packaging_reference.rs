use presamples::config::{ColumnPolicy, LoaderConfig, PackageOptions};
use presamples::data::{
    ExchangeType, Lookup, Matrix, MatrixStore, Resource, SampleMatrix, SeedSpec,
    BIOSPHERE_MATRIX, TECHNOSPHERE_MATRIX,
};
use presamples::error::PresamplesError;
use presamples::io::hashing::file_hash;
use presamples::io::npy::SampleArray;
use presamples::io::package::{
    append_package, create_package, read_manifest, validate, write_manifest, MatrixData,
    ParameterData,
};
use presamples::model::{ConsolidatedGroup, GroupMember};
use presamples::pipelines::PackagesDataLoader;
use std::fs;
use std::path::{Path, PathBuf};

// --- Helpers ---

fn samples(rows: Vec<Vec<f64>>) -> SampleMatrix {
    SampleMatrix::from_rows(rows).expect("Build samples")
}

fn options(dir: &Path, id: &str) -> PackageOptions {
    PackageOptions::new()
        .id(id)
        .dirpath(dir)
        .seed(SeedSpec::Sequential)
}

fn mixed_package(dir: &Path, id: &str) -> PathBuf {
    let tech = MatrixData::technosphere(
        samples(vec![vec![1.0, 2.0]]),
        &[(1, 1, ExchangeType::Production)],
    )
    .expect("Technosphere data");
    let params = ParameterData::new("p", vec!["a".into(), "b".into()], samples(vec![vec![1.0, 2.0], vec![3.0, 4.0]]));
    create_package(&[tech], &[params], &options(dir, id))
        .expect("Create package")
        .1
}

fn member(label: &str, data: &MatrixData) -> GroupMember {
    GroupMember {
        labels: data.labels.clone(),
        indices: data.indices.clone(),
        samples: SampleArray::in_memory(label, &data.samples),
    }
}

fn owner() -> MatrixStore {
    let products: Lookup = [(1, 0), (2, 1)].into_iter().collect();
    let activities: Lookup = [(1, 0), (2, 1)].into_iter().collect();
    let flows: Lookup = [(7, 0)].into_iter().collect();
    MatrixStore::new()
        .with_matrix(TECHNOSPHERE_MATRIX, 2, 2)
        .with_matrix(BIOSPHERE_MATRIX, 1, 2)
        .with_lookup("_product_dict", products)
        .with_lookup("_activity_dict", activities)
        .with_lookup("_biosphere_dict", flows)
}

// --- Integrity ---

#[test]
fn test_hashes_detect_single_byte_change() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let path = mixed_package(dir.path(), "pk");

    let manifest = validate(&path).expect("Fresh package validates");
    for resource in &manifest.resources {
        for file in resource.files() {
            assert_eq!(file_hash(&path.join(&file.filepath)).expect("Hash"), file.hash);
        }
    }

    let target = path.join("pk.1.samples.npy");
    let mut bytes = fs::read(&target).expect("Read samples");
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&target, bytes).expect("Write samples");

    match validate(&path) {
        Err(PresamplesError::HashMismatch { path: bad, expected, actual }) => {
            assert_eq!(bad, target);
            assert_ne!(expected, actual);
        }
        other => panic!("expected hash mismatch, got {:?}", other),
    }
    let first = &manifest.resources[0].samples();
    assert_eq!(file_hash(&path.join(&first.filepath)).expect("Hash"), first.hash);
}

#[test]
fn test_missing_resource_file() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let path = mixed_package(dir.path(), "gone");
    fs::remove_file(path.join("gone.1.names.json")).expect("Remove names");
    assert!(matches!(
        validate(&path),
        Err(PresamplesError::ResourceFileMissing { .. })
    ));
    assert!(matches!(
        PackagesDataLoader::new([&path], LoaderConfig::default()),
        Err(PresamplesError::ResourceFileMissing { .. })
    ));
}

#[test]
fn test_labels_naming_absent_fields_fail_load() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let path = mixed_package(dir.path(), "labels");

    let mut manifest = read_manifest(&path).expect("Manifest");
    for resource in &mut manifest.resources {
        if let Resource::Matrix(matrix) = resource {
            matrix.labels.row_to_label = "nope".to_string();
        }
    }
    write_manifest(&path, &manifest).expect("Write manifest");
    validate(&path).expect("Files and hashes are untouched");

    assert!(matches!(
        PackagesDataLoader::new([&path], LoaderConfig::default()),
        Err(PresamplesError::InvalidMetadata { .. })
    ));
}

// --- Create / append ---

#[test]
fn test_create_rejects_bad_input_before_writing() {
    let dir = tempfile::tempdir().expect("Create temp dir");

    assert!(matches!(
        create_package(&[], &[], &options(dir.path(), "none")),
        Err(PresamplesError::Config { .. })
    ));

    let dup = ParameterData::new("p", vec!["a".into(), "a".into()], samples(vec![vec![1.0], vec![2.0]]));
    match create_package(&[], &[dup], &options(dir.path(), "dup")) {
        Err(PresamplesError::NameConflict { names }) => assert_eq!(names, vec!["a".to_string()]),
        other => panic!("expected name conflict, got {:?}", other),
    }

    let short = ParameterData::new("p", vec!["a".into(), "b".into()], samples(vec![vec![1.0]]));
    assert!(matches!(
        create_package(&[], &[short], &options(dir.path(), "short")),
        Err(PresamplesError::ShapeMismatch { .. })
    ));

    let a = ParameterData::new("p", vec!["a".into()], samples(vec![vec![1.0, 2.0]]));
    let b = ParameterData::new("q", vec!["b".into()], samples(vec![vec![1.0, 2.0, 3.0]]));
    assert!(matches!(
        create_package(&[], &[a, b], &options(dir.path(), "ragged")),
        Err(PresamplesError::InconsistentSampleCount { expected: 2, found: 3 })
    ));

    for id in ["none", "dup", "short", "ragged"] {
        assert!(!dir.path().join(id).exists());
    }
}

#[test]
fn test_create_existing_directory() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    mixed_package(dir.path(), "again");
    let params = ParameterData::new("p", vec!["z".into()], samples(vec![vec![1.0]]));

    assert!(matches!(
        create_package(&[], &[params.clone()], &options(dir.path(), "again")),
        Err(PresamplesError::PackageExists { .. })
    ));

    let (_, path) = create_package(&[], &[params], &options(dir.path(), "again").overwrite(true))
        .expect("Overwrite");
    let manifest = read_manifest(&path).expect("Manifest");
    assert_eq!(manifest.resources.len(), 1);
    assert_eq!(manifest.ncols, Some(1));
    assert!(!path.join("again.0.indices.json").exists());
}

#[test]
fn test_append_extends_package() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let path = mixed_package(dir.path(), "grow");

    let wide = ParameterData::new("w", vec!["c".into()], samples(vec![vec![1.0, 2.0, 3.0]]));
    assert!(matches!(
        append_package(&path, &[], &[wide]),
        Err(PresamplesError::InconsistentSampleCount { expected: 2, found: 3 })
    ));

    let clash = ParameterData::new("w", vec!["b".into()], samples(vec![vec![1.0, 2.0]]));
    match append_package(&path, &[], &[clash]) {
        Err(PresamplesError::NameConflict { names }) => assert_eq!(names, vec!["b".to_string()]),
        other => panic!("expected name conflict, got {:?}", other),
    }

    let extra = ParameterData::new("w", vec!["c".into()], samples(vec![vec![7.0, 8.0]]));
    let (id, appended) = append_package(&path, &[], &[extra]).expect("Append");
    assert_eq!(id, "grow");
    assert_eq!(appended, path);

    let manifest = validate(&path).expect("Appended package validates");
    let indices: Vec<Option<usize>> = manifest.resources.iter().map(|r| r.index()).collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);

    let loader = PackagesDataLoader::new([&path], LoaderConfig::default()).expect("Load");
    assert_eq!(loader.parameters().value("c").expect("Read"), Some(7.0));
}

// --- Consolidation ---

#[test]
fn test_duplicate_cells_collapse_on_load() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let production = MatrixData::technosphere(
        samples(vec![vec![5.0]]),
        &[(1, 1, ExchangeType::Production)],
    )
    .expect("Technosphere data");
    let consumption = MatrixData::technosphere(
        samples(vec![vec![2.0]]),
        &[(1, 1, ExchangeType::Technosphere)],
    )
    .expect("Technosphere data");
    let bio_a = MatrixData::biosphere(samples(vec![vec![3.0]]), &[(7, 2)]).expect("Biosphere data");
    let bio_b = MatrixData::biosphere(samples(vec![vec![4.0]]), &[(7, 2)]).expect("Biosphere data");
    let (_, path) = create_package(
        &[production, bio_a, consumption, bio_b],
        &[],
        &options(dir.path(), "dups"),
    )
    .expect("Create package");

    let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).expect("Load");
    let kinds: Vec<&str> = loader.packages()[0]
        .matrix_data()
        .iter()
        .map(ConsolidatedGroup::kind)
        .collect();
    assert_eq!(kinds, vec!["biosphere", "technosphere"]);

    let mut model = owner();
    loader.index_arrays(&model);
    loader.update_matrices(Some(&mut model), None).expect("Update");
    assert_eq!(model.get(TECHNOSPHERE_MATRIX).expect("Tech").get(0, 0), 3.0);
    assert_eq!(model.get(BIOSPHERE_MATRIX).expect("Bio").get(0, 1), 7.0);
}

#[test]
fn test_mixed_exchange_types_are_ambiguous() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let data = MatrixData::technosphere(
        samples(vec![vec![1.0], vec![2.0]]),
        &[(1, 1, ExchangeType::Production), (1, 1, ExchangeType::Substitution)],
    )
    .expect("Technosphere data");
    let (_, path) = create_package(&[data], &[], &options(dir.path(), "amb")).expect("Create package");
    assert!(matches!(
        PackagesDataLoader::new([&path], LoaderConfig::default()),
        Err(PresamplesError::AmbiguousAggregation { input: 1, output: 1, .. })
    ));
}

#[test]
fn test_merge_matches_single_consolidation() {
    let a = MatrixData::technosphere(
        samples(vec![vec![5.0, 6.0], vec![1.0, 1.5]]),
        &[(1, 1, ExchangeType::Production), (2, 1, ExchangeType::Technosphere)],
    )
    .expect("Technosphere data");
    let b = MatrixData::technosphere(
        samples(vec![vec![2.0, 3.0]]),
        &[(1, 1, ExchangeType::Technosphere)],
    )
    .expect("Technosphere data");
    let c = MatrixData::technosphere(
        samples(vec![vec![0.25, 0.5]]),
        &[(2, 1, ExchangeType::Technosphere)],
    )
    .expect("Technosphere data");

    let direct = ConsolidatedGroup::consolidate(
        "technosphere",
        vec![member("a", &a), member("b", &b), member("c", &c)],
        ColumnPolicy::Strict,
    )
    .expect("Consolidate");
    let left = ConsolidatedGroup::consolidate("technosphere", vec![member("a", &a)], ColumnPolicy::Strict)
        .expect("Consolidate");
    let right = ConsolidatedGroup::consolidate(
        "technosphere",
        vec![member("b", &b), member("c", &c)],
        ColumnPolicy::Strict,
    )
    .expect("Consolidate");
    let merged = left.merge(right).expect("Merge");

    assert_eq!(merged.indices(), direct.indices());
    for column in 0..2 {
        assert_eq!(merged.sample(column).expect("Sample"), direct.sample(column).expect("Sample"));
    }
    assert_eq!(direct.sample(0).expect("Sample"), vec![3.0, -1.25]);
}
