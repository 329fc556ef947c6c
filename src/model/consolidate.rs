//! # Consolidation
//!
//! ## Role
//! Merges the matrix resources of one package that share a `type` into a
//! single group: one index array, one sample reader, one destination matrix.
//!
//! ## Steps
//! 1. All members must name the same matrix and the same row/col labels and
//!    dictionaries (`ConflictingLabels`).
//! 2. All members must share one index layout (`IncompatibleIndices`).
//! 3. Index arrays and sample files are stacked in member order.
//! 4. Rows addressing the same cell are collapsed (`collapse_matrix_indices`).
//!
//! ## Cell collapse
//! Cells are keyed by `(row from, col from)` identifiers. A cell with several
//! rows becomes one row, at the position of its first occurrence:
//! - all rows share one exchange type: values are summed
//! - exactly production + technosphere: the production row is kept and
//!   technosphere values are subtracted from it
//! - anything else: `AmbiguousAggregation`
//!
//! The collapse is stored as a plan (source rows and signs per output row) and
//! applied to each sampled column, so sample files are never rewritten.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace, warn};

use crate::config::ColumnPolicy;
use crate::data::{ExchangeType, IndexArray, Lookup, MatrixLabels, MAX_SIGNED_32BIT_INT};
use crate::error::{PresamplesError, Result};
use crate::io::npy::SampleArray;
use crate::io::package::validate_matrix_metadata;
use crate::model::sample_arrays::SampleArrays;

/// One matrix resource, loaded and ready to be consolidated
#[derive(Debug)]
pub struct GroupMember {
    pub labels: MatrixLabels,
    pub indices: IndexArray,
    pub samples: SampleArray,
}

/// Output row -> contributing stacked rows with their signs
#[derive(Clone, Debug, PartialEq)]
pub struct CollapsePlan {
    indices: IndexArray,
    sources: Vec<Vec<(usize, f64)>>,
    identity: bool,
}

impl CollapsePlan {
    /// Collapsed index array, one record per unique cell
    pub fn indices(&self) -> &IndexArray {
        &self.indices
    }

    /// Contributing `(source row, sign)` pairs for each output row
    pub fn sources(&self) -> &[Vec<(usize, f64)>] {
        &self.sources
    }

    /// No cell appeared more than once
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Fold one uncollapsed sample column into one value per unique cell
    pub fn apply(&self, raw: &[f64]) -> Vec<f64> {
        if self.identity {
            return raw.to_vec();
        }
        self.sources
            .iter()
            .map(|parts| parts.iter().map(|&(row, sign)| sign * raw[row]).sum())
            .collect()
    }
}

/// Collapse records that target the same cell.
///
/// `labels` says which fields identify the cell; the exchange type is read
/// from the `type` field when the layout has one.
pub fn collapse_matrix_indices(indices: &IndexArray, labels: &MatrixLabels) -> Result<CollapsePlan> {
    let row_from = indices
        .field_position(&labels.row_from_label)
        .ok_or_else(|| missing_field(&labels.row_from_label))?;
    let col_from = match &labels.col_from_label {
        Some(label) => Some(
            indices
                .field_position(label)
                .ok_or_else(|| missing_field(label))?,
        ),
        None => None,
    };
    let tag_field = indices.field_position(ExchangeType::FIELD);

    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut cells: HashMap<(u64, Option<u64>), usize> = HashMap::with_capacity(indices.len());
    for row in 0..indices.len() {
        let key = (
            indices.get(row, row_from),
            col_from.map(|c| indices.get(row, c)),
        );
        let slot = *cells.entry(key).or_insert_with(|| {
            order.push(Vec::new());
            order.len() - 1
        });
        order[slot].push(row);
    }

    if order.len() == indices.len() {
        return Ok(CollapsePlan {
            indices: indices.clone(),
            sources: (0..indices.len()).map(|row| vec![(row, 1.0)]).collect(),
            identity: true,
        });
    }

    let tag = |row: usize| tag_field.map(|f| indices.get(row, f));
    let production = ExchangeType::Production.code();
    let technosphere = ExchangeType::Technosphere.code();

    let mut keep = Vec::with_capacity(order.len());
    let mut sources = Vec::with_capacity(order.len());
    for rows in &order {
        if rows.len() == 1 {
            keep.push(rows[0]);
            sources.push(vec![(rows[0], 1.0)]);
            continue;
        }
        let tags: BTreeSet<Option<u64>> = rows.iter().map(|&r| tag(r)).collect();
        if tags.len() == 1 {
            keep.push(rows[0]);
            sources.push(rows.iter().map(|&r| (r, 1.0)).collect());
        } else if tags == BTreeSet::from([Some(production), Some(technosphere)]) {
            let anchor = rows
                .iter()
                .copied()
                .find(|&r| tag(r) == Some(production))
                .unwrap_or(rows[0]);
            keep.push(anchor);
            sources.push(
                rows.iter()
                    .map(|&r| {
                        let sign = if tag(r) == Some(technosphere) { -1.0 } else { 1.0 };
                        (r, sign)
                    })
                    .collect(),
            );
        } else {
            let first = rows[0];
            return Err(PresamplesError::AmbiguousAggregation {
                input: indices.get(first, row_from),
                output: col_from.map_or(indices.get(first, row_from), |c| indices.get(first, c)),
                tags: tags.into_iter().flatten().collect(),
            });
        }
        trace!(rows = ?rows, "Collapsed duplicate cell");
    }

    debug!(
        rows = indices.len(),
        cells = keep.len(),
        "Collapsed duplicate matrix cells"
    );
    Ok(CollapsePlan {
        indices: indices.select(&keep),
        sources,
        identity: false,
    })
}

fn missing_field(label: &str) -> PresamplesError {
    PresamplesError::invalid_metadata(format!("index field '{}' not found", label))
}

/// Negate sampled values of rows tagged technosphere (inputs are consumed)
pub fn fix_supply_use(indices: &IndexArray, sample: &mut [f64]) {
    let Some(field) = indices.field_position(ExchangeType::FIELD) else {
        return;
    };
    let technosphere = ExchangeType::Technosphere.code();
    for (row, value) in sample.iter_mut().enumerate() {
        if indices.get(row, field) == technosphere {
            *value = -*value;
        }
    }
}

/// Same-typed matrix resources of one package, merged
#[derive(Debug)]
pub struct ConsolidatedGroup {
    kind: String,
    labels: MatrixLabels,
    /// Stacked, uncollapsed records
    raw: IndexArray,
    plan: CollapsePlan,
    samples: SampleArrays,
    indexed: bool,
}

impl ConsolidatedGroup {
    /// Merge `members` (in order) into one group
    pub fn consolidate(
        kind: &str,
        members: Vec<GroupMember>,
        policy: ColumnPolicy,
    ) -> Result<Self> {
        let Some(first) = members.first() else {
            return Err(PresamplesError::invalid_metadata(format!(
                "no resources to consolidate for '{}'",
                kind
            )));
        };
        let labels = first.labels.clone();
        validate_matrix_metadata(&labels, &first.indices)?;

        for member in &members {
            check_compatible(kind, &labels, &first.indices, &member.labels, &member.indices)?;
            if member.samples.n_rows() != member.indices.len() {
                return Err(PresamplesError::shape_mismatch(format!(
                    "{} has {} sample rows but {} index rows",
                    member.samples.path().display(),
                    member.samples.n_rows(),
                    member.indices.len()
                )));
            }
        }

        let parts: Vec<&IndexArray> = members.iter().map(|m| &m.indices).collect();
        let raw = IndexArray::concat(&parts)
            .ok_or_else(|| PresamplesError::incompatible_indices(kind, "index layouts differ"))?;
        let plan = collapse_matrix_indices(&raw, &labels)?;
        let samples = SampleArrays::new(members.into_iter().map(|m| m.samples).collect(), policy);

        debug!(
            kind,
            matrix = %labels.matrix,
            rows = raw.len(),
            cells = plan.indices().len(),
            "Consolidated matrix resources"
        );
        Ok(Self {
            kind: kind.to_string(),
            labels,
            raw,
            plan,
            samples,
            indexed: false,
        })
    }

    /// Append another group of the same kind; the result equals consolidating
    /// all members at once.
    pub fn merge(mut self, other: ConsolidatedGroup) -> Result<Self> {
        if other.kind != self.kind {
            return Err(PresamplesError::conflicting_labels(
                &self.kind,
                format!("cannot merge '{}' resources", other.kind),
            ));
        }
        check_compatible(&self.kind, &self.labels, &self.raw, &other.labels, &other.raw)?;
        let raw = IndexArray::concat(&[&self.raw, &other.raw]).ok_or_else(|| {
            PresamplesError::incompatible_indices(&self.kind, "index layouts differ")
        })?;
        self.plan = collapse_matrix_indices(&raw, &self.labels)?;
        self.raw = raw;
        self.samples.extend(other.samples);
        self.indexed = false;
        Ok(self)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn labels(&self) -> &MatrixLabels {
        &self.labels
    }

    pub fn matrix(&self) -> &str {
        &self.labels.matrix
    }

    /// Collapsed records, one per destination cell
    pub fn indices(&self) -> &IndexArray {
        self.plan.indices()
    }

    /// Stacked records before collapsing
    pub fn raw_indices(&self) -> &IndexArray {
        &self.raw
    }

    pub fn plan(&self) -> &CollapsePlan {
        &self.plan
    }

    pub fn samples(&self) -> &SampleArrays {
        &self.samples
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Fill `row to`/`col to` fields from the owner's lookup dictionaries.
    ///
    /// Identifiers missing from a dictionary keep the placeholder.
    pub fn index_with(&mut self, rows: &Lookup, cols: Option<&Lookup>) {
        let labels = &self.labels;
        let mut unmapped = translate(
            &mut self.plan.indices,
            &labels.row_from_label,
            &labels.row_to_label,
            rows,
        );
        if let (Some((from, to, _)), Some(cols)) = (labels.col_labels(), cols) {
            unmapped += translate(&mut self.plan.indices, from, to, cols);
        }
        if unmapped > 0 {
            warn!(
                matrix = %self.labels.matrix,
                unmapped,
                "Identifiers missing from lookup dictionary"
            );
        }
        self.indexed = true;
    }

    /// Values for each collapsed cell at `column`
    pub fn sample(&self, column: usize) -> Result<Vec<f64>> {
        let raw = self.samples.sample(column)?;
        let mut values = self.plan.apply(&raw);
        if self.kind == "technosphere" {
            fix_supply_use(self.plan.indices(), &mut values);
        }
        Ok(values)
    }

    /// `(row, col)` of each collapsed cell, `(row, row)` without column labels.
    ///
    /// `None` for cells left at the placeholder.
    pub fn targets(&self) -> Vec<Option<(usize, usize)>> {
        let indices = self.plan.indices();
        let row_to = indices.field_position(&self.labels.row_to_label);
        let col_to = self
            .labels
            .col_to_label
            .as_deref()
            .and_then(|label| indices.field_position(label));
        (0..indices.len())
            .map(|i| {
                let row = mapped(indices.get(i, row_to?))?;
                let col = match col_to {
                    Some(c) => mapped(indices.get(i, c))?,
                    None => row,
                };
                Some((row, col))
            })
            .collect()
    }
}

#[inline]
fn mapped(value: u64) -> Option<usize> {
    (value != MAX_SIGNED_32BIT_INT).then_some(value as usize)
}

/// Returns the number of identifiers not found in `lookup`
fn translate(indices: &mut IndexArray, from: &str, to: &str, lookup: &Lookup) -> usize {
    let (Some(from), Some(to)) = (indices.field_position(from), indices.field_position(to)) else {
        return 0;
    };
    let mut unmapped = 0;
    for row in 0..indices.len() {
        match lookup.get(&indices.get(row, from)) {
            Some(&target) => indices.set(row, to, target as u64),
            None => unmapped += 1,
        }
    }
    unmapped
}

fn check_compatible(
    kind: &str,
    labels: &MatrixLabels,
    indices: &IndexArray,
    other_labels: &MatrixLabels,
    other_indices: &IndexArray,
) -> Result<()> {
    if other_labels.matrix != labels.matrix {
        return Err(PresamplesError::conflicting_labels(
            kind,
            format!("matrices '{}' and '{}'", labels.matrix, other_labels.matrix),
        ));
    }
    if other_labels != labels {
        return Err(PresamplesError::conflicting_labels(
            kind,
            format!("{:?} vs {:?}", labels, other_labels),
        ));
    }
    if !other_indices.same_dtype(indices) {
        return Err(PresamplesError::incompatible_indices(
            kind,
            format!("{:?} vs {:?}", indices.fields(), other_indices.fields()),
        ));
    }
    Ok(())
}
