//! # Sample Array Reader
//!
//! ## Role
//! Ordered list of sample arrays read as one. `sample(column)` stacks
//! `array[:, column]` of every array in registration order, so the result has
//! one value per row of every array.
//!
//! Only the requested column is read from each mapped file.

use std::path::Path;

use crate::config::ColumnPolicy;
use crate::error::{PresamplesError, Result};
use crate::io::npy::SampleArray;

#[derive(Debug)]
pub struct SampleArrays {
    arrays: Vec<SampleArray>,
    /// Row offset of each array in the stacked result, plus the total
    offsets: Vec<usize>,
    policy: ColumnPolicy,
}

impl SampleArrays {
    pub fn new(arrays: Vec<SampleArray>, policy: ColumnPolicy) -> Self {
        let mut offsets = Vec::with_capacity(arrays.len() + 1);
        let mut total = 0;
        offsets.push(0);
        for array in &arrays {
            total += array.n_rows();
            offsets.push(total);
        }
        Self {
            arrays,
            offsets,
            policy,
        }
    }

    /// Memory-map each file in order
    pub fn open<P: AsRef<Path>>(paths: &[P], policy: ColumnPolicy) -> Result<Self> {
        let arrays = paths
            .iter()
            .map(|p| SampleArray::open(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(arrays, policy))
    }

    /// Stack another reader's arrays after this one's
    pub fn extend(&mut self, other: SampleArrays) {
        for array in other.arrays {
            let total = self.n_rows() + array.n_rows();
            self.arrays.push(array);
            self.offsets.push(total);
        }
    }

    pub fn arrays(&self) -> &[SampleArray] {
        &self.arrays
    }

    pub fn policy(&self) -> ColumnPolicy {
        self.policy
    }

    /// Rows in the stacked result
    pub fn n_rows(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// One value per row of every array, at `column`
    pub fn sample(&self, column: usize) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.n_rows());
        for array in &self.arrays {
            let col = self.resolve(array, column)?;
            array.extend_column(col, &mut out);
        }
        Ok(out)
    }

    /// Single stacked row at `column`
    pub fn value(&self, row: usize, column: usize) -> Result<Option<f64>> {
        let Some((i, local)) = self.translate_row(row) else {
            return Ok(None);
        };
        let array = &self.arrays[i];
        let col = self.resolve(array, column)?;
        Ok(Some(array.value(local, col)))
    }

    /// Every sample of one stacked row
    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        let (i, local) = self.translate_row(row)?;
        Some(self.arrays[i].row(local))
    }

    /// Stacked row -> `(array position, row within that array)`
    pub fn translate_row(&self, row: usize) -> Option<(usize, usize)> {
        if row >= self.n_rows() {
            return None;
        }
        // offsets is sorted; the owning array is the last offset <= row
        let i = self.offsets.partition_point(|&start| start <= row) - 1;
        Some((i, row - self.offsets[i]))
    }

    fn resolve(&self, array: &SampleArray, column: usize) -> Result<usize> {
        self.policy
            .resolve(column, array.n_cols())
            .ok_or_else(|| PresamplesError::ColumnOutOfRange {
                column,
                ncols: array.n_cols(),
                path: array.path().to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleMatrix;

    fn array(label: &str, rows: Vec<Vec<f64>>) -> SampleArray {
        SampleArray::in_memory(label, &SampleMatrix::from_rows(rows).unwrap())
    }

    fn reader(policy: ColumnPolicy) -> SampleArrays {
        SampleArrays::new(
            vec![
                array("a", vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]),
                array("b", vec![vec![10.0, 20.0]]),
            ],
            policy,
        )
    }

    #[test]
    fn test_sample_stacks_columns() {
        let r = reader(ColumnPolicy::Strict);
        assert_eq!(r.n_rows(), 3);
        assert_eq!(r.sample(1).unwrap(), vec![2.0, 5.0, 20.0]);
    }

    #[test]
    fn test_strict_rejects_out_of_range() {
        let r = reader(ColumnPolicy::Strict);
        match r.sample(2) {
            Err(PresamplesError::ColumnOutOfRange { column, ncols, path }) => {
                assert_eq!((column, ncols), (2, 2));
                assert_eq!(path, Path::new("b"));
            }
            other => panic!("expected ColumnOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_wrap_uses_each_width() {
        let r = reader(ColumnPolicy::Wrap);
        assert_eq!(r.sample(2).unwrap(), vec![3.0, 6.0, 10.0]);
    }

    #[test]
    fn test_translate_row_and_value() {
        let r = reader(ColumnPolicy::Strict);
        assert_eq!(r.translate_row(0), Some((0, 0)));
        assert_eq!(r.translate_row(2), Some((1, 0)));
        assert_eq!(r.translate_row(3), None);
        assert_eq!(r.value(1, 2).unwrap(), Some(6.0));
        assert_eq!(r.row(2), Some(vec![10.0, 20.0]));
    }

    #[test]
    fn test_extend() {
        let mut r = reader(ColumnPolicy::Strict);
        r.extend(SampleArrays::new(
            vec![array("c", vec![vec![7.0, 8.0]])],
            ColumnPolicy::Strict,
        ));
        assert_eq!(r.n_rows(), 4);
        assert_eq!(r.sample(0).unwrap(), vec![1.0, 4.0, 10.0, 7.0]);
    }
}
