//! # In-Memory Sample Matrices
//!
//! Row-major `rows x cols` block of presampled values, as handed to the package
//! writer. Each row is one matrix cell or named parameter, each column one
//! Monte-Carlo iteration.

use crate::error::{PresamplesError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct SampleMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl SampleMatrix {
    /// Create from row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(PresamplesError::shape_mismatch(format!(
                "{} values cannot fill a {}x{} sample matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Create from equal-length rows
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(PresamplesError::InconsistentSampleCount {
                expected: cols,
                found: bad.len(),
            });
        }
        let n_rows = rows.len();
        Ok(Self {
            rows: n_rows,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// A single row of samples (1-D input is treated as one row)
    pub fn from_vector(values: Vec<f64>) -> Self {
        Self {
            rows: 1,
            cols: values.len(),
            data: values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Raw row-major values
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// New matrix holding the given rows in the given order
    pub fn select_rows(&self, rows: &[usize]) -> SampleMatrix {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &row in rows {
            data.extend_from_slice(self.row(row));
        }
        SampleMatrix {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let m = SampleMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.shape(), [2, 2]);
        assert_eq!(m.get(1, 0), 3.0);
        assert_eq!(m.row(0), &[1.0, 2.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = SampleMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(
            err,
            PresamplesError::InconsistentSampleCount {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_new_checks_length() {
        assert!(SampleMatrix::new(2, 3, vec![0.0; 6]).is_ok());
        assert!(SampleMatrix::new(2, 3, vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_select_rows() {
        let m = SampleMatrix::from_rows(vec![vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let picked = m.select_rows(&[2, 0]);
        assert_eq!(picked.as_slice(), &[3.0, 1.0]);
    }
}
