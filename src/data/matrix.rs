//! # Matrix Owners
//!
//! ## Role
//! The capability interface the loader writes through. A host model (the
//! thing that builds the real technosphere/biosphere/characterization
//! matrices) implements `MatrixOwner`; the loader only ever asks it for a
//! lookup dictionary or a mutable matrix by name.
//!
//! `SparseMatrix` and `MatrixStore` are a small dictionary-of-keys
//! implementation of both traits, enough to drive the loader end-to-end.

use std::collections::HashMap;

/// External identifier -> matrix row or column number
pub type Lookup = HashMap<u64, usize>;

/// Coordinate-assignable 2-D numeric structure
pub trait Matrix {
    /// `(rows, cols)`
    fn shape(&self) -> (usize, usize);

    fn get(&self, row: usize, col: usize) -> f64;

    /// Assign one cell; callers check bounds against `shape()`
    fn set(&mut self, row: usize, col: usize, value: f64);
}

/// Named lookup dictionaries and destination matrices
pub trait MatrixOwner {
    /// Dictionary named by a resource's `row dict`, if built yet
    fn lookup_row(&self, name: &str) -> Option<&Lookup>;

    /// Dictionary named by a resource's `col dict`, if built yet
    fn lookup_col(&self, name: &str) -> Option<&Lookup> {
        self.lookup_row(name)
    }

    /// Destination matrix named by a resource's `matrix`
    fn matrix(&mut self, name: &str) -> Option<&mut dyn Matrix>;

    /// Drop anything derived from the technosphere matrix contents
    fn invalidate_factorization(&mut self) {}
}

/// Dictionary-of-keys sparse matrix
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    values: HashMap<(usize, usize), f64>,
}

impl SparseMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: HashMap::new(),
        }
    }

    /// Number of explicitly stored cells
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Sum over all stored cells
    pub fn sum(&self) -> f64 {
        self.values.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}

impl Matrix for SparseMatrix {
    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        self.values.get(&(row, col)).copied().unwrap_or(0.0)
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.rows && col < self.cols);
        self.values.insert((row, col), value);
    }
}

/// Named matrices and lookup dictionaries, with a factorization flag
/// standing in for a cached solver.
#[derive(Clone, Debug, Default)]
pub struct MatrixStore {
    matrices: HashMap<String, SparseMatrix>,
    lookups: HashMap<String, Lookup>,
    factorized: bool,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matrix(mut self, name: &str, rows: usize, cols: usize) -> Self {
        self.matrices
            .insert(name.to_string(), SparseMatrix::new(rows, cols));
        self
    }

    pub fn with_lookup(mut self, name: &str, lookup: Lookup) -> Self {
        self.lookups.insert(name.to_string(), lookup);
        self
    }

    /// Add or replace a lookup dictionary (e.g. once a later build stage finishes)
    pub fn insert_lookup(&mut self, name: &str, lookup: Lookup) {
        self.lookups.insert(name.to_string(), lookup);
    }

    pub fn remove_lookup(&mut self, name: &str) -> Option<Lookup> {
        self.lookups.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&SparseMatrix> {
        self.matrices.get(name)
    }

    /// Record that a factorization of the technosphere matrix is cached
    pub fn set_factorized(&mut self) {
        self.factorized = true;
    }

    pub fn is_factorized(&self) -> bool {
        self.factorized
    }
}

impl MatrixOwner for MatrixStore {
    fn lookup_row(&self, name: &str) -> Option<&Lookup> {
        self.lookups.get(name)
    }

    fn matrix(&mut self, name: &str) -> Option<&mut dyn Matrix> {
        self.matrices
            .get_mut(name)
            .map(|m| m as &mut dyn Matrix)
    }

    fn invalidate_factorization(&mut self) {
        self.factorized = false;
    }
}
