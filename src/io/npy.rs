//! # Sample Files (`.npy`)
//!
//! Memory-mapped access to 2-D numeric sample arrays in NumPy's `.npy` format,
//! so that a package far larger than memory can be replayed column by column.
//!
//! Format:
//! - [Magic 6 bytes] `\x93NUMPY`
//! - [Version 2 bytes] major, minor
//! - [Header length] u16 (v1) or u32 (v2, v3), little endian
//! - [Header] Python dict literal: `descr`, `fortran_order`, `shape`
//! - [Data] `rows * cols` little-endian scalars, C or Fortran order
//!
//! The header is decoded with `npyz`; element reads go straight to the map.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use bytemuck::pod_read_unaligned;
use memmap2::Mmap;
use npyz::WriterBuilder;
use tracing::info_span;

use crate::data::SampleMatrix;
use crate::error::{PresamplesError, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Scalar types accepted in sample files
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleDtype {
    F64,
    F32,
    I64,
    I32,
}

impl SampleDtype {
    /// Parse a little-endian numpy type string (`<f8`, `<i4`, ...)
    pub fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "<f8" => Some(SampleDtype::F64),
            "<f4" => Some(SampleDtype::F32),
            "<i8" => Some(SampleDtype::I64),
            "<i4" => Some(SampleDtype::I32),
            _ => None,
        }
    }

    pub fn descr(self) -> &'static str {
        match self {
            SampleDtype::F64 => "<f8",
            SampleDtype::F32 => "<f4",
            SampleDtype::I64 => "<i8",
            SampleDtype::I32 => "<i4",
        }
    }

    pub fn size(self) -> usize {
        match self {
            SampleDtype::F64 | SampleDtype::I64 => 8,
            SampleDtype::F32 | SampleDtype::I32 => 4,
        }
    }

    #[inline]
    fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            SampleDtype::F64 => pod_read_unaligned::<f64>(bytes),
            SampleDtype::F32 => pod_read_unaligned::<f32>(bytes) as f64,
            SampleDtype::I64 => pod_read_unaligned::<i64>(bytes) as f64,
            SampleDtype::I32 => pod_read_unaligned::<i32>(bytes) as f64,
        }
    }
}

#[derive(Debug)]
enum Storage {
    /// Memory-mapped file, data starting at `offset`
    Mapped { mmap: Mmap, offset: usize },
    /// Row-major values held in memory
    Owned(Vec<f64>),
}

/// One 2-D sample array: rows are cells/parameters, columns are iterations
#[derive(Debug)]
pub struct SampleArray {
    path: PathBuf,
    rows: usize,
    cols: usize,
    dtype: SampleDtype,
    fortran_order: bool,
    storage: Storage,
}

impl SampleArray {
    /// Memory-map an `.npy` file
    pub fn open(path: &Path) -> Result<Self> {
        info_span!("npy_open", path = ?path).in_scope(|| {
            let file = File::open(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PresamplesError::ResourceFileMissing {
                    path: path.to_path_buf(),
                },
                _ => PresamplesError::Io(e),
            })?;
            // Safety: package files are write-once and never modified while loaded
            let mmap = unsafe { Mmap::map(&file)? };

            let offset = data_offset(&mmap).ok_or_else(|| {
                PresamplesError::format(path, "not an .npy file (bad magic or header)")
            })?;

            let npy = npyz::NpyFile::new(&mmap[..])?;
            let descr = match npy.dtype() {
                npyz::DType::Plain(ts) => ts.to_string(),
                other => {
                    return Err(PresamplesError::format(
                        path,
                        format!("unsupported sample dtype {:?}", other),
                    ))
                }
            };
            let dtype = SampleDtype::from_descr(&descr).ok_or_else(|| {
                PresamplesError::format(path, format!("unsupported sample dtype '{}'", descr))
            })?;
            let (rows, cols) = match npy.shape() {
                [n] => (1, *n as usize),
                [r, c] => (*r as usize, *c as usize),
                other => {
                    return Err(PresamplesError::format(
                        path,
                        format!("sample arrays must be 1-D or 2-D, got shape {:?}", other),
                    ))
                }
            };
            let fortran_order = matches!(npy.order(), npyz::Order::Fortran);

            let needed = data_end(offset, rows, cols, dtype).ok_or_else(|| {
                PresamplesError::format(
                    path,
                    format!("shape ({}, {}) too large to address", rows, cols),
                )
            })?;
            if mmap.len() < needed {
                return Err(PresamplesError::format(
                    path,
                    format!("truncated data: {} bytes, need {}", mmap.len(), needed),
                ));
            }

            Ok(Self {
                path: path.to_path_buf(),
                rows,
                cols,
                dtype,
                fortran_order,
                storage: Storage::Mapped { mmap, offset },
            })
        })
    }

    /// Wrap an in-memory matrix; `label` stands in for the path in errors
    pub fn in_memory(label: impl Into<PathBuf>, matrix: &SampleMatrix) -> Self {
        Self {
            path: label.into(),
            rows: matrix.n_rows(),
            cols: matrix.n_cols(),
            dtype: SampleDtype::F64,
            fortran_order: false,
            storage: Storage::Owned(matrix.as_slice().to_vec()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    pub fn dtype(&self) -> SampleDtype {
        self.dtype
    }

    /// Value at `(row, col)`; both must be in range
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.rows && col < self.cols);
        match &self.storage {
            Storage::Owned(values) => values[row * self.cols + col],
            Storage::Mapped { mmap, offset } => {
                let idx = if self.fortran_order {
                    col * self.rows + row
                } else {
                    row * self.cols + col
                };
                let start = offset + idx * self.dtype.size();
                self.dtype.decode(&mmap[start..start + self.dtype.size()])
            }
        }
    }

    /// Append column `col` (one value per row) to `out`
    pub fn extend_column(&self, col: usize, out: &mut Vec<f64>) {
        out.reserve(self.rows);
        out.extend((0..self.rows).map(|row| self.value(row, col)));
    }

    /// Every sample of one row
    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.cols).map(|col| self.value(row, col)).collect()
    }
}

/// Byte offset of the data block, or None if this is not an `.npy` buffer
fn data_offset(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 10 || &bytes[0..6] != MAGIC {
        return None;
    }
    let offset = match bytes[6] {
        1 => 10 + u16::from_le_bytes([bytes[8], bytes[9]]) as usize,
        2 | 3 => {
            if bytes.len() < 12 {
                return None;
            }
            12 + u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize
        }
        _ => return None,
    };
    (offset <= bytes.len()).then_some(offset)
}

/// End of the data block, `None` on overflow
fn data_end(offset: usize, rows: usize, cols: usize, dtype: SampleDtype) -> Option<usize> {
    rows.checked_mul(cols)?
        .checked_mul(dtype.size())?
        .checked_add(offset)
}

/// Write a sample matrix as a C-order `<f8` `.npy` file
pub fn write_samples(path: &Path, matrix: &SampleMatrix) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = npyz::WriteOptions::<f64>::new()
        .default_dtype()
        .shape(&[matrix.n_rows() as u64, matrix.n_cols() as u64])
        .writer(file)
        .begin_nd()?;
    writer.extend(matrix.as_slice().iter().copied())?;
    writer.finish()?;
    Ok(())
}
