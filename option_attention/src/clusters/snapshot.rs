//! Direction arrays and their on-disk snapshots.
//!
//! A snapshot is a (K, D) array of raw direction prototypes stored under
//! `<logdir>/cluster_models/direction_clusters_<episode>.pkl`. The payload is
//! a NumPy `.npy` array, so `numpy.load` reads it directly. Snapshots are
//! written as little-endian `f32`; `f64` files produced by NumPy are accepted
//! on load and narrowed.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy, ReadNpyError};
use serde::{Deserialize, Serialize};

use crate::error::{OptionCriticError, Result};

/// Directory (under the log directory) holding cluster snapshots.
pub const CLUSTER_MODELS_DIR: &str = "cluster_models";

/// Snapshot file extension.
pub const SNAPSHOT_EXTENSION: &str = "pkl";

/// Row-major (rows, cols) array of direction prototypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionArray {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DirectionArray {
    /// Wrap row-major data; fails if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(OptionCriticError::ShapeMismatch {
                what: "direction array",
                expected: vec![rows * cols],
                got: vec![data.len()],
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// All-zero array.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from a list of equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(OptionCriticError::ShapeMismatch {
                what: "direction row",
                expected: vec![cols],
                got: vec![bad.len()],
            });
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(rows.len(), cols, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// [rows, cols]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Row `i`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Check the array is (rows, cols).
    pub fn ensure_shape(&self, rows: usize, cols: usize) -> Result<()> {
        if self.shape() != [rows, cols] {
            return Err(OptionCriticError::ShapeMismatch {
                what: "direction clusters",
                expected: vec![rows, cols],
                got: self.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Upload as a [rows, cols] tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(TensorData::new(self.data.clone(), [self.rows, self.cols]), device)
    }

    /// Download a [rows, cols] tensor.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 2>) -> Self {
        let [rows, cols] = tensor.dims();
        let data = tensor.into_data().iter::<f32>().collect();
        Self { rows, cols, data }
    }
}

/// `<logdir>/cluster_models/direction_clusters_<episode>.pkl`
pub fn snapshot_path(logdir: impl AsRef<Path>, episode: &str) -> PathBuf {
    logdir
        .as_ref()
        .join(CLUSTER_MODELS_DIR)
        .join(format!("direction_clusters_{}.{}", episode, SNAPSHOT_EXTENSION))
}

fn snapshot_error(path: &Path, reason: impl ToString) -> OptionCriticError {
    OptionCriticError::Snapshot {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write a snapshot, creating parent directories.
pub fn save_snapshot(path: impl AsRef<Path>, array: &DirectionArray) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let matrix = Array2::from_shape_vec((array.rows, array.cols), array.data.clone())
        .map_err(|e| snapshot_error(path, e))?;
    write_npy(path, &matrix).map_err(|e| snapshot_error(path, e))
}

/// Read a snapshot.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<DirectionArray> {
    let path = path.as_ref();
    fs::metadata(path)?;

    let matrix: Array2<f32> = match read_npy(path) {
        Ok(matrix) => matrix,
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let wide: Array2<f64> = read_npy(path).map_err(|e| snapshot_error(path, e))?;
            wide.mapv(|v| v as f32)
        }
        Err(ReadNpyError::WrongNdim(_, got)) => {
            return Err(OptionCriticError::ShapeMismatch {
                what: "direction snapshot rank",
                expected: vec![2],
                got: vec![got],
            })
        }
        Err(e) => return Err(snapshot_error(path, e)),
    };

    let (rows, cols) = matrix.dim();
    // Logical iteration order is row-major regardless of the file's layout
    DirectionArray::new(rows, cols, matrix.iter().copied().collect())
}
