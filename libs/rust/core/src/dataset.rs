//! Tabular dataset handling: the matrix primitive, CSV ingestion, and the
//! seeded train/test split.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{CoreError, Result};
use crate::features::{FEATURE_NAMES, TARGET_NAME};

/// Row-major matrix of f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Builds a matrix from row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(CoreError::ShapeMismatch {
                expected: format!("{rows}x{cols} ({} values)", rows * cols),
                actual: format!("{} values", data.len()),
            });
        }
        Ok(Self { data, rows, cols })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    /// Element at (row, col). Panics on out-of-bounds indices.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// One sample as a slice.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// New matrix holding the given rows, in order. Indices may repeat,
    /// which is what bootstrap sampling relies on.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            data.extend_from_slice(self.row(idx));
        }
        Matrix {
            data,
            rows: indices.len(),
            cols: self.cols,
        }
    }
}

/// Features plus target column, as loaded from disk.
#[derive(Debug, Clone)]
pub struct HousingDataset {
    pub features: Matrix,
    pub targets: Vec<f32>,
}

impl HousingDataset {
    /// Loads a CSV with a header row containing the eight feature columns
    /// and the target column. Column order in the file does not matter;
    /// values are re-mapped into training order. Any missing column,
    /// unparseable cell, or non-finite value is a fatal error.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        let column_index = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| CoreError::Dataset(format!("missing column {name} in {}", path.display())))
        };
        let feature_cols: Vec<usize> = FEATURE_NAMES
            .iter()
            .map(|name| column_index(name))
            .collect::<Result<_>>()?;
        let target_col = column_index(TARGET_NAME)?;

        let mut data = Vec::new();
        let mut targets = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let parse = |col: usize| -> Result<f32> {
                let raw = record.get(col).ok_or_else(|| {
                    CoreError::Dataset(format!("row {}: too few columns", line + 2))
                })?;
                let value: f32 = raw.trim().parse().map_err(|_| {
                    CoreError::Dataset(format!("row {}: non-numeric value {raw:?}", line + 2))
                })?;
                if !value.is_finite() {
                    return Err(CoreError::Dataset(format!(
                        "row {}: non-finite value {raw:?}",
                        line + 2
                    )));
                }
                Ok(value)
            };
            for &col in &feature_cols {
                data.push(parse(col)?);
            }
            targets.push(parse(target_col)?);
        }

        if targets.is_empty() {
            return Err(CoreError::Dataset(format!("{} holds no samples", path.display())));
        }
        let features = Matrix::from_vec(targets.len(), FEATURE_NAMES.len(), data)?;
        Ok(Self { features, targets })
    }

    pub fn n_samples(&self) -> usize {
        self.targets.len()
    }
}

/// Splits samples into train and test partitions after a seeded shuffle.
///
/// The same seed over the same data always produces the same partitions.
pub fn train_test_split(
    x: &Matrix,
    y: &[f32],
    test_size: f32,
    seed: u64,
) -> Result<(Matrix, Matrix, Vec<f32>, Vec<f32>)> {
    let n_samples = x.n_rows();
    if n_samples != y.len() {
        return Err(CoreError::ShapeMismatch {
            expected: format!("{n_samples} targets"),
            actual: format!("{} targets", y.len()),
        });
    }
    if !(0.0..1.0).contains(&test_size) || test_size <= 0.0 {
        return Err(CoreError::Dataset(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let n_test = (n_samples as f32 * test_size).round() as usize;
    let n_train = n_samples - n_test;
    if n_test == 0 || n_train == 0 {
        return Err(CoreError::Dataset(format!(
            "split leaves an empty partition (train={n_train}, test={n_test})"
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (train_idx, test_idx) = indices.split_at(n_train);
    let x_train = x.select_rows(train_idx);
    let x_test = x.select_rows(test_idx);
    let y_train = train_idx.iter().map(|&i| y[i]).collect();
    let y_test = test_idx.iter().map(|&i| y[i]).collect();
    Ok((x_train, x_test, y_train, y_test))
}
