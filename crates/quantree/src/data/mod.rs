//! Datasets for classification.
//!
//! A [`Dataset`] is a dense `[n_samples, n_features]` feature matrix paired
//! with one integer label per sample. Datasets come from the breast-cancer
//! CSV loader in [`loaders`] or the seeded generator in [`synthetic`].

pub mod loaders;
pub mod synthetic;

use std::path::PathBuf;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};

pub use loaders::{BREAST_CANCER_ENV, load_breast_cancer, parse_sklearn_csv};
pub use synthetic::{ClassificationParams, make_classification};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building, loading or generating datasets.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("{field} has {got} samples, expected {expected}")]
    ShapeMismatch {
        expected: usize,
        got: usize,
        field: &'static str,
    },

    #[error("dataset has no samples")]
    EmptySamples,

    #[error("dataset has no features")]
    EmptyFeatures,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid generator parameter {name}: {reason}")]
    InvalidGenerator { name: &'static str, reason: String },
}

// =============================================================================
// Dataset
// =============================================================================

/// Feature matrix plus integer class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Array1<i64>,
}

impl Dataset {
    /// Create a dataset, checking that rows and labels line up.
    pub fn new(features: Array2<f64>, labels: Array1<i64>) -> Result<Self, DatasetError> {
        if features.ncols() == 0 {
            return Err(DatasetError::EmptyFeatures);
        }
        if features.nrows() == 0 {
            return Err(DatasetError::EmptySamples);
        }
        if labels.len() != features.nrows() {
            return Err(DatasetError::ShapeMismatch {
                expected: features.nrows(),
                got: labels.len(),
                field: "labels",
            });
        }
        Ok(Self { features, labels })
    }

    #[inline]
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    #[inline]
    pub fn labels(&self) -> ArrayView1<'_, i64> {
        self.labels.view()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Sorted distinct labels.
    pub fn classes(&self) -> Vec<i64> {
        unique_labels(self.labels.view())
    }

    pub fn n_classes(&self) -> usize {
        self.classes().len()
    }

    /// The first `n` rows (all rows when `n` exceeds the sample count).
    pub fn head(&self, n: usize) -> Dataset {
        let n = n.min(self.n_samples());
        Dataset {
            features: self.features.slice(s![..n, ..]).to_owned(),
            labels: self.labels.slice(s![..n]).to_owned(),
        }
    }

    /// Rows selected by index, in the given order.
    pub fn select(&self, rows: &[usize]) -> Dataset {
        Dataset {
            features: self.features.select(Axis(0), rows),
            labels: self.labels.select(Axis(0), rows),
        }
    }

    /// Shift every label by `offset`.
    pub fn offset_labels(mut self, offset: i64) -> Self {
        self.labels.mapv_inplace(|y| y + offset);
        self
    }

    pub fn into_parts(self) -> (Array2<f64>, Array1<i64>) {
        (self.features, self.labels)
    }
}

/// Sorted distinct values of `labels`.
pub fn unique_labels(labels: ArrayView1<'_, i64>) -> Vec<i64> {
    let mut classes: Vec<i64> = labels.iter().copied().collect();
    classes.sort_unstable();
    classes.dedup();
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn new_rejects_label_mismatch() {
        let err = Dataset::new(Array2::zeros((3, 2)), array![0, 1]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ShapeMismatch { expected: 3, got: 2, field: "labels" }
        ));
    }

    #[test]
    fn new_rejects_empty() {
        assert!(matches!(
            Dataset::new(Array2::zeros((0, 2)), array![]),
            Err(DatasetError::EmptySamples)
        ));
        assert!(matches!(
            Dataset::new(Array2::zeros((2, 0)), array![0, 1]),
            Err(DatasetError::EmptyFeatures)
        ));
    }

    #[test]
    fn head_offset_and_classes() {
        let ds = Dataset::new(
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            array![2, 0, 2],
        )
        .unwrap();
        assert_eq!(ds.classes(), vec![0, 2]);
        assert_eq!(ds.n_classes(), 2);

        let head = ds.head(2).offset_labels(1);
        assert_eq!(head.n_samples(), 2);
        assert_eq!(head.labels().to_vec(), vec![3, 1]);
        assert_eq!(ds.head(10).n_samples(), 3);
    }

    #[test]
    fn select_rows() {
        let ds = Dataset::new(array![[1.0], [2.0], [3.0]], array![0, 1, 2]).unwrap();
        let picked = ds.select(&[2, 0]);
        assert_eq!(picked.features(), array![[3.0], [1.0]]);
        assert_eq!(picked.labels().to_vec(), vec![2, 0]);
    }
}
