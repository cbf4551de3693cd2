//! Float reference model for accuracy comparisons.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::ensemble::{EnsembleKind, LabeledRows, aggregate, labels_from_proba};
use super::{FitError, PredictError, accuracy};
use crate::repr::Forest;
use crate::training::EnsembleTrainer;

/// The same trainer run on unquantized inputs, with float leaves.
///
/// Returned by [`TreeClassifier::fit_benchmark`](super::TreeClassifier::fit_benchmark)
/// to measure what quantization costs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceClassifier {
    kind: EnsembleKind,
    classes: Vec<i64>,
    forest: Forest,
    n_features: usize,
}

impl ReferenceClassifier {
    pub fn fit(
        kind: EnsembleKind,
        trainer: &dyn EnsembleTrainer,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, i64>,
    ) -> Result<Self, FitError> {
        let LabeledRows { classes, targets } = LabeledRows::new(x, y)?;
        let forest = trainer.train(x, &targets, classes.len());
        forest.validate()?;
        Ok(Self {
            kind,
            classes,
            forest,
            n_features: x.ncols(),
        })
    }

    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, PredictError> {
        if x.ncols() != self.n_features {
            return Err(PredictError::FeatureMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        let outputs = self.forest.tree_outputs(x);
        Ok(aggregate(self.kind, &self.forest, &outputs, self.classes.len()))
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<i64>, PredictError> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_proba(&self.classes, &proba))
    }

    /// Fraction of rows of `x` predicted as their label in `y`.
    pub fn score(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, i64>) -> Result<f64, PredictError> {
        let predictions = self.predict(x)?;
        accuracy(predictions.view(), y)
    }
}
