//! Fitted ensemble state shared by every classifier.
//!
//! Fitting maps labels to class indices, calibrates one quantizer per input
//! column, trains on the quantized inputs and quantizes the leaf values.
//! Clear and compiled prediction then share one post-processing path:
//! dequantize the per-tree leaf vectors, aggregate them into class
//! probabilities and take the arg-max.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{FitError, PredictError};
use crate::compile::CompiledModel;
use crate::data::{DatasetError, unique_labels};
use crate::quantization::FeatureQuantizers;
use crate::repr::{Forest, QuantizedForest};
use crate::training::{EnsembleTrainer, sigmoid, softmax_inplace};
use crate::utils::argmax;

/// Which family of tree ensemble a model is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnsembleKind {
    DecisionTree,
    RandomForest,
    GradientBoosting,
}

impl EnsembleKind {
    pub fn name(self) -> &'static str {
        match self {
            EnsembleKind::DecisionTree => "DecisionTreeClassifier",
            EnsembleKind::RandomForest => "RandomForestClassifier",
            EnsembleKind::GradientBoosting => "XGBClassifier",
        }
    }
}

impl std::fmt::Display for EnsembleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Checked training set: sorted classes and per-row class indices.
pub(crate) struct LabeledRows {
    pub classes: Vec<i64>,
    pub targets: Vec<usize>,
}

impl LabeledRows {
    pub fn new(x: ArrayView2<'_, f64>, y: ArrayView1<'_, i64>) -> Result<Self, FitError> {
        if x.nrows() == 0 {
            return Err(DatasetError::EmptySamples.into());
        }
        if x.ncols() == 0 {
            return Err(DatasetError::EmptyFeatures.into());
        }
        if y.len() != x.nrows() {
            return Err(DatasetError::ShapeMismatch {
                expected: x.nrows(),
                got: y.len(),
                field: "y",
            }
            .into());
        }
        let classes = unique_labels(y);
        if classes.len() < 2 {
            return Err(FitError::TooFewClasses { found: classes.len() });
        }
        let targets = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();
        Ok(Self { classes, targets })
    }
}

/// Turn per-tree leaf vectors (`[n_samples, n_trees, width]`) into class
/// probabilities (`[n_samples, n_classes]`).
///
/// Trees with probability leaves are averaged; boosted margins are summed
/// per group on top of the base score, then squashed by a sigmoid (one
/// group) or a softmax.
pub(crate) fn aggregate(kind: EnsembleKind, forest: &Forest, outputs: &Array3<f64>, n_classes: usize) -> Array2<f64> {
    let n_samples = outputs.len_of(Axis(0));
    match kind {
        EnsembleKind::DecisionTree | EnsembleKind::RandomForest => {
            let mut proba = outputs
                .mean_axis(Axis(1))
                .unwrap_or_else(|| Array2::zeros((n_samples, n_classes)));
            for mut row in proba.rows_mut() {
                row.mapv_inplace(|p| p.max(0.0));
                let total = row.sum();
                if total > 0.0 {
                    row /= total;
                } else {
                    row.fill(1.0 / n_classes as f64);
                }
            }
            proba
        }
        EnsembleKind::GradientBoosting => {
            let n_groups = forest.n_groups() as usize;
            let mut margins = Array2::from_shape_fn((n_samples, n_groups), |(_, g)| forest.base_score()[g]);
            for (mut margin, sample) in margins.rows_mut().into_iter().zip(outputs.outer_iter()) {
                for (&group, leaf) in forest.tree_groups().iter().zip(sample.rows()) {
                    margin[group as usize] += leaf[0];
                }
            }
            if n_groups == 1 {
                let mut proba = Array2::zeros((n_samples, 2));
                for (mut row, &m) in proba.rows_mut().into_iter().zip(margins.column(0)) {
                    let p = sigmoid(m);
                    row[0] = 1.0 - p;
                    row[1] = p;
                }
                proba
            } else {
                for mut row in margins.rows_mut() {
                    if let Some(slice) = row.as_slice_mut() {
                        softmax_inplace(slice);
                    }
                }
                margins
            }
        }
    }
}

/// Arg-max of each probability row mapped back to its class label.
pub(crate) fn labels_from_proba(classes: &[i64], proba: &Array2<f64>) -> Array1<i64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let idx = row.as_slice().map_or_else(|| argmax(&row.to_vec()), argmax);
            classes[idx]
        })
        .collect()
}

/// Everything a classifier learns in `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEnsemble {
    kind: EnsembleKind,
    classes: Vec<i64>,
    input_quantizers: FeatureQuantizers,
    forest: Forest,
    quantized: QuantizedForest,
}

impl FittedEnsemble {
    /// Run the fit pipeline on `x` / `y`.
    pub(crate) fn fit(
        kind: EnsembleKind,
        trainer: &dyn EnsembleTrainer,
        n_bits: u8,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, i64>,
    ) -> Result<Self, FitError> {
        let LabeledRows { classes, targets } = LabeledRows::new(x, y)?;
        let input_quantizers = FeatureQuantizers::fit(n_bits, x)?;
        let features = input_quantizers.quantize(x)?.mapv(|q| q as f64);

        let forest = trainer.train(features.view(), &targets, classes.len());
        forest.validate()?;
        let quantized = QuantizedForest::quantize(&forest, n_bits)?;

        tracing::info!(
            model = %kind,
            trainer = trainer.name(),
            n_samples = x.nrows(),
            n_features = x.ncols(),
            n_classes = classes.len(),
            n_trees = forest.n_trees(),
            n_bits,
            "model fitted"
        );

        Ok(Self {
            kind,
            classes,
            input_quantizers,
            forest,
            quantized,
        })
    }

    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.input_quantizers.n_features()
    }

    pub fn input_quantizers(&self) -> &FeatureQuantizers {
        &self.input_quantizers
    }

    /// The float forest as trained on quantized inputs.
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn quantized(&self) -> &QuantizedForest {
        &self.quantized
    }

    fn quantize_inputs(&self, x: ArrayView2<'_, f64>) -> Result<Array2<i64>, PredictError> {
        if x.ncols() != self.n_features() {
            return Err(PredictError::FeatureMismatch {
                expected: self.n_features(),
                got: x.ncols(),
            });
        }
        Ok(self.input_quantizers.quantize(x)?)
    }

    /// Class probabilities from integer tree outputs.
    fn post_process(&self, outputs: &Array3<i64>) -> Array2<f64> {
        let dequantized = self.quantized.dequantize_outputs(outputs);
        aggregate(self.kind, &self.forest, &dequantized, self.classes.len())
    }

    pub(crate) fn predict_proba_clear(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, PredictError> {
        let q = self.quantize_inputs(x)?;
        Ok(self.post_process(&self.quantized.tree_outputs(q.view())))
    }

    pub(crate) fn predict_proba_compiled(
        &self,
        compiled: &CompiledModel,
        x: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, PredictError> {
        let q = self.quantize_inputs(x)?;
        let outputs = compiled.run(q.view())?;
        Ok(self.post_process(&outputs))
    }

    pub(crate) fn labels(&self, proba: &Array2<f64>) -> Array1<i64> {
        labels_from_proba(&self.classes, proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{DecisionTreeTrainer, TreeParams};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, array};

    #[test]
    fn labeled_rows_sort_classes() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![7, -1, 7, 3];
        let rows = LabeledRows::new(x.view(), y.view()).unwrap();
        assert_eq!(rows.classes, vec![-1, 3, 7]);
        assert_eq!(rows.targets, vec![2, 0, 2, 1]);
    }

    #[test]
    fn labeled_rows_errors() {
        let x = array![[0.0], [1.0]];
        let err = LabeledRows::new(x.view(), array![1, 1].view()).err().unwrap();
        assert_eq!(err.to_string(), "You must provide at least 2 classes in y.");
        assert!(matches!(
            LabeledRows::new(x.view(), array![1].view()),
            Err(FitError::Dataset(DatasetError::ShapeMismatch { .. }))
        ));
    }

    #[test]
    fn aggregate_forest_means() {
        let mut forest = Forest::new(1);
        forest.push_tree(crate::class_tree! { 0 => leaf[1.0, 0.0] }, 0);
        forest.push_tree(crate::class_tree! { 0 => leaf[0.0, 1.0] }, 0);
        let outputs = Array3::from_shape_vec((1, 2, 2), vec![1.0, 0.0, 0.5, 0.5]).unwrap();
        let proba = aggregate(EnsembleKind::RandomForest, &forest, &outputs, 2);
        assert_abs_diff_eq!(proba[[0, 0]], 0.75);
        assert_abs_diff_eq!(proba[[0, 1]], 0.25);
    }

    #[test]
    fn aggregate_boosted_margins() {
        let mut binary = Forest::new(1);
        binary.push_tree(crate::class_tree! { 0 => leaf[0.0] }, 0);
        binary.push_tree(crate::class_tree! { 0 => leaf[0.0] }, 0);
        let outputs = Array3::from_shape_vec((1, 2, 1), vec![0.5, -0.5]).unwrap();
        let proba = aggregate(EnsembleKind::GradientBoosting, &binary, &outputs, 2);
        assert_abs_diff_eq!(proba[[0, 1]], 0.5);

        let mut multi = Forest::new(3);
        for g in 0..3 {
            multi.push_tree(crate::class_tree! { 0 => leaf[0.0] }, g);
        }
        let outputs = Array3::from_shape_vec((1, 3, 1), vec![0.0, 2.0, 0.0]).unwrap();
        let proba = aggregate(EnsembleKind::GradientBoosting, &multi, &outputs, 3);
        assert_abs_diff_eq!(proba.row(0).sum(), 1.0, epsilon = 1e-12);
        assert_eq!(labels_from_proba(&[10, 20, 30], &proba), array![20]);
    }

    #[test]
    fn ties_pick_first_class() {
        let proba = array![[0.5, 0.5], [0.2, 0.8]];
        assert_eq!(labels_from_proba(&[4, 9], &proba), array![4, 9]);
    }

    #[test]
    fn fit_and_predict_clear() {
        let x = array![[0.0, 5.0], [1.0, 4.0], [2.0, 3.0], [3.0, 2.0], [4.0, 1.0], [5.0, 0.0]];
        let y = array![1, 1, 1, 2, 2, 2];
        let trainer = DecisionTreeTrainer::new(TreeParams::default(), 0);
        let fitted = FittedEnsemble::fit(EnsembleKind::DecisionTree, &trainer, 4, x.view(), y.view()).unwrap();
        assert_eq!(fitted.classes(), &[1, 2]);
        let proba = fitted.predict_proba_clear(x.view()).unwrap();
        assert_eq!(fitted.labels(&proba), y);
        assert!(matches!(
            fitted.predict_proba_clear(array![[0.0]].view()),
            Err(PredictError::FeatureMismatch { expected: 2, got: 1 })
        ));
    }
}
