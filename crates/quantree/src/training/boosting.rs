//! Gradient-boosted trees for classification.

use ndarray::ArrayView2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::EnsembleTrainer;
use super::criterion::GradientCriterion;
use super::grower::TreeGrower;
use super::logger::{TrainingLogger, Verbosity};
use super::objectives::{GradsTuple, LogisticLoss, ObjectiveFn, SoftmaxLoss};
use super::params::{ParamValidationError, TreeParams};
use crate::repr::Forest;

/// Boosting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Boosting rounds.
    pub n_estimators: u32,
    /// Shrinkage applied to every leaf.
    pub learning_rate: f64,
    /// Depth limit of each tree.
    pub max_depth: u32,
    /// L2 regularization on leaf values.
    pub lambda: f64,
    /// Minimum gain to make a split.
    pub gamma: f64,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 20,
            learning_rate: 0.1,
            max_depth: 3,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.n_estimators == 0 {
            return Err(ParamValidationError::InvalidNEstimators(0));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ParamValidationError::InvalidLearningRate(self.learning_rate));
        }
        if self.max_depth == 0 {
            return Err(ParamValidationError::InvalidMaxDepth(0));
        }
        if self.lambda.is_nan() || self.lambda < 0.0 {
            return Err(ParamValidationError::InvalidLambda(self.lambda));
        }
        if self.gamma.is_nan() || self.gamma < 0.0 {
            return Err(ParamValidationError::InvalidGamma(self.gamma));
        }
        if self.min_child_weight.is_nan() || self.min_child_weight < 0.0 {
            return Err(ParamValidationError::InvalidMinChildWeight(self.min_child_weight));
        }
        Ok(())
    }
}

/// Newton boosting on log loss.
///
/// Binary problems train one margin with [`LogisticLoss`]; with more classes
/// every round trains one tree per class on [`SoftmaxLoss`] gradients. The
/// base margin is zero and every leaf already includes the learning rate, so
/// a margin is the plain sum of its trees.
#[derive(Debug, Clone)]
pub struct GradientBoostingTrainer {
    params: BoostingParams,
    seed: u64,
    verbosity: Verbosity,
}

impl GradientBoostingTrainer {
    pub fn new(params: BoostingParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            verbosity: Verbosity::default(),
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn objective(n_classes: usize) -> Box<dyn ObjectiveFn> {
        if n_classes <= 2 {
            Box::new(LogisticLoss)
        } else {
            Box::new(SoftmaxLoss::new(n_classes))
        }
    }
}

impl EnsembleTrainer for GradientBoostingTrainer {
    fn train(&self, features: ArrayView2<'_, f64>, targets: &[usize], n_classes: usize) -> Forest {
        let n_rows = features.nrows();
        let objective = Self::objective(n_classes);
        let n_outputs = objective.n_outputs(n_classes);
        let tree_params = TreeParams::depth_wise(self.params.max_depth);

        let mut logger = TrainingLogger::new(self.verbosity, "xgb");
        logger.start_training(n_rows, features.ncols(), self.params.n_estimators as usize);

        let weights = vec![1.0; n_rows];
        let mut predictions = vec![0.0; n_outputs * n_rows];
        let mut grads = vec![GradsTuple::default(); n_outputs * n_rows];
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut forest = Forest::new(n_outputs as u32);

        for round in 0..self.params.n_estimators as usize {
            objective.compute_gradients(n_rows, &predictions, targets, &mut grads);
            for output in 0..n_outputs {
                let range = output * n_rows..(output + 1) * n_rows;
                let criterion = GradientCriterion::new(
                    &grads[range.clone()],
                    self.params.lambda,
                    self.params.gamma,
                    self.params.min_child_weight,
                    self.params.learning_rate,
                );
                let tree = TreeGrower::new(features.view(), &weights, &criterion, &tree_params).grow(&mut rng);
                for (pred, row) in predictions[range].iter_mut().zip(features.rows()) {
                    *pred += tree.predict_row(row)[0];
                }
                logger.log_tree(forest.n_trees(), tree.n_leaves(), tree.depth());
                forest.push_tree(tree, output as u32);
            }
            logger.log_round(round, "logloss", objective.loss(n_rows, &predictions, targets));
        }

        logger.finish_training(forest.n_trees());
        forest
    }

    fn name(&self) -> &'static str {
        "xgb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Axis};
    use rand::Rng;

    fn data(n_classes: usize) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(21);
        let x = Array2::from_shape_fn((200, 3), |_| rng.gen_range(0..64) as f64);
        let y = x.rows().into_iter().map(|r| (r[0] as usize * n_classes) / 64).collect();
        (x, y)
    }

    fn margins(forest: &Forest, x: &Array2<f64>) -> Array2<f64> {
        let outputs = forest.tree_outputs(x.view());
        let mut m = Array2::zeros((x.nrows(), forest.n_groups() as usize));
        for (i, sample) in outputs.axis_iter(Axis(0)).enumerate() {
            for (t, &g) in forest.tree_groups().iter().enumerate() {
                m[[i, g as usize]] += sample[[t, 0]];
            }
        }
        m
    }

    #[test]
    fn binary_uses_one_group() {
        let (x, y) = data(2);
        let params = BoostingParams {
            n_estimators: 5,
            ..Default::default()
        };
        let forest = GradientBoostingTrainer::new(params, 0).train(x.view(), &y, 2);
        assert_eq!(forest.n_groups(), 1);
        assert_eq!(forest.n_trees(), 5);
        assert_eq!(forest.leaf_width(), 1);
        assert!(forest.validate().is_ok());

        let m = margins(&forest, &x);
        let correct = y.iter().enumerate().filter(|&(i, &c)| usize::from(m[[i, 0]] > 0.0) == c).count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn multiclass_uses_group_per_class() {
        let (x, y) = data(3);
        let params = BoostingParams {
            n_estimators: 4,
            ..Default::default()
        };
        let forest = GradientBoostingTrainer::new(params, 0).train(x.view(), &y, 3);
        assert_eq!(forest.n_groups(), 3);
        assert_eq!(forest.n_trees(), 12);
        assert_eq!(forest.tree_groups()[..3], [0, 1, 2]);
    }

    #[test]
    fn loss_decreases_with_rounds() {
        let (x, y) = data(2);
        let loss_after = |n_estimators| {
            let params = BoostingParams {
                n_estimators,
                ..Default::default()
            };
            let forest = GradientBoostingTrainer::new(params, 0).train(x.view(), &y, 2);
            let m = margins(&forest, &x).column(0).to_vec();
            LogisticLoss.loss(y.len(), &m, &y)
        };
        assert!(loss_after(10) < loss_after(2));
    }

    #[test]
    fn params_validation() {
        assert!(BoostingParams::default().validate().is_ok());
        let bad = BoostingParams {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ParamValidationError::InvalidLearningRate(0.0)));
        let bad = BoostingParams {
            n_estimators: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ParamValidationError::InvalidNEstimators(0)));
    }
}
