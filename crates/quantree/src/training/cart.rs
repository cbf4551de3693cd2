//! Single CART decision tree.

use ndarray::ArrayView2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::criterion::ClassCriterion;
use super::grower::TreeGrower;
use super::logger::{TrainingLogger, Verbosity};
use super::params::TreeParams;
use super::EnsembleTrainer;
use crate::repr::Forest;

/// Trains one classification tree with unit sample weights.
///
/// The result is a single-group forest whose leaves hold class probability
/// vectors.
#[derive(Debug, Clone)]
pub struct DecisionTreeTrainer {
    params: TreeParams,
    seed: u64,
    verbosity: Verbosity,
}

impl DecisionTreeTrainer {
    pub fn new(params: TreeParams, seed: u64) -> Self {
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

    pub fn params(&self) -> &TreeParams {
        &self.params
    }
}

impl EnsembleTrainer for DecisionTreeTrainer {
    fn train(&self, features: ArrayView2<'_, f64>, targets: &[usize], n_classes: usize) -> Forest {
        let mut logger = TrainingLogger::new(self.verbosity, "decision_tree");
        logger.start_training(features.nrows(), features.ncols(), 1);

        let weights = vec![1.0; targets.len()];
        let criterion = ClassCriterion::new(targets, n_classes, self.params.criterion);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let tree = TreeGrower::new(features.view(), &weights, &criterion, &self.params).grow(&mut rng);
        logger.log_tree(0, tree.n_leaves(), tree.depth());

        let mut forest = Forest::new(1);
        forest.push_tree(tree, 0);
        logger.finish_training(forest.n_trees());
        forest
    }

    fn name(&self) -> &'static str {
        "decision_tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn single_tree_with_probability_leaves() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = [0, 0, 1, 1, 2, 2];
        let forest = DecisionTreeTrainer::new(TreeParams::default(), 0).train(x.view(), &y, 3);
        assert_eq!(forest.n_trees(), 1);
        assert_eq!(forest.n_groups(), 1);
        assert_eq!(forest.leaf_width(), 3);
        assert!(forest.validate().is_ok());
        let tree = forest.tree(0);
        assert_eq!(tree.predict_row(x.row(3)), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn same_seed_same_tree() {
        let x = array![[0.0, 3.0], [1.0, 1.0], [2.0, 2.0], [3.0, 0.0], [4.0, 1.0]];
        let y = [0, 1, 0, 1, 1];
        let params = TreeParams {
            max_features: crate::training::MaxFeatures::Count(1),
            ..Default::default()
        };
        let a = DecisionTreeTrainer::new(params.clone(), 5).train(x.view(), &y, 2);
        let b = DecisionTreeTrainer::new(params, 5).train(x.view(), &y, 2);
        assert_eq!(a, b);
    }
}
