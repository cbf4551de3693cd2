//! Random forest: bootstrap-weighted trees trained in parallel.

use ndarray::ArrayView2;
use rand::prelude::*;

use super::EnsembleTrainer;
use super::criterion::ClassCriterion;
use super::grower::TreeGrower;
use super::logger::{TrainingLogger, Verbosity};
use super::params::TreeParams;
use crate::repr::Forest;
use crate::utils::run_with_threads;

/// Trains `n_estimators` classification trees.
///
/// With `bootstrap`, each tree sees `n` rows drawn with replacement; the
/// draw counts become sample weights, so out-of-bag rows get weight zero.
/// Tree seeds are drawn from the forest seed before training starts, so the
/// forest does not depend on the thread count.
#[derive(Debug, Clone)]
pub struct RandomForestTrainer {
    params: TreeParams,
    n_estimators: u32,
    bootstrap: bool,
    seed: u64,
    n_threads: usize,
    verbosity: Verbosity,
}

impl RandomForestTrainer {
    pub fn new(params: TreeParams, n_estimators: u32, bootstrap: bool, seed: u64) -> Self {
        Self {
            params,
            n_estimators,
            bootstrap,
            seed,
            n_threads: 0,
            verbosity: Verbosity::default(),
        }
    }

    /// 0 = rayon's global pool, 1 = sequential.
    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn sample_weights(&self, n_rows: usize, rng: &mut StdRng) -> Vec<f64> {
        if !self.bootstrap {
            return vec![1.0; n_rows];
        }
        let mut weights = vec![0.0; n_rows];
        for _ in 0..n_rows {
            weights[rng.gen_range(0..n_rows)] += 1.0;
        }
        weights
    }
}

impl EnsembleTrainer for RandomForestTrainer {
    fn train(&self, features: ArrayView2<'_, f64>, targets: &[usize], n_classes: usize) -> Forest {
        let mut logger = TrainingLogger::new(self.verbosity, "random_forest");
        logger.start_training(features.nrows(), features.ncols(), self.n_estimators as usize);

        let mut seeder = StdRng::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| seeder.r#gen()).collect();
        let criterion = ClassCriterion::new(targets, n_classes, self.params.criterion);

        let trees = run_with_threads(self.n_threads, |parallelism| {
            parallelism.maybe_par_map(seeds.len(), |i| {
                let mut rng = StdRng::seed_from_u64(seeds[i]);
                let weights = self.sample_weights(targets.len(), &mut rng);
                TreeGrower::new(features.view(), &weights, &criterion, &self.params).grow(&mut rng)
            })
        });

        let mut forest = Forest::new(1);
        for (i, tree) in trees.into_iter().enumerate() {
            logger.log_tree(i, tree.n_leaves(), tree.depth());
            forest.push_tree(tree, 0);
        }
        logger.finish_training(forest.n_trees());
        forest
    }

    fn name(&self) -> &'static str {
        "random_forest"
    }
}
