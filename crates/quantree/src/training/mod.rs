//! Training infrastructure for tree ensembles.
//!
//! ## Shared Infrastructure
//!
//! - [`TreeParams`], [`HyperParam`]: tree structure controls
//! - [`TreeGrower`]: depth-wise / leaf-wise growth over any [`SplitCriterion`]
//! - [`TrainingLogger`], [`Verbosity`]: structured logging
//!
//! ## Trainers
//!
//! - [`DecisionTreeTrainer`]: a single CART tree
//! - [`RandomForestTrainer`]: bootstrap-weighted trees in parallel
//! - [`GradientBoostingTrainer`]: Newton boosting on [`LogisticLoss`] or
//!   [`SoftmaxLoss`]
//!
//! Trainers consume features and class indices (`0..n_classes`) and return a
//! [`Forest`]. Label mapping and quantization happen in the model layer.

mod bagging;
mod boosting;
mod cart;
mod criterion;
mod grower;
mod logger;
mod objectives;
mod params;
mod splitter;

pub use bagging::RandomForestTrainer;
pub use boosting::{BoostingParams, GradientBoostingTrainer};
pub use cart::DecisionTreeTrainer;
pub use criterion::{ClassCriterion, ClassStats, GradStats, GradientCriterion, SplitCriterion};
pub use grower::TreeGrower;
pub use logger::{TrainingLogger, Verbosity};
pub use objectives::{GradsTuple, LogisticLoss, ObjectiveFn, SoftmaxLoss, sigmoid, softmax_inplace};
pub use params::{Criterion, GrowthStrategy, HyperParam, MaxFeatures, ParamValidationError, TreeParams};
pub(crate) use params::validate_n_bits;

use ndarray::ArrayView2;

use crate::repr::Forest;

/// Turns a training set into a forest.
///
/// `targets[i]` is the class index of row `i`. Implementations are
/// deterministic given their seed.
pub trait EnsembleTrainer: Send + Sync + std::fmt::Debug {
    fn train(&self, features: ArrayView2<'_, f64>, targets: &[usize], n_classes: usize) -> Forest;

    /// Short identifier used in log events.
    fn name(&self) -> &'static str;
}
