//! Split criteria.
//!
//! A criterion accumulates per-node statistics over weighted samples and
//! scores them. The splitter moves samples from the right child to the left
//! one in sorted order, so statistics support both `add` and `subtract`.
//!
//! Costs are additive: a split's improvement is
//! `cost(parent) - cost(left) - cost(right) - split_penalty()`.

use std::fmt;

use super::objectives::GradsTuple;
use super::params::Criterion;

/// Impurity below which a classification node is considered pure.
const PURITY_EPSILON: f64 = 1e-7;

/// Smallest structure-score gain that justifies a boosting split.
const MIN_GRADIENT_GAIN: f64 = 1e-6;

/// Statistics and scoring used by the tree grower.
pub trait SplitCriterion: Sync {
    type Stats: Clone + fmt::Debug + Send;

    fn empty_stats(&self) -> Self::Stats;

    fn add(&self, stats: &mut Self::Stats, sample: usize, weight: f64);

    fn subtract(&self, stats: &mut Self::Stats, sample: usize, weight: f64);

    /// Total sample weight in `stats`.
    fn weight(&self, stats: &Self::Stats) -> f64;

    /// Additive node cost; lower is better.
    fn cost(&self, stats: &Self::Stats) -> f64;

    /// Node needs no further splitting.
    fn is_pure(&self, _stats: &Self::Stats) -> bool {
        false
    }

    /// Extra constraint on each child of a candidate split.
    fn child_allowed(&self, _stats: &Self::Stats) -> bool {
        true
    }

    /// Whether the best split found is worth making.
    fn accepts(&self, improvement: f64) -> bool;

    /// Cost charged for every split.
    fn split_penalty(&self) -> f64 {
        0.0
    }

    /// Width of the value vector produced by [`leaf_value`](Self::leaf_value).
    fn leaf_width(&self) -> usize;

    fn leaf_value(&self, stats: &Self::Stats) -> Vec<f64>;
}

// =============================================================================
// ClassCriterion
// =============================================================================

/// Weighted class counts at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    counts: Vec<f64>,
    total: f64,
}

/// Gini or entropy impurity over class-index targets.
#[derive(Debug, Clone, Copy)]
pub struct ClassCriterion<'a> {
    targets: &'a [usize],
    n_classes: usize,
    kind: Criterion,
}

impl<'a> ClassCriterion<'a> {
    /// `targets` holds a class index in `0..n_classes` per sample.
    pub fn new(targets: &'a [usize], n_classes: usize, kind: Criterion) -> Self {
        Self {
            targets,
            n_classes,
            kind,
        }
    }

    /// Impurity in `[0, 1]` for Gini, `[0, log2(n_classes)]` for entropy.
    pub fn impurity(&self, stats: &ClassStats) -> f64 {
        if stats.total <= 0.0 {
            return 0.0;
        }
        match self.kind {
            Criterion::Gini => {
                let sq: f64 = stats.counts.iter().map(|&c| (c / stats.total).powi(2)).sum();
                1.0 - sq
            }
            Criterion::Entropy => stats
                .counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / stats.total;
                    -p * p.log2()
                })
                .sum(),
        }
    }
}

impl SplitCriterion for ClassCriterion<'_> {
    type Stats = ClassStats;

    fn empty_stats(&self) -> ClassStats {
        ClassStats {
            counts: vec![0.0; self.n_classes],
            total: 0.0,
        }
    }

    #[inline]
    fn add(&self, stats: &mut ClassStats, sample: usize, weight: f64) {
        stats.counts[self.targets[sample]] += weight;
        stats.total += weight;
    }

    #[inline]
    fn subtract(&self, stats: &mut ClassStats, sample: usize, weight: f64) {
        stats.counts[self.targets[sample]] -= weight;
        stats.total -= weight;
    }

    #[inline]
    fn weight(&self, stats: &ClassStats) -> f64 {
        stats.total
    }

    #[inline]
    fn cost(&self, stats: &ClassStats) -> f64 {
        stats.total * self.impurity(stats)
    }

    fn is_pure(&self, stats: &ClassStats) -> bool {
        self.impurity(stats) <= PURITY_EPSILON
    }

    fn accepts(&self, improvement: f64) -> bool {
        improvement.is_finite()
    }

    fn leaf_width(&self) -> usize {
        self.n_classes
    }

    /// Class probabilities.
    fn leaf_value(&self, stats: &ClassStats) -> Vec<f64> {
        if stats.total <= 0.0 {
            return vec![0.0; self.n_classes];
        }
        stats.counts.iter().map(|&c| c / stats.total).collect()
    }
}

// =============================================================================
// GradientCriterion
// =============================================================================

/// Gradient and hessian sums at a node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradStats {
    grad: f64,
    hess: f64,
    weight: f64,
}

/// XGBoost structure score over one output's gradients.
#[derive(Debug, Clone, Copy)]
pub struct GradientCriterion<'a> {
    grads: &'a [GradsTuple],
    lambda: f64,
    gamma: f64,
    min_child_weight: f64,
    learning_rate: f64,
}

impl<'a> GradientCriterion<'a> {
    pub fn new(grads: &'a [GradsTuple], lambda: f64, gamma: f64, min_child_weight: f64, learning_rate: f64) -> Self {
        Self {
            grads,
            lambda,
            gamma,
            min_child_weight,
            learning_rate,
        }
    }
}

impl SplitCriterion for GradientCriterion<'_> {
    type Stats = GradStats;

    fn empty_stats(&self) -> GradStats {
        GradStats::default()
    }

    #[inline]
    fn add(&self, stats: &mut GradStats, sample: usize, weight: f64) {
        let g = self.grads[sample];
        stats.grad += weight * g.grad;
        stats.hess += weight * g.hess;
        stats.weight += weight;
    }

    #[inline]
    fn subtract(&self, stats: &mut GradStats, sample: usize, weight: f64) {
        let g = self.grads[sample];
        stats.grad -= weight * g.grad;
        stats.hess -= weight * g.hess;
        stats.weight -= weight;
    }

    #[inline]
    fn weight(&self, stats: &GradStats) -> f64 {
        stats.weight
    }

    #[inline]
    fn cost(&self, stats: &GradStats) -> f64 {
        let denom = stats.hess + self.lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -0.5 * stats.grad * stats.grad / denom
    }

    fn child_allowed(&self, stats: &GradStats) -> bool {
        stats.hess >= self.min_child_weight
    }

    fn accepts(&self, improvement: f64) -> bool {
        improvement > MIN_GRADIENT_GAIN
    }

    fn split_penalty(&self) -> f64 {
        self.gamma
    }

    fn leaf_width(&self) -> usize {
        1
    }

    /// Shrunk Newton step `-G / (H + lambda) * learning_rate`.
    fn leaf_value(&self, stats: &GradStats) -> Vec<f64> {
        let denom = stats.hess + self.lambda;
        if denom <= 0.0 {
            return vec![0.0];
        }
        vec![-stats.grad / denom * self.learning_rate]
    }
}
