//! Exact best-split search over sorted feature values.

use ndarray::ArrayView2;
use rand::prelude::*;

use super::criterion::SplitCriterion;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Best split found for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    pub feature: u32,
    pub threshold: f64,
    pub improvement: f64,
}

/// Searches splits for one tree; owns scratch buffers reused across nodes.
pub(crate) struct Splitter<'a, C: SplitCriterion> {
    features: ArrayView2<'a, f64>,
    weights: &'a [f64],
    criterion: &'a C,
    min_samples_leaf: usize,
    min_weight_leaf: f64,
    max_features: usize,
    feature_order: Vec<usize>,
    sorted: Vec<usize>,
}

impl<'a, C: SplitCriterion> Splitter<'a, C> {
    pub fn new(
        features: ArrayView2<'a, f64>,
        weights: &'a [f64],
        criterion: &'a C,
        min_samples_leaf: usize,
        min_weight_leaf: f64,
        max_features: usize,
    ) -> Self {
        let n_features = features.ncols();
        Self {
            features,
            weights,
            criterion,
            min_samples_leaf,
            min_weight_leaf,
            max_features: max_features.clamp(1, n_features.max(1)),
            feature_order: (0..n_features).collect(),
            sorted: Vec::new(),
        }
    }

    /// Best split of `samples`, whose statistics are `parent`.
    ///
    /// Features are visited in a fresh random order when subsampling; the
    /// search stops once `max_features` non-constant features were scanned.
    /// Returns `None` when no valid split is accepted by the criterion.
    pub fn find_best_split(
        &mut self,
        samples: &[usize],
        parent: &C::Stats,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let n = samples.len();
        if n < 2 {
            return None;
        }
        let n_features = self.features.ncols();
        if self.max_features < n_features {
            self.feature_order.shuffle(rng);
        }

        let criterion = self.criterion;
        let parent_cost = criterion.cost(parent);
        let penalty = criterion.split_penalty();
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for &feature in &self.feature_order {
            if visited >= self.max_features {
                break;
            }
            let column = self.features.column(feature);
            self.sorted.clear();
            self.sorted.extend_from_slice(samples);
            self.sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            if column[self.sorted[n - 1]] <= column[self.sorted[0]] + FEATURE_THRESHOLD {
                continue;
            }
            visited += 1;

            let mut left = criterion.empty_stats();
            let mut right = parent.clone();
            for i in 0..n - 1 {
                let sample = self.sorted[i];
                let weight = self.weights[sample];
                criterion.add(&mut left, sample, weight);
                criterion.subtract(&mut right, sample, weight);

                let value = column[sample];
                let next = column[self.sorted[i + 1]];
                if next <= value + FEATURE_THRESHOLD {
                    continue;
                }
                let n_left = i + 1;
                if n_left < self.min_samples_leaf || n - n_left < self.min_samples_leaf {
                    continue;
                }
                if criterion.weight(&left) < self.min_weight_leaf || criterion.weight(&right) < self.min_weight_leaf {
                    continue;
                }
                if !criterion.child_allowed(&left) || !criterion.child_allowed(&right) {
                    continue;
                }

                let improvement = parent_cost - criterion.cost(&left) - criterion.cost(&right) - penalty;
                if best.as_ref().is_none_or(|b| improvement > b.improvement) {
                    let mut threshold = value / 2.0 + next / 2.0;
                    if threshold >= next || !threshold.is_finite() {
                        threshold = value;
                    }
                    best = Some(SplitCandidate {
                        feature: feature as u32,
                        threshold,
                        improvement,
                    });
                }
            }
        }

        best.filter(|b| criterion.accepts(b.improvement))
    }

    /// Reorder `samples` so rows going left come first; returns their count.
    pub fn partition(&self, samples: &mut [usize], feature: u32, threshold: f64) -> usize {
        let column = self.features.column(feature as usize);
        let (mut i, mut j) = (0, samples.len());
        while i < j {
            if column[samples[i]] <= threshold {
                i += 1;
            } else {
                j -= 1;
                samples.swap(i, j);
            }
        }
        i
    }
}
