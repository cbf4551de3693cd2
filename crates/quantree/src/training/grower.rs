//! Tree growing with depth-wise and leaf-wise expansion.
//!
//! The grower keeps one sample-index buffer for the whole tree; every open
//! node owns a contiguous range of it, which is partitioned in place when the
//! node is split. Open nodes wait in a frontier:
//!
//! - [`GrowthStrategy::DepthWise`]: a stack, so the left subtree is finished
//!   before the right one.
//! - [`GrowthStrategy::LeafWise`]: a max-heap on impurity decrease, stopped
//!   once the leaf budget is used.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

use ndarray::ArrayView2;
use rand::rngs::StdRng;

use super::criterion::SplitCriterion;
use super::params::{GrowthStrategy, TreeParams};
use super::splitter::{SplitCandidate, Splitter};
use crate::repr::{NodeId, Tree, TreeBuilder};

/// A node whose best split is known but not yet applied.
#[derive(Debug)]
struct OpenNode {
    id: NodeId,
    samples: Range<usize>,
    depth: usize,
    split: SplitCandidate,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    /// Larger improvement first, then lower node id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .improvement
            .total_cmp(&other.split.improvement)
            .then_with(|| other.id.cmp(&self.id))
    }
}

enum Frontier {
    Stack(Vec<OpenNode>),
    Heap(BinaryHeap<OpenNode>),
}

impl Frontier {
    fn new(strategy: GrowthStrategy) -> Self {
        match strategy {
            GrowthStrategy::DepthWise { .. } => Frontier::Stack(Vec::new()),
            GrowthStrategy::LeafWise { .. } => Frontier::Heap(BinaryHeap::new()),
        }
    }

    fn push(&mut self, node: OpenNode) {
        match self {
            Frontier::Stack(stack) => stack.push(node),
            Frontier::Heap(heap) => heap.push(node),
        }
    }

    fn pop(&mut self) -> Option<OpenNode> {
        match self {
            Frontier::Stack(stack) => stack.pop(),
            Frontier::Heap(heap) => heap.pop(),
        }
    }

    fn extend_with(&mut self, node: Option<OpenNode>) {
        if let Some(node) = node {
            self.push(node);
        }
    }
}

/// Grows one tree over weighted samples.
pub struct TreeGrower<'a, C: SplitCriterion> {
    features: ArrayView2<'a, f64>,
    weights: &'a [f64],
    criterion: &'a C,
    params: &'a TreeParams,
}

impl<'a, C: SplitCriterion> TreeGrower<'a, C> {
    /// `weights` has one entry per row of `features`; rows with zero weight
    /// are left out of the tree entirely.
    pub fn new(features: ArrayView2<'a, f64>, weights: &'a [f64], criterion: &'a C, params: &'a TreeParams) -> Self {
        debug_assert_eq!(features.nrows(), weights.len());
        Self {
            features,
            weights,
            criterion,
            params,
        }
    }

    pub fn grow(&self, rng: &mut StdRng) -> Tree {
        let mut samples: Vec<usize> = (0..self.weights.len()).filter(|&i| self.weights[i] > 0.0).collect();
        let total_weight: f64 = samples.iter().map(|&i| self.weights[i]).sum();
        let min_weight_leaf = self.params.min_weight_fraction_leaf * total_weight;
        let strategy = self.params.growth_strategy();

        let mut splitter = Splitter::new(
            self.features,
            self.weights,
            self.criterion,
            self.params.min_samples_leaf,
            min_weight_leaf,
            self.params.max_features.resolve(self.features.ncols()),
        );
        let mut builder = TreeBuilder::default();
        let mut frontier = Frontier::new(strategy);

        let root = self.open(&mut splitter, &mut builder, &samples, 0, 0..samples.len(), 0, min_weight_leaf, rng);
        frontier.extend_with(root);

        let mut next_id: NodeId = 1;
        let mut n_leaves = 1usize;
        while let Some(node) = frontier.pop() {
            if let GrowthStrategy::LeafWise { max_leaves, .. } = strategy
                && n_leaves >= max_leaves as usize
            {
                break;
            }

            let SplitCandidate { feature, threshold, .. } = node.split;
            let range = node.samples.clone();
            let n_left = splitter.partition(&mut samples[range.clone()], feature, threshold);
            let mid = range.start + n_left;

            let (left_id, right_id) = (next_id, next_id + 1);
            next_id += 2;
            builder.split(node.id, feature, threshold, left_id, right_id);
            n_leaves += 1;

            let depth = node.depth + 1;
            let left = self.open(&mut splitter, &mut builder, &samples, left_id, range.start..mid, depth, min_weight_leaf, rng);
            let right = self.open(&mut splitter, &mut builder, &samples, right_id, mid..range.end, depth, min_weight_leaf, rng);
            frontier.extend_with(right);
            frontier.extend_with(left);
        }

        builder.build()
    }

    /// Record a new node as a leaf and look for its best split.
    #[allow(clippy::too_many_arguments)]
    fn open(
        &self,
        splitter: &mut Splitter<'a, C>,
        builder: &mut TreeBuilder,
        samples: &[usize],
        id: NodeId,
        range: Range<usize>,
        depth: usize,
        min_weight_leaf: f64,
        rng: &mut StdRng,
    ) -> Option<OpenNode> {
        let node_samples = &samples[range.clone()];
        let mut stats = self.criterion.empty_stats();
        for &s in node_samples {
            self.criterion.add(&mut stats, s, self.weights[s]);
        }
        let weight = self.criterion.weight(&stats);
        builder.leaf(id, self.criterion.leaf_value(&stats)).weight(id, weight);

        let n = node_samples.len();
        let at_depth_limit = self
            .params
            .max_depth
            .is_some_and(|max_depth| depth >= max_depth as usize);
        let is_leaf = at_depth_limit
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
            || weight < 2.0 * min_weight_leaf
            || self.criterion.is_pure(&stats);
        if is_leaf {
            return None;
        }

        splitter
            .find_best_split(node_samples, &stats, rng)
            .map(|split| OpenNode {
                id,
                samples: range,
                depth,
                split,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::criterion::ClassCriterion;
    use crate::training::params::{Criterion, MaxFeatures};
    use ndarray::{Array2, array};
    use rand::prelude::*;

    fn xor_data() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
        ];
        let y = vec![0, 1, 1, 0, 0, 1, 1, 0];
        (x, y)
    }

    fn random_data(n: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, 4), |_| rng.gen_range(0..16) as f64);
        let y = x.rows().into_iter().map(|r| usize::from(r[0] + r[1] > 15.0)).collect();
        (x, y)
    }

    fn grow(x: &Array2<f64>, y: &[usize], params: &TreeParams) -> Tree {
        let w = vec![1.0; y.len()];
        let c = ClassCriterion::new(y, 2, Criterion::Gini);
        TreeGrower::new(x.view(), &w, &c, params).grow(&mut StdRng::seed_from_u64(3))
    }

    /// Grower state owned by the caller, the way trainers build it.
    fn grow_from_view(features: ArrayView2<'_, f64>, y: &[usize]) -> Tree {
        let weights = vec![1.0; y.len()];
        let criterion = ClassCriterion::new(y, 2, Criterion::Gini);
        let params = TreeParams::depth_wise(2);
        TreeGrower::new(features.view(), &weights, &criterion, &params).grow(&mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn grows_from_a_borrowed_view() {
        let (x, y) = xor_data();
        let tree = grow_from_view(x.view(), &y);
        assert_eq!(tree.n_leaves(), 4);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn fits_xor_exactly() {
        let (x, y) = xor_data();
        let tree = grow(&x, &y, &TreeParams::default());
        assert!(tree.validate().is_ok());
        assert_eq!(tree.n_leaves(), 4);
        for (row, &label) in x.rows().into_iter().zip(&y) {
            assert_eq!(crate::utils::argmax(tree.predict_row(row)), label);
        }
    }

    #[test]
    fn depth_limit() {
        let (x, y) = random_data(200, 1);
        for max_depth in [1, 2, 3] {
            let tree = grow(&x, &y, &TreeParams::depth_wise(max_depth));
            assert!(tree.depth() <= max_depth as usize);
        }
    }

    #[test]
    fn leaf_budget() {
        let (x, y) = random_data(200, 2);
        for max_leaves in [2, 5, 10] {
            let tree = grow(&x, &y, &TreeParams::leaf_wise(max_leaves));
            assert!(tree.validate().is_ok());
            assert!(tree.n_leaves() <= max_leaves as usize);
        }
    }

    #[test]
    fn min_samples_leaf_and_weight_fraction() {
        let (x, y) = random_data(200, 3);
        let params = TreeParams {
            min_samples_leaf: 7,
            ..Default::default()
        };
        let tree = grow(&x, &y, &params);
        for leaf in tree.leaves() {
            assert!(tree.weighted_n_samples(leaf) >= 7.0);
        }

        let params = TreeParams {
            min_weight_fraction_leaf: 0.2,
            ..Default::default()
        };
        let tree = grow(&x, &y, &params);
        for leaf in tree.leaves() {
            assert!(tree.weighted_n_samples(leaf) >= 40.0);
        }
    }

    #[test]
    fn min_samples_split_stops_small_nodes() {
        let (x, y) = random_data(100, 4);
        let params = TreeParams {
            min_samples_split: 30,
            ..Default::default()
        };
        let tree = grow(&x, &y, &params);
        for node in 0..tree.n_nodes() as NodeId {
            if !tree.is_leaf(node) {
                assert!(tree.weighted_n_samples(node) >= 30.0);
            }
        }
    }

    #[test]
    fn zero_weight_rows_are_ignored() {
        let (x, y) = xor_data();
        let w = [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let c = ClassCriterion::new(&y, 2, Criterion::Gini);
        let params = TreeParams::default();
        let tree = TreeGrower::new(x.view(), &w, &c, &params).grow(&mut StdRng::seed_from_u64(0));
        assert_eq!(tree.weighted_n_samples(0), 4.0);
    }

    #[test]
    fn feature_subsampling_is_seeded() {
        let (x, y) = random_data(150, 5);
        let params = TreeParams {
            max_features: MaxFeatures::Count(1),
            ..TreeParams::depth_wise(4)
        };
        let w = vec![1.0; y.len()];
        let c = ClassCriterion::new(&y, 2, Criterion::Gini);
        let grower = TreeGrower::new(x.view(), &w, &c, &params);
        let a = grower.grow(&mut StdRng::seed_from_u64(11));
        let b = grower.grow(&mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
