//! Float decision tree in structure-of-arrays form.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::NodeId;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`] and the quantized tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,

    #[error("node {node} has {side} child {child} outside {n_nodes} nodes")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },

    #[error("node {node} references itself")]
    SelfLoop { node: NodeId },

    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: NodeId },

    #[error("cycle through node {node}")]
    CycleDetected { node: NodeId },

    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
}

/// Check that the child arrays describe a tree rooted at node 0.
///
/// Iterative DFS with color marking: 0 = unvisited, 1 = visiting, 2 = done.
pub(crate) fn validate_structure(
    is_leaf: &[bool],
    left_children: &[NodeId],
    right_children: &[NodeId],
) -> Result<(), TreeValidationError> {
    let n_nodes = is_leaf.len();
    if n_nodes == 0 {
        return Err(TreeValidationError::EmptyTree);
    }

    let mut color = vec![0u8; n_nodes];
    let mut stack: Vec<(NodeId, bool)> = vec![(0, false)];

    while let Some((node, finished)) = stack.pop() {
        let idx = node as usize;
        if finished {
            color[idx] = 2;
            continue;
        }
        match color[idx] {
            0 => {}
            1 => return Err(TreeValidationError::CycleDetected { node }),
            _ => return Err(TreeValidationError::DuplicateVisit { node }),
        }
        color[idx] = 1;
        stack.push((node, true));

        if is_leaf[idx] {
            continue;
        }
        let (left, right) = (left_children[idx], right_children[idx]);
        if left == node || right == node {
            return Err(TreeValidationError::SelfLoop { node });
        }
        for (side, child) in [("left", left), ("right", right)] {
            if child as usize >= n_nodes {
                return Err(TreeValidationError::ChildOutOfBounds {
                    node,
                    side,
                    child,
                    n_nodes,
                });
            }
        }
        stack.push((right, false));
        stack.push((left, false));
    }

    match color.iter().position(|&c| c == 0) {
        Some(i) => Err(TreeValidationError::UnreachableNode { node: i as NodeId }),
        None => Ok(()),
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Binary decision tree with fixed-width vector leaves.
///
/// Child indices are local to this tree (0 = root). A sample goes left when
/// `x[split_index] <= split_threshold`. Every node carries a value vector of
/// `leaf_width` entries; only leaf values are used for prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f64]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    is_leaf: Box<[bool]>,
    leaf_width: usize,
    values: Box<[f64]>,
    weighted_n_samples: Box<[f64]>,
}

impl Tree {
    /// Create a tree from parallel per-node arrays.
    ///
    /// `values` holds `leaf_width` entries per node, row-major by node.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f64>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        is_leaf: Vec<bool>,
        leaf_width: usize,
        values: Vec<f64>,
        weighted_n_samples: Vec<f64>,
    ) -> Self {
        let n_nodes = split_indices.len();
        debug_assert_eq!(n_nodes, split_thresholds.len());
        debug_assert_eq!(n_nodes, left_children.len());
        debug_assert_eq!(n_nodes, right_children.len());
        debug_assert_eq!(n_nodes, is_leaf.len());
        debug_assert_eq!(n_nodes * leaf_width, values.len());
        debug_assert_eq!(n_nodes, weighted_n_samples.len());

        Self {
            split_indices: split_indices.into_boxed_slice(),
            split_thresholds: split_thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_width,
            values: values.into_boxed_slice(),
            weighted_n_samples: weighted_n_samples.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    #[inline]
    pub fn leaf_width(&self) -> usize {
        self.leaf_width
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f64 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    /// Value vector of `node` (the prediction when `node` is a leaf).
    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> &[f64] {
        let start = node as usize * self.leaf_width;
        &self.values[start..start + self.leaf_width]
    }

    /// Total sample weight that reached `node` during training.
    #[inline]
    pub fn weighted_n_samples(&self, node: NodeId) -> f64 {
        self.weighted_n_samples[node as usize]
    }

    /// Leaf node ids in storage order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.n_nodes() as NodeId).filter(|&n| self.is_leaf(n))
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| leaf).count()
    }

    /// Length of the longest root-to-leaf path (a lone leaf has depth 0).
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0 as NodeId, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf(node) {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((self.left_child(node), depth + 1));
                stack.push((self.right_child(node), depth + 1));
            }
        }
        max_depth
    }

    /// Validate the node graph.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        validate_structure(&self.is_leaf, &self.left_children, &self.right_children)
    }

    /// Follow splits from the root to the leaf reached by `sample`.
    #[inline]
    pub fn traverse_to_leaf(&self, sample: ArrayView1<'_, f64>) -> NodeId {
        let mut node = 0;
        while !self.is_leaf(node) {
            node = if sample[self.split_index(node) as usize] <= self.split_threshold(node) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        node
    }

    /// Leaf value reached by `sample`.
    #[inline]
    pub fn predict_row(&self, sample: ArrayView1<'_, f64>) -> &[f64] {
        self.leaf_value(self.traverse_to_leaf(sample))
    }
}

// ============================================================================
// TreeBuilder
// ============================================================================

#[derive(Debug, Clone, Default)]
struct NodeDraft {
    split: Option<(u32, f64, NodeId, NodeId)>,
    value: Vec<f64>,
    weight: f64,
}

/// Assembles a [`Tree`] node by node, in any order.
///
/// Nodes never mentioned become empty leaves. Used by the tree grower and by
/// the [`class_tree!`](crate::class_tree) macro.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    nodes: Vec<NodeDraft>,
}

impl TreeBuilder {
    fn node_mut(&mut self, id: NodeId) -> &mut NodeDraft {
        let idx = id as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, NodeDraft::default);
        }
        &mut self.nodes[idx]
    }

    /// Turn `id` into a split node. Keeps any value already recorded.
    pub fn split(&mut self, id: NodeId, feature: u32, threshold: f64, left: NodeId, right: NodeId) -> &mut Self {
        self.node_mut(id).split = Some((feature, threshold, left, right));
        self
    }

    /// Record `id` as a leaf with `value`.
    pub fn leaf(&mut self, id: NodeId, value: Vec<f64>) -> &mut Self {
        let node = self.node_mut(id);
        node.split = None;
        node.value = value;
        self
    }

    /// Set the value vector of `id` without changing its kind.
    pub fn value(&mut self, id: NodeId, value: Vec<f64>) -> &mut Self {
        self.node_mut(id).value = value;
        self
    }

    pub fn weight(&mut self, id: NodeId, weight: f64) -> &mut Self {
        self.node_mut(id).weight = weight;
        self
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Finish the tree. Shorter value vectors are zero-padded to the widest.
    pub fn build(self) -> Tree {
        let n_nodes = self.nodes.len();
        let leaf_width = self.nodes.iter().map(|n| n.value.len()).max().unwrap_or(0);

        let mut split_indices = Vec::with_capacity(n_nodes);
        let mut split_thresholds = Vec::with_capacity(n_nodes);
        let mut left_children = Vec::with_capacity(n_nodes);
        let mut right_children = Vec::with_capacity(n_nodes);
        let mut is_leaf = Vec::with_capacity(n_nodes);
        let mut values = Vec::with_capacity(n_nodes * leaf_width);
        let mut weights = Vec::with_capacity(n_nodes);

        for node in self.nodes {
            match node.split {
                Some((feature, threshold, left, right)) => {
                    split_indices.push(feature);
                    split_thresholds.push(threshold);
                    left_children.push(left);
                    right_children.push(right);
                    is_leaf.push(false);
                }
                None => {
                    split_indices.push(0);
                    split_thresholds.push(0.0);
                    left_children.push(0);
                    right_children.push(0);
                    is_leaf.push(true);
                }
            }
            let filled = node.value.len();
            values.extend(node.value);
            values.extend(std::iter::repeat_n(0.0, leaf_width - filled));
            weights.push(node.weight);
        }

        Tree::new(
            split_indices,
            split_thresholds,
            left_children,
            right_children,
            is_leaf,
            leaf_width,
            values,
            weights,
        )
    }
}
