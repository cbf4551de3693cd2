//! Integer trees evaluated on quantized inputs.
//!
//! Trees are trained on quantized features held as `f64`, so every split
//! threshold is the midpoint of two integers (possibly itself an integer).
//! For integer `q`, `q <= t` iff `q <= floor(t)`, so flooring keeps every
//! decision.
//! Leaf values of the whole ensemble are quantized by one output quantizer.

use ndarray::{Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::tree::validate_structure;
use super::{Forest, NodeId, Tree, TreeValidationError};
use crate::quantization::{QuantizationError, UniformQuantizer};

/// A [`Tree`] with integer thresholds and integer leaf values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTree {
    split_indices: Box<[u32]>,
    thresholds: Box<[i64]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    is_leaf: Box<[bool]>,
    leaf_width: usize,
    leaf_values: Box<[i64]>,
}

impl QuantizedTree {
    /// Quantize `tree` with the shared `output` quantizer.
    pub fn from_tree(tree: &Tree, output: &UniformQuantizer) -> Self {
        let n_nodes = tree.n_nodes();
        let leaf_width = tree.leaf_width();
        let mut split_indices = Vec::with_capacity(n_nodes);
        let mut thresholds = Vec::with_capacity(n_nodes);
        let mut left_children = Vec::with_capacity(n_nodes);
        let mut right_children = Vec::with_capacity(n_nodes);
        let mut is_leaf = Vec::with_capacity(n_nodes);
        let mut leaf_values = Vec::with_capacity(n_nodes * leaf_width);

        for node in 0..n_nodes as NodeId {
            let leaf = tree.is_leaf(node);
            is_leaf.push(leaf);
            split_indices.push(tree.split_index(node));
            thresholds.push(if leaf { 0 } else { tree.split_threshold(node).floor() as i64 });
            left_children.push(tree.left_child(node));
            right_children.push(tree.right_child(node));
            if leaf {
                leaf_values.extend(tree.leaf_value(node).iter().map(|&v| output.quantize(v)));
            } else {
                leaf_values.extend(std::iter::repeat_n(0, leaf_width));
            }
        }

        Self {
            split_indices: split_indices.into_boxed_slice(),
            thresholds: thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_width,
            leaf_values: leaf_values.into_boxed_slice(),
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

    /// Integer threshold; a sample goes left when `q <= threshold`.
    #[inline]
    pub fn threshold(&self, node: NodeId) -> i64 {
        self.thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> &[i64] {
        let start = node as usize * self.leaf_width;
        &self.leaf_values[start..start + self.leaf_width]
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.n_nodes() as NodeId).filter(|&n| self.is_leaf(n))
    }

    pub fn internal_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.n_nodes() as NodeId).filter(|&n| !self.is_leaf(n))
    }

    pub fn validate(&self) -> Result<(), TreeValidationError> {
        validate_structure(&self.is_leaf, &self.left_children, &self.right_children)
    }

    #[inline]
    pub fn traverse_to_leaf(&self, sample: ArrayView1<'_, i64>) -> NodeId {
        let mut node = 0;
        while !self.is_leaf(node) {
            node = if sample[self.split_index(node) as usize] <= self.threshold(node) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        node
    }
}

/// Quantized ensemble plus the quantizer that decodes its leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedForest {
    trees: Vec<QuantizedTree>,
    tree_groups: Vec<u32>,
    n_groups: u32,
    output_quantizer: UniformQuantizer,
}

impl QuantizedForest {
    /// Quantize every tree of `forest`, calibrating one output quantizer on
    /// all leaf values.
    pub fn quantize(forest: &Forest, n_bits: u8) -> Result<Self, QuantizationError> {
        let output_quantizer = UniformQuantizer::fit(n_bits, forest.leaf_values())?;
        let trees = forest
            .trees()
            .map(|tree| QuantizedTree::from_tree(tree, &output_quantizer))
            .collect();
        Ok(Self {
            trees,
            tree_groups: forest.tree_groups().to_vec(),
            n_groups: forest.n_groups(),
            output_quantizer,
        })
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_groups(&self) -> u32 {
        self.n_groups
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &QuantizedTree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> impl Iterator<Item = &QuantizedTree> {
        self.trees.iter()
    }

    #[inline]
    pub fn tree_groups(&self) -> &[u32] {
        &self.tree_groups
    }

    #[inline]
    pub fn output_quantizer(&self) -> &UniformQuantizer {
        &self.output_quantizer
    }

    pub fn leaf_width(&self) -> usize {
        self.trees.first().map_or(0, QuantizedTree::leaf_width)
    }

    /// Integer leaf vectors reached by each quantized sample in each tree.
    ///
    /// Output shape is `[n_samples, n_trees, leaf_width]`.
    pub fn tree_outputs(&self, inputs: ArrayView2<'_, i64>) -> Array3<i64> {
        let mut out = Array3::zeros((inputs.nrows(), self.n_trees(), self.leaf_width()));
        for (sample, mut dst) in inputs.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            for (t, tree) in self.trees.iter().enumerate() {
                let leaf = tree.traverse_to_leaf(sample);
                for (k, &v) in tree.leaf_value(leaf).iter().enumerate() {
                    dst[[t, k]] = v;
                }
            }
        }
        out
    }

    /// Decode integer tree outputs into leaf-value units.
    pub fn dequantize_outputs(&self, outputs: &Array3<i64>) -> Array3<f64> {
        outputs.mapv(|q| self.output_quantizer.dequantize(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn forest() -> Forest {
        let mut forest = Forest::new(1);
        forest.push_tree(
            crate::class_tree! {
                0 => split(0, 2.5) -> 1, 2,
                1 => leaf[1.0, 0.0],
                2 => split(1, 10.5) -> 3, 4,
                3 => leaf[0.25, 0.75],
                4 => leaf[0.0, 1.0],
            },
            0,
        );
        forest
    }

    #[test]
    fn thresholds_are_floored() {
        let q = QuantizedForest::quantize(&forest(), 2).unwrap();
        let tree = q.tree(0);
        assert_eq!(tree.threshold(0), 2);
        assert_eq!(tree.threshold(2), 10);
        assert_eq!(tree.internal_nodes().collect::<Vec<_>>(), vec![0, 2]);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn integer_midpoints_keep_decisions() {
        // observed values 3 and 5 split at 4.0, which is already an integer
        let mut float = Forest::new(1);
        float.push_tree(
            crate::class_tree! {
                0 => split(0, 4.0) -> 1, 2,
                1 => leaf[1.0, 0.0],
                2 => leaf[0.0, 1.0],
            },
            0,
        );
        let q = QuantizedForest::quantize(&float, 3).unwrap();
        assert_eq!(q.tree(0).threshold(0), 4);
        let samples = array![[3], [4], [5]];
        let decoded = q.dequantize_outputs(&q.tree_outputs(samples.view()));
        let expected = float.tree_outputs(samples.mapv(|v| v as f64).view());
        for (a, b) in decoded.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn leaves_share_one_quantizer() {
        let q = QuantizedForest::quantize(&forest(), 2).unwrap();
        let oq = q.output_quantizer();
        assert_abs_diff_eq!(oq.scale(), 1.0 / 3.0);
        assert_eq!(q.tree(0).leaf_value(1), &[3, 0]);
        assert_eq!(q.tree(0).leaf_value(4), &[0, 3]);
        // 0.75 * 3 = 2.25 -> 2
        assert_eq!(q.tree(0).leaf_value(3), &[1, 2]);
    }

    #[test]
    fn integer_traversal_matches_float() {
        let float = forest();
        let q = QuantizedForest::quantize(&float, 4).unwrap();
        let samples = array![[2, 0], [3, 10], [3, 11], [0, 50]];
        let outputs = q.tree_outputs(samples.view());
        let decoded = q.dequantize_outputs(&outputs);
        let expected = float.tree_outputs(samples.mapv(|v| v as f64).view());
        for (a, b) in decoded.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = q.output_quantizer().scale());
        }
    }
}
