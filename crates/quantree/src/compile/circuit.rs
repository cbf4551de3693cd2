//! Matrix lowering of quantized trees.
//!
//! Each tree becomes five arrays evaluated without data-dependent branches:
//!
//! ```text
//! bits[i]  = q[A[i]] <= B[i]            one comparison per internal node
//! sums     = bits @ C                    C[i, j] = +1 / -1 / 0
//! select_j = sums[j] == D[j]             exactly one leaf matches
//! out      = select @ E                  E[j, :] is the leaf vector
//! ```
//!
//! `C[i, j]` is `+1` when leaf `j` sits in the left subtree of node `i`, `-1`
//! in the right subtree and `0` otherwise; `D[j]` counts the left turns on
//! the path to leaf `j`. Only the true path reaches `D[j]`: a left turn not
//! taken or a right turn taken both lower the sum.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::repr::{NodeId, QuantizedForest, QuantizedTree};

/// Lowered form of one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeCircuit {
    /// Feature compared at each internal node.
    pub a: Array1<u32>,
    /// Integer threshold of each internal node.
    pub b: Array1<i64>,
    /// `[n_internal, n_leaves]` path matrix.
    pub c: Array2<i64>,
    /// Left-turn count per leaf.
    pub d: Array1<i64>,
    /// `[n_leaves, leaf_width]` leaf values.
    pub e: Array2<i64>,
}

impl TreeCircuit {
    pub fn lower(tree: &QuantizedTree) -> Self {
        let internal: Vec<NodeId> = tree.internal_nodes().collect();
        let leaves: Vec<NodeId> = tree.leaves().collect();
        let mut internal_pos = vec![usize::MAX; tree.n_nodes()];
        for (i, &node) in internal.iter().enumerate() {
            internal_pos[node as usize] = i;
        }
        let mut leaf_pos = vec![usize::MAX; tree.n_nodes()];
        for (j, &node) in leaves.iter().enumerate() {
            leaf_pos[node as usize] = j;
        }

        let a = internal.iter().map(|&n| tree.split_index(n)).collect();
        let b = internal.iter().map(|&n| tree.threshold(n)).collect();
        let mut c = Array2::zeros((internal.len(), leaves.len()));
        let mut d = Array1::zeros(leaves.len());
        let mut e = Array2::zeros((leaves.len(), tree.leaf_width()));

        // (node, path of (internal position, went left))
        let mut stack: Vec<(NodeId, Vec<(usize, bool)>)> = vec![(0, Vec::new())];
        while let Some((node, path)) = stack.pop() {
            if tree.is_leaf(node) {
                let j = leaf_pos[node as usize];
                for &(i, left) in &path {
                    c[[i, j]] = if left { 1 } else { -1 };
                }
                d[j] = path.iter().filter(|(_, left)| *left).count() as i64;
                for (k, &v) in tree.leaf_value(node).iter().enumerate() {
                    e[[j, k]] = v;
                }
                continue;
            }
            let i = internal_pos[node as usize];
            let mut left_path = path.clone();
            left_path.push((i, true));
            let mut right_path = path;
            right_path.push((i, false));
            stack.push((tree.right_child(node), right_path));
            stack.push((tree.left_child(node), left_path));
        }

        Self { a, b, c, d, e }
    }

    #[inline]
    pub fn n_internal(&self) -> usize {
        self.a.len()
    }

    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.d.len()
    }

    #[inline]
    pub fn leaf_width(&self) -> usize {
        self.e.ncols()
    }

    /// Longest root-to-leaf path, read off the path matrix.
    pub fn depth(&self) -> usize {
        self.c
            .axis_iter(Axis(1))
            .map(|col| col.iter().filter(|&&v| v != 0).count())
            .max()
            .unwrap_or(0)
    }

    /// Clear evaluation of one quantized sample.
    pub fn evaluate(&self, sample: ArrayView1<'_, i64>) -> Array1<i64> {
        let bits: Array1<i64> = self
            .a
            .iter()
            .zip(&self.b)
            .map(|(&f, &t)| i64::from(sample[f as usize] <= t))
            .collect();
        let sums = bits.dot(&self.c);
        let select: Array1<i64> = sums.iter().zip(&self.d).map(|(&s, &d)| i64::from(s == d)).collect();
        select.dot(&self.e)
    }
}

/// Per-circuit size summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    pub n_trees: usize,
    pub n_internal_nodes: usize,
    pub n_leaves: usize,
    /// Table lookups per evaluated sample: one comparison per internal node
    /// and one equality test per leaf.
    pub luts_per_sample: usize,
    /// Integer width every intermediate value fits in.
    pub bit_width: u32,
}

/// A lowered forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestCircuit {
    trees: Vec<TreeCircuit>,
    n_features: usize,
    input_bits: u32,
    output_max: i64,
}

impl ForestCircuit {
    /// Lower every tree of `forest`; inputs are `n_features` unsigned
    /// integers of `input_bits` bits.
    pub fn lower(forest: &QuantizedForest, n_features: usize, input_bits: u8) -> Self {
        let trees = forest.trees().map(TreeCircuit::lower).collect();
        Self {
            trees,
            n_features,
            input_bits: u32::from(input_bits),
            output_max: forest.output_quantizer().q_max(),
        }
    }

    pub fn trees(&self) -> &[TreeCircuit] {
        &self.trees
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn input_bits(&self) -> u32 {
        self.input_bits
    }

    pub fn leaf_width(&self) -> usize {
        self.trees.first().map_or(0, TreeCircuit::leaf_width)
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(TreeCircuit::depth).max().unwrap_or(0)
    }

    /// Bits needed by the widest intermediate value.
    ///
    /// Inputs are unsigned `input_bits` values, path sums are signed values
    /// in `[-depth, depth]`, and outputs are unsigned leaf integers.
    pub fn bit_width(&self) -> u32 {
        let path_bits = signed_bits(self.max_depth() as i64);
        let output_bits = unsigned_bits(self.output_max);
        self.input_bits.max(path_bits).max(output_bits)
    }

    pub fn stats(&self) -> CircuitStats {
        let n_internal_nodes = self.trees.iter().map(TreeCircuit::n_internal).sum();
        let n_leaves = self.trees.iter().map(TreeCircuit::n_leaves).sum();
        CircuitStats {
            n_trees: self.n_trees(),
            n_internal_nodes,
            n_leaves,
            luts_per_sample: n_internal_nodes + n_leaves,
            bit_width: self.bit_width(),
        }
    }

    /// Clear evaluation; output shape `[n_samples, n_trees, leaf_width]`.
    pub fn evaluate(&self, inputs: ArrayView2<'_, i64>) -> Array3<i64> {
        let mut out = Array3::zeros((inputs.nrows(), self.n_trees(), self.leaf_width()));
        for (sample, mut dst) in inputs.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            for (t, tree) in self.trees.iter().enumerate() {
                dst.row_mut(t).assign(&tree.evaluate(sample));
            }
        }
        out
    }
}

/// Bits of an unsigned integer in `[0, max]`.
pub(crate) fn unsigned_bits(max: i64) -> u32 {
    if max <= 0 { 1 } else { 64 - (max as u64).leading_zeros() }
}

/// Bits of a two's-complement integer in `[-max, max]`.
pub(crate) fn signed_bits(max: i64) -> u32 {
    unsigned_bits(max) + 1
}
