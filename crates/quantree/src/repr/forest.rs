//! Collections of float trees with output-group assignments.

use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{NodeId, Tree, TreeValidationError};

/// Structural validation errors for [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestValidationError {
    #[error("base score has {len} entries for {n_groups} groups")]
    BaseScoreLenMismatch { n_groups: u32, len: usize },

    #[error("{len} group assignments for {n_trees} trees")]
    TreeGroupsLenMismatch { n_trees: usize, len: usize },

    #[error("tree {tree_idx} assigned to group {group} of {n_groups}")]
    TreeGroupOutOfRange { tree_idx: usize, group: u32, n_groups: u32 },

    #[error("tree {tree_idx} has leaf width {got}, forest uses {expected}")]
    LeafWidthMismatch { tree_idx: usize, expected: usize, got: usize },

    #[error("tree {tree_idx}: {error}")]
    InvalidTree { tree_idx: usize, error: TreeValidationError },
}

/// Forest of decision trees.
///
/// Each tree contributes to one output group. Classification forests that
/// average probability vectors use a single group with leaves as wide as the
/// class count; boosted ensembles use one group per margin with scalar leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<Tree>,
    tree_groups: Vec<u32>,
    n_groups: u32,
    base_score: Vec<f64>,
}

impl Forest {
    /// Create an empty forest with `n_groups` output groups.
    pub fn new(n_groups: u32) -> Self {
        Self {
            trees: Vec::new(),
            tree_groups: Vec::new(),
            n_groups,
            base_score: vec![0.0; n_groups as usize],
        }
    }

    /// Set the base score for all groups.
    pub fn with_base_score(mut self, base_score: Vec<f64>) -> Self {
        debug_assert_eq!(base_score.len(), self.n_groups as usize);
        self.base_score = base_score;
        self
    }

    pub fn push_tree(&mut self, tree: Tree, group: u32) {
        debug_assert!(group < self.n_groups, "group out of range");
        self.trees.push(tree);
        self.tree_groups.push(group);
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
    pub fn base_score(&self) -> &[f64] {
        &self.base_score
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    #[inline]
    pub fn tree_groups(&self) -> &[u32] {
        &self.tree_groups
    }

    /// Leaf width shared by every tree (0 for an empty forest).
    pub fn leaf_width(&self) -> usize {
        self.trees.first().map_or(0, Tree::leaf_width)
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }

    pub fn trees_with_groups(&self) -> impl Iterator<Item = (&Tree, u32)> {
        self.trees.iter().zip(self.tree_groups.iter()).map(|(t, &g)| (t, g))
    }

    /// Every leaf value of every tree.
    pub fn leaf_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.trees
            .iter()
            .flat_map(|tree| tree.leaves().flat_map(move |leaf: NodeId| tree.leaf_value(leaf).iter().copied()))
    }

    /// Deepest tree depth.
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }

    /// Validate trees, group assignments and base score.
    pub fn validate(&self) -> Result<(), ForestValidationError> {
        if self.base_score.len() != self.n_groups as usize {
            return Err(ForestValidationError::BaseScoreLenMismatch {
                n_groups: self.n_groups,
                len: self.base_score.len(),
            });
        }
        if self.tree_groups.len() != self.trees.len() {
            return Err(ForestValidationError::TreeGroupsLenMismatch {
                n_trees: self.trees.len(),
                len: self.tree_groups.len(),
            });
        }
        for (i, &g) in self.tree_groups.iter().enumerate() {
            if g >= self.n_groups {
                return Err(ForestValidationError::TreeGroupOutOfRange {
                    tree_idx: i,
                    group: g,
                    n_groups: self.n_groups,
                });
            }
        }
        let expected = self.leaf_width();
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.leaf_width() != expected {
                return Err(ForestValidationError::LeafWidthMismatch {
                    tree_idx: i,
                    expected,
                    got: tree.leaf_width(),
                });
            }
            tree.validate()
                .map_err(|error| ForestValidationError::InvalidTree { tree_idx: i, error })?;
        }
        Ok(())
    }

    /// Leaf vectors reached by each sample in each tree.
    ///
    /// Output shape is `[n_samples, n_trees, leaf_width]`.
    pub fn tree_outputs(&self, features: ArrayView2<'_, f64>) -> Array3<f64> {
        let mut out = Array3::zeros((features.nrows(), self.n_trees(), self.leaf_width()));
        for (sample, mut dst) in features.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            for (t, tree) in self.trees.iter().enumerate() {
                for (k, &v) in tree.predict_row(sample).iter().enumerate() {
                    dst[[t, k]] = v;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn forest() -> Forest {
        let mut forest = Forest::new(2).with_base_score(vec![0.5, -0.5]);
        forest.push_tree(
            crate::class_tree! {
                0 => split(0, 0.5) -> 1, 2,
                1 => leaf[1.0],
                2 => leaf[2.0],
            },
            0,
        );
        forest.push_tree(
            crate::class_tree! {
                0 => split(1, 0.0) -> 1, 2,
                1 => leaf[-1.0],
                2 => split(0, 3.0) -> 3, 4,
                3 => leaf[4.0],
                4 => leaf[5.0],
            },
            1,
        );
        forest
    }

    #[test]
    fn queries() {
        let f = forest();
        assert_eq!(f.n_trees(), 2);
        assert_eq!(f.n_groups(), 2);
        assert_eq!(f.leaf_width(), 1);
        assert_eq!(f.max_depth(), 2);
        assert_eq!(f.tree_groups(), &[0, 1]);
        assert_eq!(f.leaf_values().collect::<Vec<_>>(), vec![1.0, 2.0, -1.0, 4.0, 5.0]);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn tree_outputs_per_sample() {
        let out = forest().tree_outputs(array![[0.0, -1.0], [4.0, 1.0]].view());
        assert_eq!(out.shape(), &[2, 2, 1]);
        assert_eq!(out[[0, 0, 0]], 1.0);
        assert_eq!(out[[0, 1, 0]], -1.0);
        assert_eq!(out[[1, 0, 0]], 2.0);
        assert_eq!(out[[1, 1, 0]], 5.0);
    }

    #[test]
    fn validate_rejects_mixed_leaf_width() {
        let mut f = Forest::new(1);
        f.push_tree(crate::class_tree! { 0 => leaf[1.0] }, 0);
        f.push_tree(crate::class_tree! { 0 => leaf[1.0, 0.0] }, 0);
        assert!(matches!(
            f.validate(),
            Err(ForestValidationError::LeafWidthMismatch { tree_idx: 1, expected: 1, got: 2 })
        ));
    }

    #[test]
    fn validate_rejects_base_score_len() {
        let mut f = Forest::new(2);
        f.base_score.pop();
        assert_eq!(
            f.validate(),
            Err(ForestValidationError::BaseScoreLenMismatch { n_groups: 2, len: 1 })
        );
    }
}
