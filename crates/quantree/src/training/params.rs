//! Tree-growing parameters shared by every trainer.
//!
//! [`TreeParams`] carries the CART controls (depth, sample counts, feature
//! subsampling, leaf budget, impurity criterion). [`HyperParam`] names one
//! such control with its value, so hyperparameter sweeps can be written as
//! plain lists.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quantization::MAX_N_BITS;

// =============================================================================
// MaxFeatures
// =============================================================================

/// Number of features evaluated when searching a node's split.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Every feature.
    #[default]
    All,
    /// `max(1, floor(sqrt(n_features)))`.
    Sqrt,
    /// `max(1, floor(log2(n_features)))`.
    Log2,
    /// A fixed count, capped at `n_features`.
    Count(usize),
    /// `max(1, floor(fraction * n_features))`, fraction in `(0, 1]`.
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve against the number of columns.
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::Count(count) => count,
            MaxFeatures::Fraction(fraction) => (fraction * n) as usize,
        };
        k.clamp(1, n_features.max(1))
    }

    fn is_valid(&self) -> bool {
        match *self {
            MaxFeatures::Count(count) => count >= 1,
            MaxFeatures::Fraction(fraction) => fraction > 0.0 && fraction <= 1.0,
            _ => true,
        }
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::All => write!(f, "None"),
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Count(count) => write!(f, "{count}"),
            MaxFeatures::Fraction(fraction) => write!(f, "{fraction}"),
        }
    }
}

// =============================================================================
// Criterion / GrowthStrategy
// =============================================================================

/// Impurity measure for classification trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

/// How the grower picks the next node to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthStrategy {
    /// Expand every splittable node, deepest first, until `max_depth`.
    DepthWise { max_depth: Option<u32> },
    /// Expand the node with the largest impurity decrease until the tree
    /// holds `max_leaves` leaves.
    LeafWise { max_leaves: u32, max_depth: Option<u32> },
}

impl GrowthStrategy {
    pub fn max_depth(&self) -> Option<u32> {
        match *self {
            GrowthStrategy::DepthWise { max_depth } | GrowthStrategy::LeafWise { max_depth, .. } => max_depth,
        }
    }
}

// =============================================================================
// TreeParams
// =============================================================================

/// Tree structure parameters.
///
/// # Example
///
/// ```
/// use quantree::training::{MaxFeatures, TreeParams};
///
/// let params = TreeParams::depth_wise(7);
/// assert_eq!(params.max_depth, Some(7));
///
/// let params = TreeParams { max_leaf_nodes: Some(10), ..TreeParams::forest() };
/// assert_eq!(params.max_features, MaxFeatures::Sqrt);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth; `None` grows until leaves are pure. Default: `None`.
    pub max_depth: Option<u32>,
    /// Minimum samples needed to split a node. Default: 2.
    pub min_samples_split: usize,
    /// Minimum samples in each child. Default: 1.
    pub min_samples_leaf: usize,
    /// Minimum fraction of total sample weight in each child. Default: 0.0.
    pub min_weight_fraction_leaf: f64,
    /// Features evaluated per split. Default: all.
    pub max_features: MaxFeatures,
    /// Leaf budget; `Some` switches to best-first growth. Default: `None`.
    pub max_leaf_nodes: Option<u32>,
    /// Default: Gini.
    pub criterion: Criterion,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            min_weight_fraction_leaf: 0.0,
            max_features: MaxFeatures::All,
            max_leaf_nodes: None,
            criterion: Criterion::Gini,
        }
    }
}

impl TreeParams {
    /// Defaults with a depth limit.
    pub fn depth_wise(max_depth: u32) -> Self {
        Self {
            max_depth: Some(max_depth),
            ..Default::default()
        }
    }

    /// Defaults with a leaf budget (best-first growth).
    pub fn leaf_wise(max_leaves: u32) -> Self {
        Self {
            max_leaf_nodes: Some(max_leaves),
            ..Default::default()
        }
    }

    /// Random forest defaults: square-root feature subsampling.
    pub fn forest() -> Self {
        Self {
            max_features: MaxFeatures::Sqrt,
            ..Default::default()
        }
    }

    pub fn growth_strategy(&self) -> GrowthStrategy {
        match self.max_leaf_nodes {
            None => GrowthStrategy::DepthWise {
                max_depth: self.max_depth,
            },
            Some(max_leaves) => GrowthStrategy::LeafWise {
                max_leaves,
                max_depth: self.max_depth,
            },
        }
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range parameter.
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.max_depth == Some(0) {
            return Err(ParamValidationError::InvalidMaxDepth(0));
        }
        if self.min_samples_split < 2 {
            return Err(ParamValidationError::InvalidMinSamplesSplit(self.min_samples_split));
        }
        if self.min_samples_leaf < 1 {
            return Err(ParamValidationError::InvalidMinSamplesLeaf(self.min_samples_leaf));
        }
        if !(0.0..=0.5).contains(&self.min_weight_fraction_leaf) {
            return Err(ParamValidationError::InvalidMinWeightFractionLeaf(
                self.min_weight_fraction_leaf,
            ));
        }
        if !self.max_features.is_valid() {
            return Err(ParamValidationError::InvalidMaxFeatures(self.max_features));
        }
        if let Some(max_leaves) = self.max_leaf_nodes
            && max_leaves < 2
        {
            return Err(ParamValidationError::InvalidMaxLeafNodes(max_leaves));
        }
        Ok(())
    }
}

/// Check a quantization bit width.
pub(crate) fn validate_n_bits(n_bits: u8) -> Result<(), ParamValidationError> {
    if n_bits == 0 || n_bits > MAX_N_BITS {
        return Err(ParamValidationError::InvalidNBits(n_bits));
    }
    Ok(())
}

// =============================================================================
// HyperParam
// =============================================================================

/// One named tree hyperparameter with its value.
///
/// `Display` renders `name=value`, e.g. `max_depth=3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HyperParam {
    MaxDepth(Option<u32>),
    MinSamplesSplit(usize),
    MinSamplesLeaf(usize),
    MinWeightFractionLeaf(f64),
    MaxFeatures(MaxFeatures),
    MaxLeafNodes(Option<u32>),
}

impl HyperParam {
    pub fn name(&self) -> &'static str {
        match self {
            HyperParam::MaxDepth(_) => "max_depth",
            HyperParam::MinSamplesSplit(_) => "min_samples_split",
            HyperParam::MinSamplesLeaf(_) => "min_samples_leaf",
            HyperParam::MinWeightFractionLeaf(_) => "min_weight_fraction_leaf",
            HyperParam::MaxFeatures(_) => "max_features",
            HyperParam::MaxLeafNodes(_) => "max_leaf_nodes",
        }
    }

    /// Overwrite the matching field of `params`.
    pub fn apply(&self, params: &mut TreeParams) {
        match *self {
            HyperParam::MaxDepth(v) => params.max_depth = v,
            HyperParam::MinSamplesSplit(v) => params.min_samples_split = v,
            HyperParam::MinSamplesLeaf(v) => params.min_samples_leaf = v,
            HyperParam::MinWeightFractionLeaf(v) => params.min_weight_fraction_leaf = v,
            HyperParam::MaxFeatures(v) => params.max_features = v,
            HyperParam::MaxLeafNodes(v) => params.max_leaf_nodes = v,
        }
    }

    /// `TreeParams::default()` with this value applied.
    pub fn to_params(&self) -> TreeParams {
        let mut params = TreeParams::default();
        self.apply(&mut params);
        params
    }

    /// The sweep used to check quantized trees against float trees.
    pub fn grid() -> Vec<HyperParam> {
        let mut grid = Vec::new();
        grid.extend([3, 4, 5, 10].map(|d| HyperParam::MaxDepth(Some(d))));
        grid.extend([2, 3, 4, 5].map(HyperParam::MinSamplesSplit));
        grid.extend([1, 2, 3, 4].map(HyperParam::MinSamplesLeaf));
        grid.extend([0.0, 0.1, 0.2, 0.3].map(HyperParam::MinWeightFractionLeaf));
        grid.extend([MaxFeatures::Sqrt, MaxFeatures::Log2].map(HyperParam::MaxFeatures));
        grid.extend([None, Some(5), Some(10), Some(20)].map(HyperParam::MaxLeafNodes));
        grid
    }
}

impl fmt::Display for HyperParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<u32>| v.map_or_else(|| "None".to_string(), |v| v.to_string());
        match self {
            HyperParam::MaxDepth(v) | HyperParam::MaxLeafNodes(v) => write!(f, "{}={}", self.name(), opt(*v)),
            HyperParam::MinSamplesSplit(v) | HyperParam::MinSamplesLeaf(v) => write!(f, "{}={v}", self.name()),
            HyperParam::MinWeightFractionLeaf(v) => write!(f, "{}={v}", self.name()),
            HyperParam::MaxFeatures(v) => write!(f, "{}={v}", self.name()),
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Parameter validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamValidationError {
    #[error("max_depth must be >= 1, got {0}")]
    InvalidMaxDepth(u32),

    #[error("min_samples_split must be >= 2, got {0}")]
    InvalidMinSamplesSplit(usize),

    #[error("min_samples_leaf must be >= 1, got {0}")]
    InvalidMinSamplesLeaf(usize),

    #[error("min_weight_fraction_leaf must be in [0, 0.5], got {0}")]
    InvalidMinWeightFractionLeaf(f64),

    #[error("max_features must be a positive count or a fraction in (0, 1], got {0}")]
    InvalidMaxFeatures(MaxFeatures),

    #[error("max_leaf_nodes must be >= 2, got {0}")]
    InvalidMaxLeafNodes(u32),

    #[error("n_bits must be in 1..={MAX_N_BITS}, got {0}")]
    InvalidNBits(u8),

    #[error("n_estimators must be > 0, got {0}")]
    InvalidNEstimators(u32),

    #[error("learning_rate must be > 0, got {0}")]
    InvalidLearningRate(f64),

    #[error("lambda must be >= 0, got {0}")]
    InvalidLambda(f64),

    #[error("gamma must be >= 0, got {0}")]
    InvalidGamma(f64),

    #[error("min_child_weight must be >= 0, got {0}")]
    InvalidMinChildWeight(f64),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn tree_params_default() {
        let params = TreeParams::default();
        assert_eq!(params.max_depth, None);
        assert_eq!(params.min_samples_split, 2);
        assert_eq!(params.min_samples_leaf, 1);
        assert_eq!(params.max_features, MaxFeatures::All);
        assert_eq!(params.growth_strategy(), GrowthStrategy::DepthWise { max_depth: None });
        assert!(params.validate().is_ok());
    }

    #[test]
    fn leaf_budget_switches_strategy() {
        let params = TreeParams {
            max_depth: Some(4),
            ..TreeParams::leaf_wise(10)
        };
        assert_eq!(
            params.growth_strategy(),
            GrowthStrategy::LeafWise { max_leaves: 10, max_depth: Some(4) }
        );
        assert_eq!(params.growth_strategy().max_depth(), Some(4));
    }

    #[rstest]
    #[case(MaxFeatures::All, 10, 10)]
    #[case(MaxFeatures::Sqrt, 10, 3)]
    #[case(MaxFeatures::Sqrt, 30, 5)]
    #[case(MaxFeatures::Log2, 10, 3)]
    #[case(MaxFeatures::Log2, 1, 1)]
    #[case(MaxFeatures::Count(50), 10, 10)]
    #[case(MaxFeatures::Fraction(0.25), 10, 2)]
    #[case(MaxFeatures::Fraction(0.01), 10, 1)]
    fn max_features_resolve(#[case] mf: MaxFeatures, #[case] n: usize, #[case] expected: usize) {
        assert_eq!(mf.resolve(n), expected);
    }

    #[test]
    fn validation() {
        let bad = |p: TreeParams| p.validate().unwrap_err();
        assert_eq!(bad(TreeParams::depth_wise(0)), ParamValidationError::InvalidMaxDepth(0));
        assert_eq!(
            bad(TreeParams { min_samples_split: 1, ..Default::default() }),
            ParamValidationError::InvalidMinSamplesSplit(1)
        );
        assert_eq!(
            bad(TreeParams { min_samples_leaf: 0, ..Default::default() }),
            ParamValidationError::InvalidMinSamplesLeaf(0)
        );
        assert_eq!(
            bad(TreeParams { min_weight_fraction_leaf: 0.6, ..Default::default() }),
            ParamValidationError::InvalidMinWeightFractionLeaf(0.6)
        );
        assert_eq!(
            bad(TreeParams { max_features: MaxFeatures::Fraction(1.5), ..Default::default() }),
            ParamValidationError::InvalidMaxFeatures(MaxFeatures::Fraction(1.5))
        );
        assert_eq!(bad(TreeParams::leaf_wise(1)), ParamValidationError::InvalidMaxLeafNodes(1));
        assert!(validate_n_bits(26).is_ok());
        assert_eq!(validate_n_bits(27), Err(ParamValidationError::InvalidNBits(27)));
    }

    #[test]
    fn hyperparam_display() {
        assert_eq!(HyperParam::MaxDepth(Some(3)).to_string(), "max_depth=3");
        assert_eq!(HyperParam::MaxLeafNodes(None).to_string(), "max_leaf_nodes=None");
        assert_eq!(HyperParam::MinWeightFractionLeaf(0.1).to_string(), "min_weight_fraction_leaf=0.1");
        assert_eq!(HyperParam::MaxFeatures(MaxFeatures::Log2).to_string(), "max_features=log2");
    }

    #[test]
    fn hyperparam_grid_is_valid() {
        let grid = HyperParam::grid();
        assert_eq!(grid.len(), 22);
        for hp in grid {
            assert!(hp.to_params().validate().is_ok(), "{hp}");
        }
    }

    #[test]
    fn hyperparam_apply() {
        let params = HyperParam::MinSamplesLeaf(3).to_params();
        assert_eq!(params.min_samples_leaf, 3);
        let params = HyperParam::MaxLeafNodes(Some(5)).to_params();
        assert!(matches!(params.growth_strategy(), GrowthStrategy::LeafWise { max_leaves: 5, .. }));
    }
}
