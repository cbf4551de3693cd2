//! Classifier configurations with validating builders.
//!
//! # Example
//!
//! ```
//! use quantree::{DecisionTreeConfig, ForestConfig, TreeParams};
//!
//! let tree = DecisionTreeConfig::builder()
//!     .n_bits(6)
//!     .tree(TreeParams::depth_wise(7))
//!     .build()
//!     .unwrap();
//! assert_eq!(tree.tree.max_depth, Some(7));
//!
//! let forest = ForestConfig::builder().n_estimators(10).build().unwrap();
//! assert!(forest.bootstrap);
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::training::{BoostingParams, ParamValidationError, TreeParams, Verbosity, validate_n_bits};

/// Default quantization bit width of every classifier.
pub const DEFAULT_N_BITS: u8 = 6;

// =============================================================================
// DecisionTreeConfig
// =============================================================================

/// Configuration of a [`DecisionTreeClassifier`](super::DecisionTreeClassifier).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct DecisionTreeConfig {
    /// Bits per quantized input and leaf value. Default: 6.
    #[builder(default = DEFAULT_N_BITS)]
    pub n_bits: u8,

    /// Tree structure. Default: unbounded depth, all features.
    #[builder(default)]
    pub tree: TreeParams,

    /// Seed for feature subsampling. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: decision_tree_config_builder::IsComplete> DecisionTreeConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ParamValidationError`] for an out-of-range bit width or tree
    /// parameter.
    pub fn build(self) -> Result<DecisionTreeConfig, ParamValidationError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl DecisionTreeConfig {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        validate_n_bits(self.n_bits)?;
        self.tree.validate()
    }
}

// =============================================================================
// ForestConfig
// =============================================================================

/// Configuration of a [`RandomForestClassifier`](super::RandomForestClassifier).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct ForestConfig {
    /// Default: 6.
    #[builder(default = DEFAULT_N_BITS)]
    pub n_bits: u8,

    /// Number of trees. Default: 100.
    #[builder(default = 100)]
    pub n_estimators: u32,

    /// Train each tree on a bootstrap sample. Default: true.
    #[builder(default = true)]
    pub bootstrap: bool,

    /// Tree structure. Default: [`TreeParams::forest`] (square-root feature
    /// subsampling).
    #[builder(default = TreeParams::forest())]
    pub tree: TreeParams,

    /// Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Training threads; 0 = auto, 1 = sequential. Default: 0.
    #[builder(default)]
    pub n_threads: usize,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: forest_config_builder::IsComplete> ForestConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<ForestConfig, ParamValidationError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        validate_n_bits(self.n_bits)?;
        if self.n_estimators == 0 {
            return Err(ParamValidationError::InvalidNEstimators(0));
        }
        self.tree.validate()
    }
}

// =============================================================================
// BoostingConfig
// =============================================================================

/// Configuration of an [`XGBClassifier`](super::XGBClassifier).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct BoostingConfig {
    /// Default: 6.
    #[builder(default = DEFAULT_N_BITS)]
    pub n_bits: u8,

    /// Boosting rounds. Default: 20.
    #[builder(default = 20)]
    pub n_estimators: u32,

    /// Default: 0.1.
    #[builder(default = 0.1)]
    pub learning_rate: f64,

    /// Default: 3.
    #[builder(default = 3)]
    pub max_depth: u32,

    /// L2 leaf regularization. Default: 1.0.
    #[builder(default = 1.0)]
    pub lambda: f64,

    /// Minimum split gain. Default: 0.0.
    #[builder(default = 0.0)]
    pub gamma: f64,

    /// Default: 1.0.
    #[builder(default = 1.0)]
    pub min_child_weight: f64,

    /// Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: boosting_config_builder::IsComplete> BoostingConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<BoostingConfig, ParamValidationError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl BoostingConfig {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        validate_n_bits(self.n_bits)?;
        self.boosting_params().validate()
    }

    pub(crate) fn boosting_params(&self) -> BoostingParams {
        BoostingParams {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            lambda: self.lambda,
            gamma: self.gamma,
            min_child_weight: self.min_child_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::MaxFeatures;

    #[test]
    fn defaults() {
        let tree = DecisionTreeConfig::default();
        assert_eq!(tree.n_bits, 6);
        assert_eq!(tree.tree, TreeParams::default());

        let forest = ForestConfig::default();
        assert_eq!(forest.n_estimators, 100);
        assert_eq!(forest.tree.max_features, MaxFeatures::Sqrt);

        let boosting = BoostingConfig::default();
        assert_eq!(boosting.n_estimators, 20);
        assert_eq!(boosting.max_depth, 3);
    }

    #[test]
    fn builders_validate() {
        assert_eq!(
            DecisionTreeConfig::builder().n_bits(0).build(),
            Err(ParamValidationError::InvalidNBits(0))
        );
        assert_eq!(
            DecisionTreeConfig::builder().n_bits(27).build(),
            Err(ParamValidationError::InvalidNBits(27))
        );
        assert!(DecisionTreeConfig::builder().n_bits(26).build().is_ok());
        assert_eq!(
            ForestConfig::builder().n_estimators(0).build(),
            Err(ParamValidationError::InvalidNEstimators(0))
        );
        assert_eq!(
            BoostingConfig::builder().lambda(-1.0).build(),
            Err(ParamValidationError::InvalidLambda(-1.0))
        );
        let bad_tree = TreeParams {
            min_samples_split: 1,
            ..Default::default()
        };
        assert_eq!(
            DecisionTreeConfig::builder().tree(bad_tree).build(),
            Err(ParamValidationError::InvalidMinSamplesSplit(1))
        );
    }
}
