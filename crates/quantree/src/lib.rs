//! quantree: quantized tree classifiers compiled for encrypted inference.
//!
//! Decision trees, random forests and gradient-boosted ensembles trained on
//! uniformly quantized inputs, then lowered to an integer circuit that runs
//! either in the clear (virtual mode) or over LWE ciphertexts.
//!
//! # Key Types
//!
//! - [`DecisionTreeClassifier`] / [`RandomForestClassifier`] / [`XGBClassifier`]
//! - [`TreeClassifier`] - Shared fit / compile / predict / score contract
//! - [`CompileConfig`] - Circuit and backend configuration
//! - [`Dataset`] - Feature matrix plus integer labels
//!
//! # Workflow
//!
//! Build a config, `fit` on training data, `compile` with a calibration set,
//! then `predict` with [`Execution::Clear`] or [`Execution::Fhe`].

pub mod compile;
pub mod data;
pub mod model;
pub mod quantization;
pub mod repr;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Models
pub use model::{
    BoostingConfig, DecisionTreeClassifier, DecisionTreeConfig, EnsembleKind, Execution,
    FitError, ForestConfig, PredictError, RandomForestClassifier, ReferenceClassifier,
    TreeClassifier, XGBClassifier,
};

// Compilation
pub use compile::{CircuitStats, CompileConfig, CompileError, CompiledModel, ExecutionMode};

// Training parameters
pub use training::{Criterion, HyperParam, MaxFeatures, ParamValidationError, TreeParams, Verbosity};

// Data
pub use data::{ClassificationParams, Dataset, DatasetError, make_classification};

// Shared utilities
pub use utils::{Parallelism, run_with_threads};
