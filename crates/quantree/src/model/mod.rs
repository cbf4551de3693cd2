//! Quantized tree classifiers.
//!
//! - [`DecisionTreeClassifier`], [`RandomForestClassifier`], [`XGBClassifier`]
//! - [`TreeClassifier`]: the shared fit / compile / predict / score contract
//! - [`ReferenceClassifier`]: float counterpart returned by `fit_benchmark`
//!
//! A classifier is configured once at construction. `fit` replaces any
//! previous fitted state and drops the compiled circuit; `compile` attaches a
//! circuit to the current fit.

mod classifiers;
mod config;
mod ensemble;
mod reference;

pub use classifiers::{DecisionTreeClassifier, RandomForestClassifier, XGBClassifier};
pub use config::{BoostingConfig, DEFAULT_N_BITS, DecisionTreeConfig, ForestConfig};
pub use ensemble::{EnsembleKind, FittedEnsemble};
pub use reference::ReferenceClassifier;

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::compile::{CircuitStats, CompileConfig, CompileError, CompiledModel, ExecutionError, compile_forest};
use crate::data::DatasetError;
use crate::quantization::QuantizationError;
use crate::repr::ForestValidationError;
use crate::training::{EnsembleTrainer, ParamValidationError};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by `fit` and `fit_benchmark`.
#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("You must provide at least 2 classes in y.")]
    TooFewClasses { found: usize },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("invalid parameters: {0}")]
    Params(#[from] ParamValidationError),

    #[error("quantization failed: {0}")]
    Quantization(#[from] QuantizationError),

    #[error("trained forest is invalid: {0}")]
    Forest(#[from] ForestValidationError),
}

/// Errors raised by `predict`, `predict_proba` and `score`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("model is not fitted")]
    NotFitted,

    #[error("model must be compiled before FHE execution")]
    NotCompiled,

    #[error("expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("{got} labels for {expected} samples")]
    LabelMismatch { expected: usize, got: usize },

    #[error("cannot score an empty set")]
    EmptyInput,

    #[error(transparent)]
    Quantization(#[from] QuantizationError),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

/// Errors raised by JSON persistence.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("model is not fitted")]
    NotFitted,

    #[error("stored model is a {found}, expected a {expected}")]
    KindMismatch { expected: EnsembleKind, found: EnsembleKind },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Execution
// =============================================================================

/// Where predictions are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    /// The quantized forest evaluated directly.
    #[default]
    Clear,
    /// The compiled circuit on its backend.
    Fhe,
}

/// Fitted and compiled state of a classifier.
#[derive(Debug, Default)]
pub struct ModelState {
    fitted: Option<FittedEnsemble>,
    compiled: Option<CompiledModel>,
}

impl ModelState {
    pub(crate) fn from_fitted(fitted: FittedEnsemble) -> Self {
        Self {
            fitted: Some(fitted),
            compiled: None,
        }
    }

    pub fn fitted(&self) -> Option<&FittedEnsemble> {
        self.fitted.as_ref()
    }

    pub fn compiled(&self) -> Option<&CompiledModel> {
        self.compiled.as_ref()
    }
}

/// Fraction of equal entries.
pub(crate) fn accuracy(predictions: ArrayView1<'_, i64>, labels: ArrayView1<'_, i64>) -> Result<f64, PredictError> {
    if predictions.len() != labels.len() {
        return Err(PredictError::LabelMismatch {
            expected: predictions.len(),
            got: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(PredictError::EmptyInput);
    }
    let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
    Ok(correct as f64 / labels.len() as f64)
}

// =============================================================================
// TreeClassifier
// =============================================================================

/// Shared classifier contract.
///
/// Implementors supply their configuration through the required methods;
/// the pipeline itself is provided.
///
/// # Example
///
/// ```
/// use quantree::{ClassificationParams, CompileConfig, DecisionTreeClassifier, Execution, TreeClassifier};
///
/// let data = quantree::make_classification(&ClassificationParams::builder().n_samples(60).n_features(4).build().unwrap()).unwrap();
/// let mut model = DecisionTreeClassifier::default();
/// model.fit(data.features(), data.labels()).unwrap();
/// model.compile(data.features(), &CompileConfig::default(), true).unwrap();
///
/// let x = data.features().slice_move(ndarray::s![..5, ..]);
/// let clear = model.predict(x, Execution::Clear).unwrap();
/// let fhe = model.predict(x, Execution::Fhe).unwrap();
/// assert_eq!(clear, fhe);
/// ```
pub trait TreeClassifier: fmt::Debug + Send + Sync {
    fn kind(&self) -> EnsembleKind;

    /// Bits per quantized input and leaf value.
    fn n_bits(&self) -> u8;

    /// Check the configuration before fitting.
    fn validate_config(&self) -> Result<(), ParamValidationError>;

    /// A trainer configured from this model's hyperparameters.
    fn trainer(&self) -> Box<dyn EnsembleTrainer>;

    fn state(&self) -> &ModelState;

    fn state_mut(&mut self) -> &mut ModelState;

    /// Fit on `x` (`[n_samples, n_features]`) and labels `y`.
    ///
    /// # Errors
    ///
    /// [`FitError::TooFewClasses`] when `y` holds a single class, and shape,
    /// parameter or quantization errors otherwise.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, i64>) -> Result<(), FitError> {
        self.validate_config()?;
        let trainer = self.trainer();
        let fitted = FittedEnsemble::fit(self.kind(), trainer.as_ref(), self.n_bits(), x, y)?;
        *self.state_mut() = ModelState::from_fitted(fitted);
        Ok(())
    }

    /// Fit, and also fit the same trainer on unquantized `x`.
    fn fit_benchmark(
        mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, i64>,
    ) -> Result<(Self, ReferenceClassifier), FitError>
    where
        Self: Sized,
    {
        self.fit(x, y)?;
        let reference = ReferenceClassifier::fit(self.kind(), self.trainer().as_ref(), x, y)?;
        Ok((self, reference))
    }

    /// Lower the fitted model to a circuit, calibrated on `x`.
    ///
    /// `use_virtual_lib` selects clear integer execution instead of LWE.
    fn compile(
        &mut self,
        x: ArrayView2<'_, f64>,
        config: &CompileConfig,
        use_virtual_lib: bool,
    ) -> Result<CircuitStats, CompileError> {
        let fitted = self.state().fitted().ok_or(CompileError::NotFitted)?;
        if x.nrows() == 0 {
            return Err(CompileError::EmptyCalibration);
        }
        if x.ncols() != fitted.n_features() {
            return Err(CompileError::FeatureMismatch {
                expected: fitted.n_features(),
                got: x.ncols(),
            });
        }
        let calibration = fitted.input_quantizers().quantize(x)?;
        let compiled = compile_forest(
            fitted.quantized(),
            self.n_bits(),
            calibration.view(),
            config,
            use_virtual_lib,
        )?;
        let stats = *compiled.stats();
        self.state_mut().compiled = Some(compiled);
        Ok(stats)
    }

    /// Class probabilities, `[n_samples, n_classes]`, columns in
    /// [`classes`](Self::classes) order.
    fn predict_proba(&self, x: ArrayView2<'_, f64>, execution: Execution) -> Result<Array2<f64>, PredictError> {
        let fitted = self.state().fitted().ok_or(PredictError::NotFitted)?;
        match execution {
            Execution::Clear => fitted.predict_proba_clear(x),
            Execution::Fhe => {
                let compiled = self.state().compiled().ok_or(PredictError::NotCompiled)?;
                fitted.predict_proba_compiled(compiled, x)
            }
        }
    }

    fn predict(&self, x: ArrayView2<'_, f64>, execution: Execution) -> Result<Array1<i64>, PredictError> {
        let proba = self.predict_proba(x, execution)?;
        let fitted = self.state().fitted().ok_or(PredictError::NotFitted)?;
        Ok(fitted.labels(&proba))
    }

    /// Clear-execution accuracy on `x` / `y`.
    fn score(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, i64>) -> Result<f64, PredictError> {
        let predictions = self.predict(x, Execution::Clear)?;
        accuracy(predictions.view(), y)
    }

    /// Sorted distinct training labels.
    fn classes(&self) -> Option<&[i64]> {
        self.state().fitted().map(FittedEnsemble::classes)
    }

    fn is_fitted(&self) -> bool {
        self.state().fitted().is_some()
    }

    fn circuit(&self) -> Option<&CompiledModel> {
        self.state().compiled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accuracy_counts_matches() {
        assert_eq!(accuracy(array![1, 2, 3, 4].view(), array![1, 0, 3, 0].view()), Ok(0.5));
        assert_eq!(
            accuracy(array![1].view(), array![1, 2].view()),
            Err(PredictError::LabelMismatch { expected: 1, got: 2 })
        );
        assert_eq!(
            accuracy(Array1::<i64>::zeros(0).view(), Array1::<i64>::zeros(0).view()),
            Err(PredictError::EmptyInput)
        );
    }

    #[test]
    fn too_few_classes_message() {
        let err = FitError::TooFewClasses { found: 1 };
        assert_eq!(err.to_string(), "You must provide at least 2 classes in y.");
    }
}
