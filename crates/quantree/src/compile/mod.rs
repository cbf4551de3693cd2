//! Lowering fitted forests to integer circuits and running them.
//!
//! [`compile_forest`] turns a [`QuantizedForest`] into a [`ForestCircuit`],
//! checks its bit width, verifies the lowering on a calibration set and
//! attaches a backend:
//!
//! - [`VirtualBackend`]: integer evaluation in the clear, any width.
//! - [`EncryptedBackend`]: LWE evaluation, width bounded by
//!   [`CompileConfig::max_bit_width`].

mod backend;
mod circuit;
mod encrypted;
pub mod lwe;

pub use backend::{CircuitBackend, ExecutionError, ExecutionMode, VirtualBackend};
pub use circuit::{CircuitStats, ForestCircuit, TreeCircuit};
pub use encrypted::EncryptedBackend;

use bon::Builder;
use ndarray::{Array3, ArrayView2};

use crate::quantization::QuantizationError;
use crate::repr::QuantizedForest;

/// Widest circuit the encrypted backend accepts; tables hold `2^(w + 1)`
/// entries.
pub const MAX_ENCRYPTED_BIT_WIDTH: u32 = 12;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by [`compile_forest`] and model compilation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("model must be fitted before compiling")]
    NotFitted,

    #[error("calibration set is empty")]
    EmptyCalibration,

    #[error("calibration set has {got} features, model expects {expected}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("circuit needs {required} bits, encrypted execution supports at most {max}")]
    BitWidthExceeded { required: u32, max: u32 },

    #[error("invalid compile option {field}: {value}")]
    InvalidConfig { field: &'static str, value: String },

    #[error("calibration run failed: {0}")]
    Calibration(#[from] ExecutionError),

    #[error("lowered circuit disagrees with the quantized forest on calibration row {row}")]
    LoweringMismatch { row: usize },

    #[error(transparent)]
    Quantization(#[from] QuantizationError),
}

// =============================================================================
// CompileConfig
// =============================================================================

/// Compilation and backend options.
///
/// # Example
///
/// ```
/// use quantree::CompileConfig;
///
/// let config = CompileConfig::builder().max_bit_width(10).key_seed(7).build().unwrap();
/// assert_eq!(config.lwe_dimension, 512);
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct CompileConfig {
    /// Widest circuit accepted by encrypted execution. Default: 8.
    #[builder(default = 8)]
    pub max_bit_width: u32,

    /// LWE mask length. Default: 512.
    #[builder(default = 512)]
    pub lwe_dimension: usize,

    /// Noise standard deviation as a fraction of the torus. Default: `2^-40`.
    #[builder(default = 2f64.powi(-40))]
    pub noise_std: f64,

    /// Key generation seed; `None` draws one at random.
    pub key_seed: Option<u64>,

    /// Threads for encrypted evaluation; 0 = auto. Default: 0.
    #[builder(default)]
    pub n_threads: usize,
}

impl<S: compile_config_builder::IsComplete> CompileConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// [`CompileError::InvalidConfig`] for a zero or too large bit width, a
    /// zero LWE dimension, or noise outside `[0, 2^-10]`.
    pub fn build(self) -> Result<CompileConfig, CompileError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl CompileConfig {
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.max_bit_width == 0 || self.max_bit_width > MAX_ENCRYPTED_BIT_WIDTH {
            return Err(CompileError::InvalidConfig {
                field: "max_bit_width",
                value: self.max_bit_width.to_string(),
            });
        }
        if self.lwe_dimension == 0 {
            return Err(CompileError::InvalidConfig {
                field: "lwe_dimension",
                value: "0".into(),
            });
        }
        if !(0.0..=2f64.powi(-10)).contains(&self.noise_std) {
            return Err(CompileError::InvalidConfig {
                field: "noise_std",
                value: self.noise_std.to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// CompiledModel
// =============================================================================

/// A lowered circuit bound to an execution backend.
#[derive(Debug)]
pub struct CompiledModel {
    circuit: ForestCircuit,
    backend: Box<dyn CircuitBackend>,
    stats: CircuitStats,
}

impl CompiledModel {
    pub fn mode(&self) -> ExecutionMode {
        self.backend.mode()
    }

    pub fn stats(&self) -> &CircuitStats {
        &self.stats
    }

    pub fn circuit(&self) -> &ForestCircuit {
        &self.circuit
    }

    /// Per-tree integer outputs, `[n_samples, n_trees, leaf_width]`.
    pub fn run(&self, inputs: ArrayView2<'_, i64>) -> Result<Array3<i64>, ExecutionError> {
        self.backend.run(&self.circuit, inputs)
    }
}

/// Lower `forest` and attach a backend.
///
/// `calibration` holds quantized inputs; the lowered circuit must reproduce
/// the forest on every row of it.
pub fn compile_forest(
    forest: &QuantizedForest,
    input_bits: u8,
    calibration: ArrayView2<'_, i64>,
    config: &CompileConfig,
    use_virtual_lib: bool,
) -> Result<CompiledModel, CompileError> {
    config.validate()?;
    if calibration.nrows() == 0 {
        return Err(CompileError::EmptyCalibration);
    }

    let circuit = ForestCircuit::lower(forest, calibration.ncols(), input_bits);
    let stats = circuit.stats();
    if !use_virtual_lib && stats.bit_width > config.max_bit_width {
        return Err(CompileError::BitWidthExceeded {
            required: stats.bit_width,
            max: config.max_bit_width,
        });
    }

    let lowered = VirtualBackend.run(&circuit, calibration)?;
    let reference = forest.tree_outputs(calibration);
    if let Some(row) = lowered
        .outer_iter()
        .zip(reference.outer_iter())
        .position(|(a, b)| a != b)
    {
        return Err(CompileError::LoweringMismatch { row });
    }

    let backend: Box<dyn CircuitBackend> = if use_virtual_lib {
        Box::new(VirtualBackend)
    } else {
        let seed = config.key_seed.unwrap_or_else(rand::random);
        Box::new(EncryptedBackend::new(
            &circuit,
            config.lwe_dimension,
            config.noise_std,
            seed,
            config.n_threads,
        ))
    };

    tracing::info!(
        mode = %backend.mode(),
        n_trees = stats.n_trees,
        n_internal_nodes = stats.n_internal_nodes,
        n_leaves = stats.n_leaves,
        bit_width = stats.bit_width,
        "circuit compiled"
    );

    Ok(CompiledModel { circuit, backend, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::Forest;
    use ndarray::{Array2, array};

    fn quantized(n_bits: u8) -> QuantizedForest {
        let mut forest = Forest::new(1);
        forest.push_tree(
            crate::class_tree! {
                0 => split(0, 1.5) -> 1, 2,
                1 => leaf[1.0, 0.0],
                2 => leaf[0.2, 0.8],
            },
            0,
        );
        QuantizedForest::quantize(&forest, n_bits).unwrap()
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = CompileConfig::default();
        assert_eq!(config.max_bit_width, 8);
        assert_eq!(config.lwe_dimension, 512);
        assert_eq!(config.key_seed, None);
        assert!(matches!(
            CompileConfig::builder().max_bit_width(13).build(),
            Err(CompileError::InvalidConfig { field: "max_bit_width", .. })
        ));
        assert!(CompileConfig::builder().noise_std(0.5).build().is_err());
    }

    #[test]
    fn virtual_and_encrypted_compile() {
        let forest = quantized(4);
        let calibration = array![[0, 3], [2, 9], [15, 0]];
        let config = CompileConfig::builder().key_seed(1).lwe_dimension(64).build().unwrap();

        let virtual_model = compile_forest(&forest, 4, calibration.view(), &config, true).unwrap();
        assert_eq!(virtual_model.mode(), ExecutionMode::Virtual);
        let encrypted = compile_forest(&forest, 4, calibration.view(), &config, false).unwrap();
        assert_eq!(encrypted.mode(), ExecutionMode::Encrypted);
        assert_eq!(
            encrypted.run(calibration.view()).unwrap(),
            virtual_model.run(calibration.view()).unwrap()
        );
    }

    #[test]
    fn width_bound_applies_to_encrypted_only() {
        let forest = quantized(10);
        let calibration = array![[0, 0]];
        let config = CompileConfig::default();
        assert_eq!(
            compile_forest(&forest, 10, calibration.view(), &config, false).unwrap_err(),
            CompileError::BitWidthExceeded { required: 10, max: 8 }
        );
        assert!(compile_forest(&forest, 10, calibration.view(), &config, true).is_ok());
    }

    #[test]
    fn empty_calibration() {
        let forest = quantized(4);
        let calibration = Array2::<i64>::zeros((0, 2));
        assert_eq!(
            compile_forest(&forest, 4, calibration.view(), &CompileConfig::default(), true).unwrap_err(),
            CompileError::EmptyCalibration
        );
    }
}
