//! Circuit execution backends.

use std::fmt;

use ndarray::{Array3, ArrayView2};

use super::circuit::ForestCircuit;

/// How a compiled circuit is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Integer evaluation in the clear.
    Virtual,
    /// Evaluation over LWE ciphertexts.
    Encrypted,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Virtual => write!(f, "virtual"),
            ExecutionMode::Encrypted => write!(f, "encrypted"),
        }
    }
}

/// Errors raised while running a circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("circuit expects {expected} input features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("input value {value} at row {row} does not fit in {bits} unsigned bits")]
    InputOutOfRange { row: usize, value: i64, bits: u32 },
}

/// Runs a [`ForestCircuit`] on quantized inputs.
///
/// Output shape is `[n_samples, n_trees, leaf_width]`, the integer leaf
/// vector each tree selects for each sample.
pub trait CircuitBackend: Send + Sync + fmt::Debug {
    fn mode(&self) -> ExecutionMode;

    fn run(&self, circuit: &ForestCircuit, inputs: ArrayView2<'_, i64>) -> Result<Array3<i64>, ExecutionError>;
}

/// Check input shape and range against the circuit.
pub(crate) fn check_inputs(circuit: &ForestCircuit, inputs: ArrayView2<'_, i64>) -> Result<(), ExecutionError> {
    if inputs.ncols() != circuit.n_features() {
        return Err(ExecutionError::FeatureMismatch {
            expected: circuit.n_features(),
            got: inputs.ncols(),
        });
    }
    let max = (1i64 << circuit.input_bits()) - 1;
    for (row, sample) in inputs.rows().into_iter().enumerate() {
        if let Some(&value) = sample.iter().find(|&&v| v < 0 || v > max) {
            return Err(ExecutionError::InputOutOfRange {
                row,
                value,
                bits: circuit.input_bits(),
            });
        }
    }
    Ok(())
}

/// Clear integer evaluation of the lowered matrices.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualBackend;

impl CircuitBackend for VirtualBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Virtual
    }

    fn run(&self, circuit: &ForestCircuit, inputs: ArrayView2<'_, i64>) -> Result<Array3<i64>, ExecutionError> {
        check_inputs(circuit, inputs)?;
        Ok(circuit.evaluate(inputs))
    }
}
