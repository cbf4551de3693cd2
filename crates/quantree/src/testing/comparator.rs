use ndarray::{Array1, ArrayView2};

use crate::model::{Execution, PredictError};

/// Attempts made before a disagreement is reported.
pub const MAX_EXECUTION_RUNS: usize = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComparisonError {
    #[error("FHE and clear predictions differ on {n_mismatched}/{n_samples} samples after {runs} runs")]
    Mismatch {
        runs: usize,
        n_mismatched: usize,
        n_samples: usize,
    },

    #[error(transparent)]
    Predict(#[from] PredictError),
}

/// Check that FHE execution reproduces clear execution on `x`.
///
/// `predict` is called once in the clear and then up to
/// [`MAX_EXECUTION_RUNS`] times under FHE; the check passes as soon as one
/// FHE run matches the clear predictions exactly.
pub fn check_is_good_execution_for_quantized_models<F>(x: ArrayView2<'_, f64>, predict: F) -> Result<(), ComparisonError>
where
    F: Fn(ArrayView2<'_, f64>, Execution) -> Result<Array1<i64>, PredictError>,
{
    let clear = predict(x, Execution::Clear)?;
    let mut n_mismatched = 0;
    for run in 1..=MAX_EXECUTION_RUNS {
        let fhe = predict(x, Execution::Fhe)?;
        n_mismatched = clear.iter().zip(&fhe).filter(|(c, f)| c != f).count() + clear.len().abs_diff(fhe.len());
        if n_mismatched == 0 {
            tracing::debug!(run, n_samples = clear.len(), "FHE execution matches clear");
            return Ok(());
        }
        tracing::warn!(run, n_mismatched, n_samples = clear.len(), "FHE execution differs from clear");
    }
    Err(ComparisonError::Mismatch {
        runs: MAX_EXECUTION_RUNS,
        n_mismatched,
        n_samples: clear.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};
    use std::cell::Cell;

    #[test]
    fn passes_on_later_run() {
        let x = Array2::<f64>::zeros((3, 1));
        let calls = Cell::new(0);
        let result = check_is_good_execution_for_quantized_models(x.view(), |_, execution| match execution {
            Execution::Clear => Ok(array![1, 2, 3]),
            Execution::Fhe => {
                calls.set(calls.get() + 1);
                if calls.get() < 3 { Ok(array![1, 0, 3]) } else { Ok(array![1, 2, 3]) }
            }
        });
        assert_eq!(result, Ok(()));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn reports_persistent_mismatch() {
        let x = Array2::<f64>::zeros((2, 1));
        let result = check_is_good_execution_for_quantized_models(x.view(), |_, execution| match execution {
            Execution::Clear => Ok(array![0, 0]),
            Execution::Fhe => Ok(array![0, 1]),
        });
        assert_eq!(
            result,
            Err(ComparisonError::Mismatch {
                runs: MAX_EXECUTION_RUNS,
                n_mismatched: 1,
                n_samples: 2
            })
        );
    }

    #[test]
    fn propagates_predict_errors() {
        let x = Array2::<f64>::zeros((1, 1));
        let result = check_is_good_execution_for_quantized_models(x.view(), |_, execution| match execution {
            Execution::Clear => Ok(array![0]),
            Execution::Fhe => Err(PredictError::NotCompiled),
        });
        assert_eq!(result, Err(ComparisonError::Predict(PredictError::NotCompiled)));
    }
}
