//! Classification objectives for gradient boosting.
//!
//! Predictions and gradients use the **output-major** layout
//! `[output0_row0, output0_row1, ..., output1_row0, ...]`: with `n_rows` rows,
//! `predictions[k * n_rows + i]` is output `k` of row `i`.
//!
//! - [`LogisticLoss`]: binary classification, one output (log-odds).
//! - [`SoftmaxLoss`]: multiclass, one output per class.

/// Gradient and hessian of one sample for one output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradsTuple {
    pub grad: f64,
    pub hess: f64,
}

/// Hessians are floored to keep Newton steps finite.
const HESS_MIN: f64 = 1e-16;

/// Probabilities are clipped before taking logs.
const PROB_EPS: f64 = 1e-15;

/// A differentiable loss over class-index targets.
pub trait ObjectiveFn: Send + Sync {
    /// Number of raw outputs for `n_classes` classes.
    fn n_outputs(&self, n_classes: usize) -> usize;

    /// Fill `grads` (output-major, `n_outputs * n_rows`) from the current
    /// raw `predictions`.
    fn compute_gradients(&self, n_rows: usize, predictions: &[f64], targets: &[usize], grads: &mut [GradsTuple]);

    /// Mean negative log-likelihood of `targets` under `predictions`.
    fn loss(&self, n_rows: usize, predictions: &[f64], targets: &[usize]) -> f64;

    fn name(&self) -> &'static str;
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax of one row of logits, in place.
pub fn softmax_inplace(row: &mut [f64]) {
    if row.is_empty() {
        return;
    }
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}

// =============================================================================
// Logistic Loss
// =============================================================================

/// Binary log loss on log-odds.
///
/// - Gradient: `sigmoid(pred) - y`
/// - Hessian: `sigmoid(pred) * (1 - sigmoid(pred))`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticLoss;

impl ObjectiveFn for LogisticLoss {
    fn n_outputs(&self, _n_classes: usize) -> usize {
        1
    }

    fn compute_gradients(&self, n_rows: usize, predictions: &[f64], targets: &[usize], grads: &mut [GradsTuple]) {
        debug_assert_eq!(predictions.len(), n_rows);
        debug_assert_eq!(grads.len(), n_rows);
        for ((pair, &pred), &target) in grads.iter_mut().zip(predictions).zip(targets) {
            let p = sigmoid(pred);
            pair.grad = p - target as f64;
            pair.hess = (p * (1.0 - p)).max(HESS_MIN);
        }
    }

    fn loss(&self, n_rows: usize, predictions: &[f64], targets: &[usize]) -> f64 {
        if n_rows == 0 {
            return 0.0;
        }
        let total: f64 = predictions
            .iter()
            .zip(targets)
            .map(|(&pred, &target)| {
                let p = sigmoid(pred).clamp(PROB_EPS, 1.0 - PROB_EPS);
                if target == 1 { -p.ln() } else { -(1.0 - p).ln() }
            })
            .sum();
        total / n_rows as f64
    }

    fn name(&self) -> &'static str {
        "logistic"
    }
}

// =============================================================================
// Softmax Loss
// =============================================================================

/// Multiclass cross-entropy over `n_classes` logits.
///
/// - Gradient: `p_k - [y == k]`
/// - Hessian: `2 * p_k * (1 - p_k)`
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxLoss {
    n_classes: usize,
}

impl SoftmaxLoss {
    pub fn new(n_classes: usize) -> Self {
        Self { n_classes }
    }

    fn row_probs(&self, n_rows: usize, predictions: &[f64], row: usize, scratch: &mut [f64]) {
        for (k, slot) in scratch.iter_mut().enumerate() {
            *slot = predictions[k * n_rows + row];
        }
        softmax_inplace(scratch);
    }
}

impl ObjectiveFn for SoftmaxLoss {
    fn n_outputs(&self, n_classes: usize) -> usize {
        n_classes
    }

    fn compute_gradients(&self, n_rows: usize, predictions: &[f64], targets: &[usize], grads: &mut [GradsTuple]) {
        let k = self.n_classes;
        debug_assert_eq!(predictions.len(), k * n_rows);
        debug_assert_eq!(grads.len(), k * n_rows);
        let mut probs = vec![0.0; k];
        for (row, &target) in targets.iter().enumerate().take(n_rows) {
            self.row_probs(n_rows, predictions, row, &mut probs);
            for (class, &p) in probs.iter().enumerate() {
                let y = if class == target { 1.0 } else { 0.0 };
                grads[class * n_rows + row] = GradsTuple {
                    grad: p - y,
                    hess: (2.0 * p * (1.0 - p)).max(HESS_MIN),
                };
            }
        }
    }

    fn loss(&self, n_rows: usize, predictions: &[f64], targets: &[usize]) -> f64 {
        if n_rows == 0 {
            return 0.0;
        }
        let mut probs = vec![0.0; self.n_classes];
        let mut total = 0.0;
        for (row, &target) in targets.iter().enumerate().take(n_rows) {
            self.row_probs(n_rows, predictions, row, &mut probs);
            total -= probs[target].clamp(PROB_EPS, 1.0).ln();
        }
        total / n_rows as f64
    }

    fn name(&self) -> &'static str {
        "softmax"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sigmoid_and_softmax() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        let mut row = [1.0, 1.0, 1.0, 1.0];
        softmax_inplace(&mut row);
        for p in row {
            assert_relative_eq!(p, 0.25);
        }
        let mut row = [1000.0, 0.0];
        softmax_inplace(&mut row);
        assert_relative_eq!(row[0], 1.0);
    }

    #[test]
    fn logistic_gradients_at_zero() {
        let preds = [0.0, 0.0];
        let targets = [0, 1];
        let mut grads = [GradsTuple::default(); 2];
        LogisticLoss.compute_gradients(2, &preds, &targets, &mut grads);
        assert_relative_eq!(grads[0].grad, 0.5);
        assert_relative_eq!(grads[1].grad, -0.5);
        assert_relative_eq!(grads[0].hess, 0.25);
        assert_relative_eq!(LogisticLoss.loss(2, &preds, &targets), std::f64::consts::LN_2);
    }

    #[test]
    fn softmax_gradients_layout() {
        let loss = SoftmaxLoss::new(3);
        let n_rows = 2;
        let preds = [0.0; 6];
        let targets = [2, 0];
        let mut grads = [GradsTuple::default(); 6];
        loss.compute_gradients(n_rows, &preds, &targets, &mut grads);
        let third = 1.0 / 3.0;
        // output 2, row 0 is the true class
        assert_relative_eq!(grads[2 * n_rows].grad, third - 1.0);
        assert_relative_eq!(grads[0].grad, third);
        // output 0, row 1 is the true class
        assert_relative_eq!(grads[1].grad, third - 1.0);
        assert_relative_eq!(grads[1].hess, 2.0 * third * (1.0 - third));
        assert_relative_eq!(loss.loss(n_rows, &preds, &targets), 3.0f64.ln());
    }

    #[test]
    fn gradients_sum_to_zero_per_row() {
        let loss = SoftmaxLoss::new(4);
        let preds = [0.3, -1.0, 2.0, 0.5, 0.1, 0.0, -0.4, 1.2];
        let targets = [1, 3];
        let mut grads = [GradsTuple::default(); 8];
        loss.compute_gradients(2, &preds, &targets, &mut grads);
        for row in 0..2 {
            let s: f64 = (0..4).map(|k| grads[k * 2 + row].grad).sum();
            assert_relative_eq!(s, 0.0, epsilon = 1e-12);
        }
    }
}
