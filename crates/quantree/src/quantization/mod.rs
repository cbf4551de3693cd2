//! Uniform unsigned quantization.
//!
//! A [`UniformQuantizer`] maps a real range `[min, max]` onto the integers
//! `0..=2^n_bits - 1` through an affine map `q = round(x / scale + zero_point)`.
//! Inputs are quantized per feature ([`FeatureQuantizers`]); tree outputs share
//! a single quantizer over every leaf value of the ensemble.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Largest supported bit width.
pub const MAX_N_BITS: u8 = 26;

/// Ranges narrower than this are treated as a single value.
const STABILITY_CONST: f64 = 1e-6;

/// Errors raised while calibrating or applying quantizers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuantizationError {
    #[error("n_bits must be in 1..={MAX_N_BITS}, got {0}")]
    InvalidBitWidth(u8),

    #[error("cannot calibrate a quantizer on no values")]
    EmptyCalibration,

    #[error("calibration values must be finite")]
    NonFinite,

    #[error("expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },
}

// =============================================================================
// UniformQuantizer
// =============================================================================

/// Affine unsigned quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformQuantizer {
    n_bits: u8,
    scale: f64,
    zero_point: i64,
}

impl UniformQuantizer {
    /// Calibrate on the observed range of `values`.
    pub fn fit(n_bits: u8, values: impl IntoIterator<Item = f64>) -> Result<Self, QuantizationError> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut seen = false;
        for v in values {
            if !v.is_finite() {
                return Err(QuantizationError::NonFinite);
            }
            min = min.min(v);
            max = max.max(v);
            seen = true;
        }
        if !seen {
            return Err(QuantizationError::EmptyCalibration);
        }
        Self::from_range(n_bits, min, max)
    }

    /// Quantizer covering `[min, max]`.
    pub fn from_range(n_bits: u8, min: f64, max: f64) -> Result<Self, QuantizationError> {
        if n_bits == 0 || n_bits > MAX_N_BITS {
            return Err(QuantizationError::InvalidBitWidth(n_bits));
        }
        if !min.is_finite() || !max.is_finite() {
            return Err(QuantizationError::NonFinite);
        }
        let levels = ((1u64 << n_bits) - 1) as f64;

        let (scale, zero_point) = if (max - min).abs() < STABILITY_CONST {
            // Constant input: keep the value representable without a zero point.
            if max.abs() < STABILITY_CONST {
                (1.0, 0)
            } else {
                (max / levels, 0)
            }
        } else {
            let scale = (max - min) / levels;
            let zero_point = (-min * levels / (max - min)).round_ties_even() as i64;
            (scale, zero_point)
        };

        Ok(Self {
            n_bits,
            scale,
            zero_point,
        })
    }

    #[inline]
    pub fn n_bits(&self) -> u8 {
        self.n_bits
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn zero_point(&self) -> i64 {
        self.zero_point
    }

    /// Largest quantized value, `2^n_bits - 1`.
    #[inline]
    pub fn q_max(&self) -> i64 {
        (1i64 << self.n_bits) - 1
    }

    /// Quantize one value, clamping into `0..=q_max`.
    #[inline]
    pub fn quantize(&self, x: f64) -> i64 {
        let q = (x / self.scale + self.zero_point as f64).round_ties_even();
        // NaN falls through both comparisons and maps to 0.
        if q >= self.q_max() as f64 {
            self.q_max()
        } else if q > 0.0 {
            q as i64
        } else {
            0
        }
    }

    #[inline]
    pub fn dequantize(&self, q: i64) -> f64 {
        self.scale * (q - self.zero_point) as f64
    }
}

// =============================================================================
// FeatureQuantizers
// =============================================================================

/// One quantizer per input column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQuantizers {
    quantizers: Vec<UniformQuantizer>,
}

impl FeatureQuantizers {
    /// Calibrate each column of `features` (`[n_samples, n_features]`).
    pub fn fit(n_bits: u8, features: ArrayView2<'_, f64>) -> Result<Self, QuantizationError> {
        let quantizers = features
            .axis_iter(Axis(1))
            .map(|column| UniformQuantizer::fit(n_bits, column.iter().copied()))
            .collect::<Result<Vec<_>, _>>()?;
        if quantizers.is_empty() {
            return Err(QuantizationError::EmptyCalibration);
        }
        Ok(Self { quantizers })
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.quantizers.len()
    }

    #[inline]
    pub fn n_bits(&self) -> u8 {
        self.quantizers.first().map_or(0, UniformQuantizer::n_bits)
    }

    #[inline]
    pub fn get(&self, feature: usize) -> Option<&UniformQuantizer> {
        self.quantizers.get(feature)
    }

    /// Quantize a `[n_samples, n_features]` matrix column by column.
    pub fn quantize(&self, features: ArrayView2<'_, f64>) -> Result<Array2<i64>, QuantizationError> {
        if features.ncols() != self.n_features() {
            return Err(QuantizationError::FeatureMismatch {
                expected: self.n_features(),
                got: features.ncols(),
            });
        }
        let mut out = Array2::<i64>::zeros(features.raw_dim());
        for (j, q) in self.quantizers.iter().enumerate() {
            out.column_mut(j)
                .zip_mut_with(&features.column(j), |dst, &x| *dst = q.quantize(x));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn range_maps_to_full_scale() {
        let q = UniformQuantizer::from_range(3, -1.0, 6.0).unwrap();
        assert_abs_diff_eq!(q.scale(), 1.0);
        assert_eq!(q.zero_point(), 1);
        assert_eq!(q.quantize(-1.0), 0);
        assert_eq!(q.quantize(6.0), 7);
        assert_eq!(q.quantize(2.0), 3);
    }

    #[test]
    fn clamps_outside_range() {
        let q = UniformQuantizer::from_range(4, 0.0, 15.0).unwrap();
        assert_eq!(q.quantize(-100.0), 0);
        assert_eq!(q.quantize(100.0), 15);
        assert_eq!(q.quantize(f64::NAN), 0);
    }

    #[test]
    fn constant_values() {
        let zero = UniformQuantizer::fit(6, [0.0, 0.0]).unwrap();
        assert_eq!(zero.scale(), 1.0);
        assert_eq!(zero.zero_point(), 0);

        let q = UniformQuantizer::fit(6, [3.0, 3.0, 3.0]).unwrap();
        assert_abs_diff_eq!(q.scale(), 3.0 / 63.0);
        assert_eq!(q.quantize(3.0), 63);
        assert_abs_diff_eq!(q.dequantize(63), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(UniformQuantizer::from_range(0, 0.0, 1.0), Err(QuantizationError::InvalidBitWidth(0)));
        assert_eq!(UniformQuantizer::from_range(27, 0.0, 1.0), Err(QuantizationError::InvalidBitWidth(27)));
        assert_eq!(UniformQuantizer::fit(4, []), Err(QuantizationError::EmptyCalibration));
        assert_eq!(UniformQuantizer::fit(4, [1.0, f64::INFINITY]), Err(QuantizationError::NonFinite));
    }

    #[test]
    fn ties_round_to_even() {
        let q = UniformQuantizer::from_range(2, 0.0, 3.0).unwrap();
        assert_eq!(q.quantize(0.5), 0);
        assert_eq!(q.quantize(1.5), 2);
        assert_eq!(q.quantize(2.5), 2);
    }

    #[test]
    fn feature_quantizers_are_per_column() {
        let x = array![[0.0, 10.0], [1.0, 40.0], [0.4, 20.0]];
        let fq = FeatureQuantizers::fit(2, x.view()).unwrap();
        assert_eq!(fq.n_features(), 2);
        assert_eq!(fq.get(1).unwrap().zero_point(), -1);
        let q = fq.quantize(x.view()).unwrap();
        assert_eq!(q, array![[0, 0], [3, 3], [1, 1]]);
    }

    #[test]
    fn feature_quantizers_check_width() {
        let fq = FeatureQuantizers::fit(2, array![[0.0, 1.0]].view()).unwrap();
        let err = fq.quantize(array![[0.0]].view()).unwrap_err();
        assert_eq!(err, QuantizationError::FeatureMismatch { expected: 2, got: 1 });
    }

    proptest! {
        #[test]
        fn roundtrip_error_is_half_step(
            min in -1e3f64..1e3,
            width in 1e-3f64..1e3,
            t in 0.0f64..=1.0,
            n_bits in 1u8..=MAX_N_BITS,
        ) {
            let max = min + width;
            let q = UniformQuantizer::from_range(n_bits, min, max).unwrap();
            let x = min + t * width;
            let code = q.quantize(x);
            prop_assert!((0..=q.q_max()).contains(&code));
            // Inside the range x / scale + zero_point stays within half a step
            // of 0..=q_max, so rounding then clamping moves it at most 0.5.
            let slack = 1e-9 * (min.abs() + width).max(1.0);
            prop_assert!((q.dequantize(code) - x).abs() <= q.scale() / 2.0 + slack);
        }

        #[test]
        fn quantize_is_monotonic(a in -50.0f64..50.0, b in -50.0f64..50.0, n_bits in 1u8..=12) {
            let q = UniformQuantizer::from_range(n_bits, -40.0, 40.0).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(q.quantize(lo) <= q.quantize(hi));
        }
    }
}
