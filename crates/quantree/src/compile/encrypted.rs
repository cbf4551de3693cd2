//! LWE execution of forest circuits.
//!
//! Per sample, every feature is encrypted once. Per tree:
//!
//! 1. each internal node bootstraps its feature ciphertext through a
//!    `x <= B[i]` table, giving an encrypted bit;
//! 2. path sums `bits @ C` are built from ciphertext additions;
//! 3. each path sum is bootstrapped through a `signed(x) == D[j]` table;
//! 4. outputs `select @ E` are scaled sums of the selection ciphertexts.
//!
//! Only the final outputs are decrypted.

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::backend::{CircuitBackend, ExecutionError, ExecutionMode, check_inputs};
use super::circuit::{ForestCircuit, TreeCircuit};
use super::lwe::{Ciphertext, LookupTable, LweParams, SecretKey};
use crate::utils::run_with_threads;

/// Keys and tables for one compiled circuit.
#[derive(Debug)]
pub struct EncryptedBackend {
    key: SecretKey,
    /// Comparison tables, `[tree][internal node]`.
    compare_luts: Vec<Vec<LookupTable>>,
    /// Equality tables, `[tree][leaf]`.
    select_luts: Vec<Vec<LookupTable>>,
    seed: u64,
    runs: AtomicU64,
    n_threads: usize,
}

impl EncryptedBackend {
    /// Generate a key and the lookup tables of `circuit`.
    ///
    /// Messages carry one bit more than the circuit width so that signed
    /// path sums and unsigned values share one message space.
    pub fn new(circuit: &ForestCircuit, lwe_dimension: usize, noise_std: f64, seed: u64, n_threads: usize) -> Self {
        let params = LweParams {
            dimension: lwe_dimension,
            noise_std,
            precision: circuit.bit_width() + 1,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let key = SecretKey::generate(params, &mut rng);

        let compare_luts = circuit
            .trees()
            .iter()
            .map(|tree| {
                tree.b
                    .iter()
                    .map(|&t| LookupTable::from_fn(&params, |m| i64::from(m as i64 <= t)))
                    .collect()
            })
            .collect();
        let select_luts = circuit
            .trees()
            .iter()
            .map(|tree| {
                tree.d
                    .iter()
                    .map(|&d| LookupTable::from_fn(&params, |m| i64::from(params.to_signed(m) == d)))
                    .collect()
            })
            .collect();

        tracing::debug!(
            lwe_dimension,
            precision = params.precision,
            n_trees = circuit.n_trees(),
            "encryption keys generated"
        );

        Self {
            key,
            compare_luts,
            select_luts,
            seed,
            runs: AtomicU64::new(0),
            n_threads,
        }
    }

    pub fn params(&self) -> &LweParams {
        self.key.params()
    }

    fn run_tree(
        &self,
        tree: &TreeCircuit,
        compare: &[LookupTable],
        select: &[LookupTable],
        inputs: &[Ciphertext],
        rng: &mut StdRng,
    ) -> Vec<i64> {
        let dimension = self.params().dimension;
        let bits: Vec<Ciphertext> = tree
            .a
            .iter()
            .zip(compare)
            .map(|(&feature, lut)| self.key.bootstrap(&inputs[feature as usize], lut, rng))
            .collect();

        let selections: Vec<Ciphertext> = tree
            .c
            .axis_iter(Axis(1))
            .zip(select)
            .map(|(column, lut)| {
                let mut sum = Ciphertext::trivial(dimension, 0);
                for (bit, &coef) in bits.iter().zip(column.iter()) {
                    match coef {
                        1 => sum.add_assign(bit),
                        -1 => sum.sub_assign(bit),
                        _ => {}
                    }
                }
                self.key.bootstrap(&sum, lut, rng)
            })
            .collect();

        tree.e
            .axis_iter(Axis(1))
            .map(|values| {
                let mut out = Ciphertext::trivial(dimension, 0);
                for (sel, &v) in selections.iter().zip(values.iter()) {
                    if v != 0 {
                        out.add_scaled(sel, v);
                    }
                }
                self.key.decrypt(&out) as i64
            })
            .collect()
    }

    fn run_sample(&self, circuit: &ForestCircuit, sample: ArrayView1<'_, i64>, rng: &mut StdRng) -> Array2<i64> {
        let inputs: Vec<Ciphertext> = sample.iter().map(|&q| self.key.encrypt(q, rng)).collect();
        let mut out = Array2::zeros((circuit.n_trees(), circuit.leaf_width()));
        for (t, tree) in circuit.trees().iter().enumerate() {
            let values = self.run_tree(tree, &self.compare_luts[t], &self.select_luts[t], &inputs, rng);
            for (k, v) in values.into_iter().enumerate() {
                out[[t, k]] = v;
            }
        }
        out
    }
}

/// Seed of the RNG stream for one sample of one run.
fn sample_seed(seed: u64, run: u64, sample: usize) -> u64 {
    seed ^ run.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (sample as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

impl CircuitBackend for EncryptedBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Encrypted
    }

    fn run(&self, circuit: &ForestCircuit, inputs: ArrayView2<'_, i64>) -> Result<Array3<i64>, ExecutionError> {
        check_inputs(circuit, inputs)?;
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(run, n_samples = inputs.nrows(), "encrypted evaluation");

        let per_sample = run_with_threads(self.n_threads, |parallelism| {
            parallelism.maybe_par_map(inputs.nrows(), |i| {
                let mut rng = StdRng::seed_from_u64(sample_seed(self.seed, run, i));
                self.run_sample(circuit, inputs.row(i), &mut rng)
            })
        });

        let mut out = Array3::zeros((inputs.nrows(), circuit.n_trees(), circuit.leaf_width()));
        for (mut dst, src) in out.axis_iter_mut(Axis(0)).zip(per_sample) {
            dst.assign(&src);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::VirtualBackend;
    use crate::repr::{Forest, QuantizedForest};
    use ndarray::Array2;
    use rand::Rng;

    fn circuit() -> ForestCircuit {
        let mut forest = Forest::new(1);
        forest.push_tree(
            crate::class_tree! {
                0 => split(0, 7.5) -> 1, 2,
                1 => split(1, 3.5) -> 3, 4,
                2 => split(1, 12.5) -> 5, 6,
                3 => leaf[0.9, 0.1],
                4 => leaf[0.3, 0.7],
                5 => leaf[0.5, 0.5],
                6 => leaf[0.0, 1.0],
            },
            0,
        );
        forest.push_tree(crate::class_tree! { 0 => leaf[0.6, 0.4] }, 0);
        ForestCircuit::lower(&QuantizedForest::quantize(&forest, 4).unwrap(), 2, 4)
    }

    #[test]
    fn matches_virtual_backend() {
        let c = circuit();
        let backend = EncryptedBackend::new(&c, 128, 2f64.powi(-40), 7, 1);
        assert_eq!(backend.mode(), ExecutionMode::Encrypted);
        assert_eq!(backend.params().precision, c.bit_width() + 1);

        let mut rng = StdRng::seed_from_u64(1);
        let inputs = Array2::from_shape_fn((12, 2), |_| rng.gen_range(0..16));
        let expected = VirtualBackend.run(&c, inputs.view()).unwrap();
        assert_eq!(backend.run(&c, inputs.view()).unwrap(), expected);
    }

    #[test]
    fn repeated_runs_agree() {
        let c = circuit();
        let backend = EncryptedBackend::new(&c, 64, 2f64.powi(-40), 3, 2);
        let inputs = ndarray::array![[0, 0], [15, 15], [8, 3]];
        let first = backend.run(&c, inputs.view()).unwrap();
        let second = backend.run(&c, inputs.view()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sample_streams_differ() {
        assert_ne!(sample_seed(1, 1, 0), sample_seed(1, 1, 1));
        assert_ne!(sample_seed(1, 1, 0), sample_seed(1, 2, 0));
    }
}
