//! Reference LWE scheme over `Z/2^64`.
//!
//! Messages of `precision` bits sit just under one padding bit:
//! `plaintext = m * 2^(63 - precision)`. A ciphertext is
//! `(mask, <mask, s> + plaintext + e)` for a binary secret `s` and Gaussian
//! noise `e`; additions and integer scalings act on the message directly.
//!
//! Table lookups go through [`SecretKey::bootstrap`], which decrypts, applies
//! the table and encrypts the result with fresh noise. It is a key-holding
//! stand-in for programmable bootstrapping and offers no security.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// `2^64` as a float, for scaling torus noise.
const TORUS_SCALE: f64 = 18_446_744_073_709_551_616.0;

/// Scheme parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LweParams {
    pub dimension: usize,
    /// Noise standard deviation as a fraction of the torus.
    pub noise_std: f64,
    /// Message bits.
    pub precision: u32,
}

impl LweParams {
    #[inline]
    fn shift(&self) -> u32 {
        63 - self.precision
    }

    #[inline]
    pub fn delta(&self) -> u64 {
        1u64 << self.shift()
    }

    #[inline]
    pub fn message_modulus(&self) -> u64 {
        1u64 << self.precision
    }

    /// Encode a (possibly negative) message; it is reduced modulo the
    /// message modulus.
    #[inline]
    pub fn encode(&self, message: i64) -> u64 {
        (message as u64).wrapping_mul(self.delta())
    }

    /// Round a noisy plaintext to the nearest message in
    /// `0..message_modulus`.
    #[inline]
    pub fn decode(&self, plaintext: u64) -> u64 {
        (plaintext.wrapping_add(self.delta() >> 1) >> self.shift()) & (self.message_modulus() - 1)
    }

    /// Interpret a decoded message as two's complement.
    #[inline]
    pub fn to_signed(&self, message: u64) -> i64 {
        let half = self.message_modulus() >> 1;
        if message >= half {
            message as i64 - self.message_modulus() as i64
        } else {
            message as i64
        }
    }

    fn sample_noise<R: Rng>(&self, rng: &mut R) -> u64 {
        let z: f64 = StandardNormal.sample(rng);
        ((z * self.noise_std * TORUS_SCALE).round() as i64) as u64
    }
}

/// An LWE ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    mask: Vec<u64>,
    body: u64,
}

impl Ciphertext {
    /// Noiseless encryption of a known plaintext, usable as an accumulator.
    pub fn trivial(dimension: usize, plaintext: u64) -> Self {
        Self {
            mask: vec![0; dimension],
            body: plaintext,
        }
    }

    pub fn dimension(&self) -> usize {
        self.mask.len()
    }

    pub fn add_assign(&mut self, other: &Ciphertext) {
        for (a, &b) in self.mask.iter_mut().zip(&other.mask) {
            *a = a.wrapping_add(b);
        }
        self.body = self.body.wrapping_add(other.body);
    }

    pub fn sub_assign(&mut self, other: &Ciphertext) {
        for (a, &b) in self.mask.iter_mut().zip(&other.mask) {
            *a = a.wrapping_sub(b);
        }
        self.body = self.body.wrapping_sub(other.body);
    }

    /// `self += scalar * other`.
    pub fn add_scaled(&mut self, other: &Ciphertext, scalar: i64) {
        let s = scalar as u64;
        for (a, &b) in self.mask.iter_mut().zip(&other.mask) {
            *a = a.wrapping_add(b.wrapping_mul(s));
        }
        self.body = self.body.wrapping_add(other.body.wrapping_mul(s));
    }

    pub fn scalar_mul(&self, scalar: i64) -> Ciphertext {
        let s = scalar as u64;
        Ciphertext {
            mask: self.mask.iter().map(|&a| a.wrapping_mul(s)).collect(),
            body: self.body.wrapping_mul(s),
        }
    }
}

/// A univariate function over `0..message_modulus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    table: Vec<i64>,
}

impl LookupTable {
    /// Tabulate `f` on every message of `params.precision` bits.
    pub fn from_fn(params: &LweParams, f: impl Fn(u64) -> i64) -> Self {
        Self {
            table: (0..params.message_modulus()).map(f).collect(),
        }
    }

    #[inline]
    pub fn get(&self, message: u64) -> i64 {
        self.table[message as usize]
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Binary secret key.
#[derive(Debug, Clone)]
pub struct SecretKey {
    params: LweParams,
    bits: Vec<u64>,
}

impl SecretKey {
    pub fn generate<R: Rng>(params: LweParams, rng: &mut R) -> Self {
        let bits = (0..params.dimension).map(|_| u64::from(rng.gen_bool(0.5))).collect();
        Self { params, bits }
    }

    pub fn params(&self) -> &LweParams {
        &self.params
    }

    pub fn encrypt<R: Rng>(&self, message: i64, rng: &mut R) -> Ciphertext {
        let mask: Vec<u64> = (0..self.params.dimension).map(|_| rng.r#gen()).collect();
        let body = self
            .dot(&mask)
            .wrapping_add(self.params.encode(message))
            .wrapping_add(self.params.sample_noise(rng));
        Ciphertext { mask, body }
    }

    /// Decrypt to a message in `0..message_modulus`.
    pub fn decrypt(&self, ct: &Ciphertext) -> u64 {
        self.params.decode(self.phase(ct))
    }

    pub fn decrypt_signed(&self, ct: &Ciphertext) -> i64 {
        self.params.to_signed(self.decrypt(ct))
    }

    /// Apply `lut` to the encrypted message and re-encrypt with fresh noise.
    pub fn bootstrap<R: Rng>(&self, ct: &Ciphertext, lut: &LookupTable, rng: &mut R) -> Ciphertext {
        let message = self.decrypt(ct);
        self.encrypt(lut.get(message), rng)
    }

    /// Noisy plaintext `body - <mask, s>`.
    fn phase(&self, ct: &Ciphertext) -> u64 {
        ct.body.wrapping_sub(self.dot(&ct.mask))
    }

    fn dot(&self, mask: &[u64]) -> u64 {
        mask.iter()
            .zip(&self.bits)
            .fold(0u64, |acc, (&a, &s)| acc.wrapping_add(a.wrapping_mul(s)))
    }
}
