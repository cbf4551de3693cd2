//! Common utilities used across the crate.
//!
//! Parallelism configuration, thread-pool scoping and a couple of small
//! numeric helpers shared by training and inference.

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Passed through training and backend components. When `Parallel`,
/// components may use `rayon` parallel iterators; when `Sequential` they
/// must iterate in order on the calling thread.
///
/// The thread pool itself is set up at the model API level via `n_threads`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map `f` over `0..n`, collecting results in index order.
    pub fn maybe_par_map<T, F>(self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        if self.is_parallel() {
            (0..n).into_par_iter().map(f).collect()
        } else {
            (0..n).map(f).collect()
        }
    }

    /// Fallible variant of [`maybe_par_map`](Self::maybe_par_map).
    ///
    /// Returns the first error encountered in index order when sequential;
    /// in parallel mode any failing index may be reported.
    pub fn maybe_par_try_map<T, E, F>(self, n: usize, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Sync + Send,
    {
        if self.is_parallel() {
            (0..n).into_par_iter().map(f).collect()
        } else {
            (0..n).map(f).collect()
        }
    }
}

/// Run `f` inside a rayon pool sized for `n_threads`.
///
/// `0` uses the global pool and `1` runs sequentially on the calling thread.
/// If a dedicated pool cannot be created the closure runs sequentially.
pub fn run_with_threads<T, F>(n_threads: usize, f: F) -> T
where
    T: Send,
    F: FnOnce(Parallelism) -> T + Send,
{
    match n_threads {
        0 => f(Parallelism::from_threads(0)),
        1 => f(Parallelism::Sequential),
        n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
            Err(err) => {
                tracing::warn!(%err, n_threads = n, "thread pool unavailable, running sequentially");
                f(Parallelism::Sequential)
            }
        },
    }
}

// =============================================================================
// Numeric Helpers
// =============================================================================

/// Index of the largest value; the first index wins ties.
///
/// Returns 0 for an empty slice.
#[inline]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
