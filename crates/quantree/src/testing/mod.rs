//! Test utilities shared by the integration tests, the report binary and the
//! benches.
//!
//! - [`load_data`]: breast-cancer CSV or seeded synthetic data
//! - [`default_configuration`]: compile settings used across tests
//! - [`check_is_good_execution_for_quantized_models`]: FHE vs clear comparator
//! - [`init_tracing`]: idempotent subscriber writing through the test harness

mod comparator;

pub use comparator::{ComparisonError, MAX_EXECUTION_RUNS, check_is_good_execution_for_quantized_models};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::compile::CompileConfig;
use crate::data::{BREAST_CANCER_ENV, ClassificationParams, Dataset, DatasetError, load_breast_cancer, make_classification};

/// Set to run only virtual-mode compilations.
pub const VL_ONLY_ENV: &str = "QUANTREE_VL_ONLY";

/// Set to pin the seed returned by [`random_seed`].
pub const SEED_ENV: &str = "QUANTREE_TEST_SEED";

/// Breast-cancer fixture, relative to the crate root.
pub const BREAST_CANCER_FIXTURE: &str = "tests/test-cases/breast_cancer.csv";

/// Path of the breast-cancer CSV: [`BREAST_CANCER_ENV`] when set, otherwise
/// the vendored fixture if it exists.
pub fn breast_cancer_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(BREAST_CANCER_ENV) {
        return Some(PathBuf::from(path));
    }
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join(BREAST_CANCER_FIXTURE);
    fixture.is_file().then_some(fixture)
}

/// Where a test dataset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    /// The 569 x 30 breast-cancer set, read from [`breast_cancer_path`].
    BreastCancer,
    Classification(ClassificationParams),
}

impl DataSource {
    /// Synthetic data with `n_features` informative columns.
    pub fn synthetic(n_samples: usize, n_features: usize, n_classes: usize, seed: u64) -> Self {
        DataSource::Classification(ClassificationParams {
            n_samples,
            n_features,
            n_informative: n_features,
            n_redundant: 0,
            n_repeated: 0,
            n_classes,
            seed,
            ..ClassificationParams::default()
        })
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::BreastCancer => f.write_str("breast_cancer"),
            DataSource::Classification(p) => write!(
                f,
                "classification(n_samples={}, n_features={}, n_classes={})",
                p.n_samples, p.n_features, p.n_classes
            ),
        }
    }
}

/// Load a dataset. `Ok(None)` when no breast-cancer CSV is available.
pub fn load_data(source: &DataSource) -> Result<Option<Dataset>, DatasetError> {
    match source {
        DataSource::BreastCancer => match breast_cancer_path() {
            Some(path) => load_breast_cancer(path).map(Some),
            None => {
                tracing::warn!(
                    env = BREAST_CANCER_ENV,
                    fixture = BREAST_CANCER_FIXTURE,
                    "breast cancer dataset not found"
                );
                Ok(None)
            }
        },
        DataSource::Classification(params) => make_classification(params).map(Some),
    }
}

/// Compile configuration used by the test suite.
///
/// A fixed key seed keeps encrypted runs reproducible; the remaining fields
/// are the library defaults.
pub fn default_configuration() -> CompileConfig {
    CompileConfig {
        key_seed: Some(0x5EED),
        ..CompileConfig::default()
    }
}

/// True when only virtual-mode compilation should run.
pub fn is_vl_only_option() -> bool {
    std::env::var_os(VL_ONLY_ENV).is_some_and(|v| !v.is_empty() && v != "0")
}

/// A seed for randomized tests, taken from [`SEED_ENV`] when set.
///
/// The seed is logged so a failing run can be replayed.
pub fn random_seed() -> u64 {
    let seed = std::env::var(SEED_ENV)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(rand::random);
    tracing::info!(seed, "test seed");
    seed
}

/// Install a global `fmt` subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_loads() {
        let source = DataSource::synthetic(50, 5, 3, 1);
        let ds = load_data(&source).unwrap().unwrap();
        assert_eq!(ds.n_samples(), 50);
        assert_eq!(ds.n_features(), 5);
        assert_eq!(ds.n_classes(), 3);
        assert!(source.to_string().starts_with("classification("));
    }

    #[test]
    fn breast_cancer_fixture_lives_under_the_crate() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join(BREAST_CANCER_FIXTURE);
        assert!(fixture.ends_with("tests/test-cases/breast_cancer.csv"));
        if std::env::var_os(BREAST_CANCER_ENV).is_none() {
            assert_eq!(breast_cancer_path(), fixture.is_file().then_some(fixture));
        }
    }

    #[test]
    fn default_configuration_is_valid() {
        let config = default_configuration();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_seed, Some(0x5EED));
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
