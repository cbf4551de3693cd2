//! Seeded synthetic classification data.
//!
//! [`make_classification`] places Gaussian clusters on the vertices of a
//! hypercube in the informative subspace, then appends linear combinations
//! (redundant), copies (repeated) and pure noise columns.

use std::collections::HashSet;

use bon::Builder;
use ndarray::{Array1, Array2, Axis, s};
use rand::prelude::*;
use rand::seq::index;
use rand_distr::StandardNormal;

use super::{Dataset, DatasetError};

/// Below this many informative dimensions vertices are drawn by index.
const DENSE_VERTEX_DIMS: usize = 20;

/// Parameters of [`make_classification`].
///
/// # Example
///
/// ```
/// use quantree::data::{ClassificationParams, make_classification};
///
/// let params = ClassificationParams::builder()
///     .n_samples(200)
///     .n_features(10)
///     .n_classes(3)
///     .n_informative(4)
///     .seed(7)
///     .build()
///     .unwrap();
/// let ds = make_classification(&params).unwrap();
/// assert_eq!(ds.n_features(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ClassificationParams {
    /// Number of rows. Default: 100.
    #[builder(default = 100)]
    pub n_samples: usize,

    /// Total number of columns. Default: 20.
    #[builder(default = 20)]
    pub n_features: usize,

    /// Columns carrying the class signal. Default: 2.
    #[builder(default = 2)]
    pub n_informative: usize,

    /// Random linear combinations of the informative columns. Default: 2.
    #[builder(default = 2)]
    pub n_redundant: usize,

    /// Copies of informative or redundant columns. Default: 0.
    #[builder(default = 0)]
    pub n_repeated: usize,

    /// Default: 2.
    #[builder(default = 2)]
    pub n_classes: usize,

    /// Default: 2.
    #[builder(default = 2)]
    pub n_clusters_per_class: usize,

    /// Fraction of labels replaced by a random class. Default: 0.01.
    #[builder(default = 0.01)]
    pub flip_y: f64,

    /// Half the side of the hypercube holding the centroids. Default: 1.0.
    #[builder(default = 1.0)]
    pub class_sep: f64,

    /// Permute rows and columns. Default: true.
    #[builder(default = true)]
    pub shuffle: bool,

    #[builder(default = 0)]
    pub seed: u64,
}

impl<S: classification_params_builder::IsComplete> ClassificationParamsBuilder<S> {
    /// Build and validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidGenerator`] when the column budget is
    /// exceeded, there are more clusters than hypercube vertices, or
    /// `flip_y` / `class_sep` are out of range.
    pub fn build(self) -> Result<ClassificationParams, DatasetError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for ClassificationParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl ClassificationParams {
    fn validate(&self) -> Result<(), DatasetError> {
        let invalid = |name: &'static str, reason: String| DatasetError::InvalidGenerator { name, reason };

        if self.n_samples == 0 {
            return Err(invalid("n_samples", "must be at least 1".into()));
        }
        if self.n_informative == 0 {
            return Err(invalid("n_informative", "must be at least 1".into()));
        }
        let used = self.n_informative + self.n_redundant + self.n_repeated;
        if used > self.n_features {
            return Err(invalid(
                "n_features",
                format!("{} columns cannot hold {used} informative, redundant and repeated features", self.n_features),
            ));
        }
        if self.n_classes == 0 || self.n_clusters_per_class == 0 {
            return Err(invalid("n_classes", "classes and clusters per class must be at least 1".into()));
        }
        let n_clusters = self.n_classes * self.n_clusters_per_class;
        if self.n_informative < usize::BITS as usize - 1 && n_clusters > 1usize << self.n_informative {
            return Err(invalid(
                "n_informative",
                format!(
                    "n_classes * n_clusters_per_class = {n_clusters} exceeds 2^{}",
                    self.n_informative
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.flip_y) {
            return Err(invalid("flip_y", format!("must be in [0, 1], got {}", self.flip_y)));
        }
        if !self.class_sep.is_finite() {
            return Err(invalid("class_sep", format!("must be finite, got {}", self.class_sep)));
        }
        Ok(())
    }

    #[inline]
    fn n_clusters(&self) -> usize {
        self.n_classes * self.n_clusters_per_class
    }
}

/// Generate a random n-class classification problem.
///
/// Labels are `0..n_classes`. The result is fully determined by `params`.
pub fn make_classification(params: &ClassificationParams) -> Result<Dataset, DatasetError> {
    params.validate()?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let n_samples = params.n_samples;
    let n_inf = params.n_informative;
    let n_clusters = params.n_clusters();

    // Even split, remainder to the first clusters.
    let mut per_cluster = vec![n_samples / n_clusters; n_clusters];
    for count in per_cluster.iter_mut().take(n_samples % n_clusters) {
        *count += 1;
    }

    let centroids = hypercube_centroids(&mut rng, n_inf, n_clusters, params.class_sep);

    let mut features = Array2::<f64>::zeros((n_samples, params.n_features));
    let mut labels = Array1::<i64>::zeros(n_samples);

    features
        .slice_mut(s![.., ..n_inf])
        .mapv_inplace(|_| rng.sample::<f64, _>(StandardNormal));

    let mut start = 0;
    for (k, &count) in per_cluster.iter().enumerate() {
        let stop = start + count;
        labels.slice_mut(s![start..stop]).fill((k % params.n_classes) as i64);

        let covariance = Array2::from_shape_fn((n_inf, n_inf), |_| rng.gen_range(-1.0..1.0));
        let mut block = features.slice(s![start..stop, ..n_inf]).dot(&covariance);
        block += &centroids.row(k);
        features.slice_mut(s![start..stop, ..n_inf]).assign(&block);
        start = stop;
    }

    if params.n_redundant > 0 {
        let mixing = Array2::from_shape_fn((n_inf, params.n_redundant), |_| rng.gen_range(-1.0..1.0));
        let redundant = features.slice(s![.., ..n_inf]).dot(&mixing);
        features
            .slice_mut(s![.., n_inf..n_inf + params.n_redundant])
            .assign(&redundant);
    }

    if params.n_repeated > 0 {
        let n_source = n_inf + params.n_redundant;
        for j in 0..params.n_repeated {
            let src = rng.gen_range(0..n_source);
            let column = features.column(src).to_owned();
            features.column_mut(n_source + j).assign(&column);
        }
    }

    let n_signal = n_inf + params.n_redundant + params.n_repeated;
    features
        .slice_mut(s![.., n_signal..])
        .mapv_inplace(|_| rng.sample::<f64, _>(StandardNormal));

    if params.flip_y > 0.0 {
        for label in labels.iter_mut() {
            if rng.r#gen::<f64>() < params.flip_y {
                *label = rng.gen_range(0..params.n_classes) as i64;
            }
        }
    }

    if params.shuffle {
        let mut rows: Vec<usize> = (0..n_samples).collect();
        rows.shuffle(&mut rng);
        features = features.select(Axis(0), &rows);
        labels = labels.select(Axis(0), &rows);

        let mut cols: Vec<usize> = (0..params.n_features).collect();
        cols.shuffle(&mut rng);
        features = features.select(Axis(1), &cols);
    }

    Dataset::new(features, labels)
}

/// Distinct random hypercube vertices scaled to `+-class_sep`, one per row.
fn hypercube_centroids(rng: &mut StdRng, n_dims: usize, n_clusters: usize, class_sep: f64) -> Array2<f64> {
    let vertices: Vec<Vec<bool>> = if n_dims < DENSE_VERTEX_DIMS {
        index::sample(rng, 1usize << n_dims, n_clusters)
            .into_iter()
            .map(|v| (0..n_dims).map(|bit| (v >> bit) & 1 == 1).collect())
            .collect()
    } else {
        let mut seen = HashSet::with_capacity(n_clusters);
        let mut out = Vec::with_capacity(n_clusters);
        while out.len() < n_clusters {
            let vertex: Vec<bool> = (0..n_dims).map(|_| rng.r#gen::<bool>()).collect();
            if seen.insert(vertex.clone()) {
                out.push(vertex);
            }
        }
        out
    };

    let mut centroids = Array2::zeros((n_clusters, n_dims));
    for (k, vertex) in vertices.iter().enumerate() {
        for (j, &bit) in vertex.iter().enumerate() {
            centroids[[k, j]] = if bit { class_sep } else { -class_sep };
        }
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ClassificationParamsBuilder {
        ClassificationParams::builder()
    }

    #[test]
    fn defaults() {
        let p = ClassificationParams::default();
        assert_eq!(p.n_samples, 100);
        assert_eq!(p.n_features, 20);
        assert_eq!(p.n_informative, 2);
        assert_eq!(p.n_redundant, 2);
        assert_eq!(p.n_clusters_per_class, 2);
        assert!(p.shuffle);
    }

    #[test]
    fn shape_and_labels() {
        let p = params().n_samples(150).n_features(8).n_classes(3).n_informative(3).seed(1).build().unwrap();
        let ds = make_classification(&p).unwrap();
        assert_eq!(ds.n_samples(), 150);
        assert_eq!(ds.n_features(), 8);
        assert!(ds.labels().iter().all(|&y| (0..3).contains(&y)));
        assert_eq!(ds.classes(), vec![0, 1, 2]);
    }

    #[test]
    fn deterministic_per_seed() {
        let p = params().seed(42).build().unwrap();
        let a = make_classification(&p).unwrap();
        let b = make_classification(&p).unwrap();
        assert_eq!(a, b);

        let c = make_classification(&params().seed(43).build().unwrap()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn balanced_without_flips() {
        let p = params().n_samples(101).flip_y(0.0).shuffle(false).build().unwrap();
        let ds = make_classification(&p).unwrap();
        let ones = ds.labels().iter().filter(|&&y| y == 1).count();
        // 4 clusters of 26/25/25/25; clusters 0 and 2 are class 0.
        assert_eq!(ones, 50);
    }

    #[test]
    fn redundant_columns_are_linear_in_informative() {
        let p = params()
            .n_samples(50)
            .n_features(3)
            .n_informative(2)
            .n_redundant(1)
            .n_clusters_per_class(1)
            .shuffle(false)
            .build()
            .unwrap();
        let ds = make_classification(&p).unwrap();
        let x = ds.features();
        // Solve the 2x2 system from two rows and check the rest.
        let (a, b) = (x.row(0), x.row(1));
        let det = a[0] * b[1] - a[1] * b[0];
        let w0 = (a[2] * b[1] - a[1] * b[2]) / det;
        let w1 = (a[0] * b[2] - a[2] * b[0]) / det;
        for row in x.rows() {
            approx::assert_abs_diff_eq!(row[2], w0 * row[0] + w1 * row[1], epsilon = 1e-8);
        }
    }

    #[test]
    fn repeated_columns_copy_signal() {
        let p = params()
            .n_features(5)
            .n_informative(2)
            .n_redundant(1)
            .n_repeated(1)
            .shuffle(false)
            .build()
            .unwrap();
        let ds = make_classification(&p).unwrap();
        let x = ds.features();
        let repeated = x.column(3);
        assert!((0..3).any(|c| x.column(c) == repeated));
    }

    #[test]
    fn rejects_too_many_clusters() {
        let err = params().n_informative(2).n_classes(3).build().unwrap_err();
        assert!(matches!(err, DatasetError::InvalidGenerator { name: "n_informative", .. }));
    }

    #[test]
    fn rejects_column_budget() {
        let err = params().n_features(3).n_informative(2).n_redundant(2).build().unwrap_err();
        assert!(matches!(err, DatasetError::InvalidGenerator { name: "n_features", .. }));
    }

    #[test]
    fn rejects_flip_range() {
        assert!(params().flip_y(1.5).build().is_err());
    }

    #[test]
    fn wide_informative_space() {
        let p = params().n_features(30).n_informative(25).n_redundant(0).n_classes(4).build().unwrap();
        let ds = make_classification(&p).unwrap();
        assert_eq!(ds.n_features(), 30);
    }
}
