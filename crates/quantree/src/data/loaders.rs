//! Loaders for bundled real-world datasets.
//!
//! The breast-cancer data uses the CSV layout shipped with scikit-learn:
//!
//! ```text
//! 569,30,malignant,benign
//! 17.99,10.38,...,0.1189,0
//! ```
//!
//! The first line holds the sample and feature counts followed by the class
//! names; every following line holds the features then an integer target.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};

use super::{Dataset, DatasetError};

/// Environment variable overriding the location of `breast_cancer.csv`.
pub const BREAST_CANCER_ENV: &str = "QUANTREE_BREAST_CANCER_CSV";

/// Load the breast-cancer dataset from `path`.
pub fn load_breast_cancer(path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ds = parse_sklearn_csv(&text)?;
    tracing::debug!(
        path = %path.display(),
        n_samples = ds.n_samples(),
        n_features = ds.n_features(),
        "loaded breast cancer dataset"
    );
    Ok(ds)
}

/// Parse a dataset in the scikit-learn bundled CSV layout.
pub fn parse_sklearn_csv(text: &str) -> Result<Dataset, DatasetError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines.next().ok_or(DatasetError::EmptySamples)?;
    let mut fields = header.split(',').map(str::trim);
    let n_samples: usize = parse_field(fields.next(), header_line, "sample count")?;
    let n_features: usize = parse_field(fields.next(), header_line, "feature count")?;
    let n_class_names = fields.filter(|name| !name.is_empty()).count();

    let mut features = Array2::<f64>::zeros((n_samples, n_features));
    let mut labels = Array1::<i64>::zeros(n_samples);
    let mut row = 0;

    for (line_no, line) in lines {
        if row == n_samples {
            return Err(DatasetError::Parse {
                line: line_no,
                message: format!("more rows than the {n_samples} declared in the header"),
            });
        }
        let values: Vec<&str> = line.split(',').map(str::trim).collect();
        if values.len() != n_features + 1 {
            return Err(DatasetError::Parse {
                line: line_no,
                message: format!("expected {} fields, found {}", n_features + 1, values.len()),
            });
        }
        for (j, raw) in values[..n_features].iter().enumerate() {
            features[[row, j]] = raw.parse::<f64>().map_err(|e| DatasetError::Parse {
                line: line_no,
                message: format!("feature {j}: {e}"),
            })?;
        }
        let target = parse_target(values[n_features], line_no)?;
        if n_class_names > 0 && !(0..n_class_names as i64).contains(&target) {
            return Err(DatasetError::Parse {
                line: line_no,
                message: format!("target {target} outside the {n_class_names} declared classes"),
            });
        }
        labels[row] = target;
        row += 1;
    }

    if row != n_samples {
        return Err(DatasetError::ShapeMismatch {
            expected: n_samples,
            got: row,
            field: "rows",
        });
    }
    Dataset::new(features, labels)
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, line: usize, what: &str) -> Result<T, DatasetError>
where
    T::Err: std::fmt::Display,
{
    let raw = field.ok_or_else(|| DatasetError::Parse {
        line,
        message: format!("missing {what}"),
    })?;
    raw.parse().map_err(|e| DatasetError::Parse {
        line,
        message: format!("{what} {raw:?}: {e}"),
    })
}

/// Integer target, also accepting integral floats such as `1.0`.
fn parse_target(raw: &str, line: usize) -> Result<i64, DatasetError> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
        _ => Err(DatasetError::Parse {
            line,
            message: format!("target {raw:?} is not an integer"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "3,2,malignant,benign\n1.5,2.0,0\n3.25,-1,1\n\n0,0,1.0\n";

    #[test]
    fn parses_header_and_rows() {
        let ds = parse_sklearn_csv(SAMPLE).unwrap();
        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.labels().to_vec(), vec![0, 1, 1]);
        assert_eq!(ds.features()[[1, 0]], 3.25);
        assert_eq!(ds.features()[[1, 1]], -1.0);
    }

    #[test]
    fn rejects_short_row() {
        let err = parse_sklearn_csv("1,2,a,b\n1.0,0\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_row_count_mismatch() {
        let err = parse_sklearn_csv("2,1,a,b\n1.0,0\n").unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { expected: 2, got: 1, .. }));

        let err = parse_sklearn_csv("1,1,a,b\n1.0,0\n2.0,1\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 3, .. }));
    }

    #[test]
    fn rejects_unknown_class() {
        let err = parse_sklearn_csv("1,1,a,b\n1.0,2\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_bad_number() {
        let err = parse_sklearn_csv("1,1,a,b\nabc,0\n").unwrap_err();
        assert!(err.to_string().contains("feature 0"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_breast_cancer("/nonexistent/breast_cancer.csv").unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }
}
