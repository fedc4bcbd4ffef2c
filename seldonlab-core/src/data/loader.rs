//! CSV + JSON-metadata dataset loader.
//!
//! The metadata sidecar names the CSV columns and says which one is the label
//! and which are sensitive-group indicators:
//!
//! ```json
//! {
//!   "all_col_names": ["age", "income", "female", "male", "label"],
//!   "label_col_name": "label",
//!   "sensitive_col_names": ["female", "male"],
//!   "has_header": false
//! }
//! ```
//!
//! Feature columns default to every column that is neither the label nor
//! sensitive; `feature_col_names` may list them explicitly instead.
//! Sensitive cells are parsed as numbers and are `true` when non-zero.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::dataset::{Dataset, DatasetError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("column '{0}' is not declared in all_col_names")]
    MissingColumn(String),

    #[error("record {record} has {got} fields, expected {expected}")]
    RecordWidth {
        record: usize,
        expected: usize,
        got: usize,
    },

    #[error("record {record}, column '{column}': cannot parse '{value}' as a number")]
    InvalidValue {
        record: usize,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Column layout of a dataset CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub all_col_names: Vec<String>,
    #[serde(alias = "label_col_names")]
    pub label_col_name: String,
    #[serde(default)]
    pub sensitive_col_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_col_names: Option<Vec<String>>,
    #[serde(default)]
    pub has_header: bool,
}

impl DatasetMetadata {
    /// Feature columns in CSV order.
    pub fn features(&self) -> Vec<String> {
        match &self.feature_col_names {
            Some(names) => names.clone(),
            None => self
                .all_col_names
                .iter()
                .filter(|c| **c != self.label_col_name && !self.sensitive_col_names.contains(c))
                .cloned()
                .collect(),
        }
    }

    fn position(&self, column: &str) -> Result<usize, LoadError> {
        self.all_col_names
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| LoadError::MissingColumn(column.to_string()))
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a dataset from a CSV file and its JSON metadata sidecar.
pub fn load_dataset(data_csv: &Path, metadata_json: &Path) -> Result<Dataset, LoadError> {
    let metadata: DatasetMetadata = serde_json::from_str(&read(metadata_json)?)?;
    let dataset = parse_dataset(&read(data_csv)?, &metadata)?;
    tracing::debug!(
        path = %data_csv.display(),
        rows = dataset.n_rows(),
        features = dataset.n_features(),
        "loaded dataset"
    );
    Ok(dataset)
}

/// Parse CSV text according to `metadata`.
pub fn parse_dataset(csv_text: &str, metadata: &DatasetMetadata) -> Result<Dataset, LoadError> {
    let feature_names = metadata.features();
    let feature_idx = feature_names
        .iter()
        .map(|c| metadata.position(c))
        .collect::<Result<Vec<_>, _>>()?;
    let label_idx = metadata.position(&metadata.label_col_name)?;
    let sensitive_idx = metadata
        .sensitive_col_names
        .iter()
        .map(|c| metadata.position(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(metadata.has_header)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let width = metadata.all_col_names.len();
    let mut features = Vec::new();
    let mut labels = Vec::new();
    let mut sensitive: Vec<Vec<bool>> = vec![Vec::new(); sensitive_idx.len()];

    for (record_no, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != width {
            return Err(LoadError::RecordWidth {
                record: record_no,
                expected: width,
                got: record.len(),
            });
        }
        let cell = |idx: usize| -> Result<f64, LoadError> {
            let raw = &record[idx];
            raw.parse::<f64>().map_err(|_| LoadError::InvalidValue {
                record: record_no,
                column: metadata.all_col_names[idx].clone(),
                value: raw.to_string(),
            })
        };

        features.push(feature_idx.iter().map(|&i| cell(i)).collect::<Result<Vec<_>, _>>()?);
        labels.push(cell(label_idx)?);
        for (column, &i) in sensitive.iter_mut().zip(&sensitive_idx) {
            column.push(cell(i)? != 0.0);
        }
    }

    let sensitive: BTreeMap<String, Vec<bool>> = metadata
        .sensitive_col_names
        .iter()
        .cloned()
        .zip(sensitive)
        .collect();
    Ok(Dataset::new(feature_names, features, labels, sensitive)?)
}

/// Write `dataset` as a headered CSV plus metadata sidecar that `load_dataset` reads back.
pub fn write_dataset(
    dataset: &Dataset,
    data_csv: &Path,
    metadata_json: &Path,
    label_col_name: &str,
) -> Result<DatasetMetadata, LoadError> {
    let sensitive_col_names = dataset.sensitive_names();
    let mut all_col_names: Vec<String> = dataset.feature_names().to_vec();
    all_col_names.extend(sensitive_col_names.iter().cloned());
    all_col_names.push(label_col_name.to_string());

    let mut writer = csv::Writer::from_path(data_csv)?;
    writer.write_record(&all_col_names)?;
    for row in 0..dataset.n_rows() {
        let mut record: Vec<String> = dataset.features()[row].iter().map(f64::to_string).collect();
        for name in &sensitive_col_names {
            let flag = dataset.sensitive(name).map_or(false, |flags| flags[row]);
            record.push(if flag { "1".into() } else { "0".into() });
        }
        record.push(dataset.labels()[row].to_string());
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: data_csv.to_path_buf(),
        source,
    })?;

    let metadata = DatasetMetadata {
        all_col_names,
        label_col_name: label_col_name.to_string(),
        sensitive_col_names,
        feature_col_names: None,
        has_header: true,
    };
    let json = serde_json::to_string_pretty(&metadata)?;
    fs::write(metadata_json, json).map_err(|source| LoadError::Io {
        path: metadata_json.to_path_buf(),
        source,
    })?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DatasetMetadata {
        serde_json::from_str(
            r#"{
                "all_col_names": ["x1", "x2", "f", "m", "y"],
                "label_col_names": "y",
                "sensitive_col_names": ["f", "m"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_headerless_csv() {
        let d = parse_dataset("0.5,1.0,1,0,1\n-0.5,2.0,0,1,0\n", &meta()).unwrap();
        assert_eq!(d.n_rows(), 2);
        assert_eq!(d.feature_names(), &["x1".to_string(), "x2".to_string()]);
        assert_eq!(d.labels(), &[1.0, 0.0]);
        assert_eq!(d.sensitive("f").unwrap(), &[true, false]);
        assert_eq!(d.sensitive("m").unwrap(), &[false, true]);
    }

    #[test]
    fn explicit_feature_list_wins() {
        let mut m = meta();
        m.feature_col_names = Some(vec!["x2".into()]);
        let d = parse_dataset("0.5,1.0,1,0,1\n", &m).unwrap();
        assert_eq!(d.features()[0], vec![1.0]);
    }

    #[test]
    fn reports_bad_cells_and_widths() {
        let err = parse_dataset("0.5,abc,1,0,1\n", &meta()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidValue { ref column, .. } if column == "x2"));

        let err = parse_dataset("0.5,1.0,1\n", &meta());
        assert!(err.is_err());
    }

    #[test]
    fn unknown_label_column() {
        let mut m = meta();
        m.label_col_name = "target".into();
        let err = parse_dataset("", &m).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(ref c) if c == "target"));
    }

    #[test]
    fn write_then_load_matches() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("data.csv");
        let meta_path = dir.path().join("meta.json");
        let original = parse_dataset("0.5,1.0,1,0,1\n-0.25,2.0,0,1,0\n", &meta()).unwrap();

        write_dataset(&original, &csv_path, &meta_path, "y").unwrap();
        let loaded = load_dataset(&csv_path, &meta_path).unwrap();
        assert_eq!(loaded, original);
    }
}
