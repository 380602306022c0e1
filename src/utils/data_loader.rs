//! Data loading utilities
//!
//! Two access patterns are supported:
//! - [`CsvChunkSource`] streams a delimited file as fixed-size [`Batch`]es of raw
//!   string rows. It never holds more than one chunk in memory and can be
//!   rewound to the first data row.
//! - [`LabeledTable::load_csv`] loads a whole numeric table with polars for the
//!   hyper-parameter search workflows.

use crate::error::{KolosalError, Result};
use csv::{Position, ReaderBuilder, StringRecord};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

/// Fixed column layout shared by every batch of one source
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<String>,
    label_index: usize,
    feature_indices: Vec<usize>,
}

impl Schema {
    /// Build a schema from ordered column names, the label column and the
    /// identifier columns that are dropped before encoding.
    pub fn new(columns: Vec<String>, label_column: &str, drop_columns: &[String]) -> Result<Self> {
        let label_index = columns
            .iter()
            .position(|c| c == label_column)
            .ok_or_else(|| KolosalError::ConfigError(format!(
                "label column '{}' not in schema {:?}", label_column, columns
            )))?;

        for dropped in drop_columns {
            if !columns.contains(dropped) {
                return Err(KolosalError::ConfigError(format!(
                    "dropped column '{}' not in schema {:?}", dropped, columns
                )));
            }
        }

        let feature_indices = (0..columns.len())
            .filter(|&i| i != label_index && !drop_columns.contains(&columns[i]))
            .collect();

        Ok(Self { columns, label_index, feature_indices })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn label_index(&self) -> usize {
        self.label_index
    }

    pub fn label_column(&self) -> &str {
        &self.columns[self.label_index]
    }

    /// Indices of the columns that feed the feature encoder, in schema order
    pub fn feature_indices(&self) -> &[usize] {
        &self.feature_indices
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// A contiguous slice of raw rows from a source
#[derive(Debug, Clone)]
pub struct Batch {
    schema: Arc<Schema>,
    rows: Vec<StringRecord>,
    index: u64,
}

impl Batch {
    /// Build a batch from already-split rows; every row must match the schema width.
    ///
    /// There is no file behind these rows, so `line` in a `DataFormat` error is the
    /// 1-based position of the row within `rows`.
    pub fn from_rows<I, R, S>(schema: Arc<Schema>, index: u64, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        for (offset, row) in rows.into_iter().enumerate() {
            let record: StringRecord = row.into_iter().map(|v| v.as_ref().to_string()).collect();
            if record.len() != schema.len() {
                return Err(KolosalError::DataFormat {
                    line: offset as u64 + 1,
                    reason: format!(
                        "row {} of batch {}: expected {} fields, found {}",
                        offset + 1,
                        index,
                        schema.len(),
                        record.len()
                    ),
                });
            }
            records.push(record);
        }
        Ok(Self { schema, rows: records, index })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// 0-based position of this batch in its source
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    /// Raw value of `column` in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.schema.index_of(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Raw label of row `row`
    pub fn label(&self, row: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(self.schema.label_index()))
    }
}

/// Anything that yields batches in source order until exhausted
pub trait BatchSource {
    fn schema(&self) -> &Arc<Schema>;

    /// Next batch, or `Ok(None)` once the source is exhausted
    fn next_batch(&mut self) -> Result<Option<Batch>>;
}

/// Options for reading a delimited file in chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvSourceOptions {
    /// Rows per batch
    pub chunk_size: usize,
    /// Field delimiter
    pub delimiter: u8,
    /// Column names replacing the file header (the header line is still skipped)
    pub column_names: Option<Vec<String>>,
    /// Target column
    pub label_column: String,
    /// Identifier columns excluded from the features
    pub drop_columns: Vec<String>,
}

impl Default for CsvSourceOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            delimiter: b',',
            column_names: None,
            label_column: "click".to_string(),
            drop_columns: vec!["id".to_string()],
        }
    }
}

/// Chunked CSV reader over any byte source
pub struct CsvChunkSource<R: Read> {
    reader: csv::Reader<R>,
    schema: Arc<Schema>,
    chunk_size: usize,
    next_index: u64,
    exhausted: bool,
}

impl CsvChunkSource<File> {
    /// Open a file for chunked reading
    pub fn open(path: impl AsRef<Path>, options: &CsvSourceOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            KolosalError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file, options)
    }
}

impl<R: Read> CsvChunkSource<R> {
    /// Wrap a reader; the first line is read as the header
    pub fn from_reader(rdr: R, options: &CsvSourceOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(KolosalError::InvalidParameter {
                name: "chunk_size".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(rdr);

        let header: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let columns = match &options.column_names {
            Some(names) if names.len() != header.len() => {
                return Err(KolosalError::ConfigError(format!(
                    "{} column names given but the file has {} columns",
                    names.len(),
                    header.len()
                )));
            }
            Some(names) => names.clone(),
            None => header,
        };

        let schema = Schema::new(columns, &options.label_column, &options.drop_columns)?;

        Ok(Self {
            reader,
            schema: Arc::new(schema),
            chunk_size: options.chunk_size,
            next_index: 0,
            exhausted: false,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of batches handed out since the start (or the last restart)
    pub fn batches_read(&self) -> u64 {
        self.next_index
    }

    /// Pull up to `n_rows` rows as one batch, independent of the chunk size
    pub fn next_batch_of(&mut self, n_rows: usize) -> Result<Option<Batch>> {
        if self.exhausted || n_rows == 0 {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(n_rows.min(1 << 16));
        while rows.len() < n_rows {
            let mut record = StringRecord::new();
            if !self.reader.read_record(&mut record)? {
                self.exhausted = true;
                break;
            }
            rows.push(record);
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let batch = Batch { schema: Arc::clone(&self.schema), rows, index: self.next_index };
        self.next_index += 1;
        Ok(Some(batch))
    }
}

impl<R: Read + Seek> CsvChunkSource<R> {
    /// Rewind to the first data row
    pub fn restart(&mut self) -> Result<()> {
        self.reader.seek(Position::new())?;
        // seeking bypasses header handling, so consume the header line again
        let mut header = StringRecord::new();
        self.reader.read_record(&mut header)?;
        self.next_index = 0;
        self.exhausted = false;
        Ok(())
    }
}

impl<R: Read> BatchSource for CsvChunkSource<R> {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.next_batch_of(self.chunk_size)
    }
}

/// Dense numeric table with an encoded class target
#[derive(Debug, Clone)]
pub struct LabeledTable {
    pub name: String,
    pub feature_names: Vec<String>,
    pub x: Array2<f64>,
    /// Class index per row, into `classes`
    pub y: Vec<usize>,
    /// Sorted distinct class labels
    pub classes: Vec<String>,
}

impl LabeledTable {
    /// Load a CSV with a header row; every non-target column must be numeric
    pub fn load_csv(path: impl AsRef<Path>, target: &str) -> Result<Self> {
        let path = path.as_ref();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset")
            .to_string();
        Self::from_dataframe(name, &df, target)
    }

    pub fn from_dataframe(name: impl Into<String>, df: &DataFrame, target: &str) -> Result<Self> {
        let target_col = df
            .column(target)
            .map_err(|_| KolosalError::DataError(format!("target column '{}' not found", target)))?;
        let target_col = target_col.cast(&DataType::String)?;
        let raw_labels: Vec<String> = target_col
            .str()?
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.map(str::to_string)
                    .ok_or_else(|| KolosalError::DataError(format!("missing target in row {}", i)))
            })
            .collect::<Result<_>>()?;

        let feature_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .filter(|n| n != target)
            .collect();

        let n_rows = df.height();
        let mut x = Array2::zeros((n_rows, feature_names.len()));
        for (j, feature) in feature_names.iter().enumerate() {
            let col = df.column(feature)?.cast(&DataType::Float64)?;
            for (i, v) in col.f64()?.into_iter().enumerate() {
                x[[i, j]] = v.ok_or_else(|| KolosalError::DataError(format!(
                    "missing or non-numeric value in column '{}' row {}", feature, i
                )))?;
            }
        }

        Self::from_labels(name, feature_names, x, &raw_labels)
    }

    /// Encode raw labels against their sorted distinct values
    pub fn from_labels(
        name: impl Into<String>,
        feature_names: Vec<String>,
        x: Array2<f64>,
        labels: &[String],
    ) -> Result<Self> {
        if x.nrows() != labels.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort_by(|a, b| compare_labels(a, b));
        classes.dedup();

        let y = labels
            .iter()
            .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
            .collect();

        Ok(Self { name: name.into(), feature_names, x, y, classes })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

/// Numeric labels sort numerically, anything else lexically
pub fn compare_labels(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}
