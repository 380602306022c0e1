//! Utility functions and types

pub mod data_loader;

pub use data_loader::{
    compare_labels, Batch, BatchSource, CsvChunkSource, CsvSourceOptions, LabeledTable, Schema,
};
