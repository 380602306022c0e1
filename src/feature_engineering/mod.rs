//! Feature engineering for streaming input
//!
//! - [`hashing`] - stateless feature hashing of raw batches
//! - [`sparse`] - CSR storage for the hashed features

pub mod hashing;
pub mod sparse;

pub use hashing::{murmur3_32, EncodedBatch, FeatureHasher, DEFAULT_N_FEATURES};
pub use sparse::{SparseMatrix, SparseRow};
