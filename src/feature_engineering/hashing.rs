//! Feature hashing for streaming categorical data
//!
//! Every feature value of a row is stringified and hashed with MurmurHash3
//! (x86, 32-bit, seed 0) into a fixed number of columns. The hasher has no
//! fitted state, so batches can be encoded independently and in any order.
//! Unrelated values may collide on the same column; that is accepted.

use super::sparse::SparseMatrix;
use crate::error::{KolosalError, Result};
use crate::utils::Batch;
use serde::{Deserialize, Serialize};

/// Default hash width, 2^20 columns
pub const DEFAULT_N_FEATURES: usize = 1 << 20;

/// A batch turned into model input
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub features: SparseMatrix,
    /// Raw labels, row-aligned with `features`
    pub labels: Vec<String>,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Stateless hashing encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureHasher {
    n_features: usize,
    alternate_sign: bool,
    column_prefix: bool,
}

impl Default for FeatureHasher {
    fn default() -> Self {
        Self { n_features: DEFAULT_N_FEATURES, alternate_sign: true, column_prefix: false }
    }
}

impl FeatureHasher {
    pub fn new(n_features: usize) -> Result<Self> {
        if n_features == 0 {
            return Err(KolosalError::InvalidParameter {
                name: "n_features".to_string(),
                value: "0".to_string(),
                reason: "hash width must be at least 1".to_string(),
            });
        }
        Ok(Self { n_features, ..Default::default() })
    }

    /// Flip the sign of values whose hash is negative, so collisions tend to cancel
    pub fn with_alternate_sign(mut self, alternate_sign: bool) -> Self {
        self.alternate_sign = alternate_sign;
        self
    }

    /// Hash `column=value` instead of the bare value
    pub fn with_column_prefix(mut self, column_prefix: bool) -> Self {
        self.column_prefix = column_prefix;
        self
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Column index and signed value of one token
    pub fn hash_token(&self, token: &str) -> (usize, f64) {
        let h = murmur3_32(token.as_bytes(), 0) as i32;
        let index = (h as i64).unsigned_abs() as usize % self.n_features;
        let value = if self.alternate_sign && h < 0 { -1.0 } else { 1.0 };
        (index, value)
    }

    /// Encode a batch: features from every non-label, non-dropped column, labels verbatim
    pub fn encode(&self, batch: &Batch) -> Result<EncodedBatch> {
        let schema = batch.schema();
        let mut features = SparseMatrix::new(self.n_features);
        let mut labels = Vec::with_capacity(batch.len());
        let mut entries = Vec::with_capacity(schema.feature_indices().len());
        let mut token = String::new();

        for record in batch.rows() {
            for &col in schema.feature_indices() {
                let value = record.get(col).unwrap_or_default();
                let (index, sign) = if self.column_prefix {
                    token.clear();
                    token.push_str(&schema.columns()[col]);
                    token.push('=');
                    token.push_str(value);
                    self.hash_token(&token)
                } else {
                    self.hash_token(value)
                };
                entries.push((index, sign));
            }
            features.push_row(&mut entries)?;
            labels.push(record.get(schema.label_index()).unwrap_or_default().to_string());
        }

        Ok(EncodedBatch { features, labels })
    }
}

/// MurmurHash3 x86 32-bit
pub fn murmur3_32(key: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let chunks = key.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc ^ ((b as u32) << (8 * i)));
        h ^= k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
    }

    h ^= key.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}
