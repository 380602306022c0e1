//! Compressed sparse row matrix used for hashed features

use crate::error::{KolosalError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// CSR matrix of `f64` values with a fixed column count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [usize],
    pub values: &'a [f64],
}

impl<'a> SparseRow<'a> {
    /// Dot product with a dense vector
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.indices
            .iter()
            .zip(self.values)
            .map(|(&j, &v)| dense[j] * v)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }
}

impl SparseMatrix {
    /// Empty matrix with `n_cols` columns and no rows
    pub fn new(n_cols: usize) -> Self {
        Self { n_cols, indptr: vec![0], indices: Vec::new(), values: Vec::new() }
    }

    /// Append a row. Entries may come in any order; duplicates are summed and
    /// entries that cancel to zero are dropped.
    pub fn push_row(&mut self, entries: &mut Vec<(usize, f64)>) -> Result<()> {
        if let Some(&(j, _)) = entries.iter().find(|(j, _)| *j >= self.n_cols) {
            return Err(KolosalError::ShapeError {
                expected: format!("column < {}", self.n_cols),
                actual: format!("column {}", j),
            });
        }

        entries.sort_unstable_by_key(|&(j, _)| j);
        let mut i = 0;
        while i < entries.len() {
            let j = entries[i].0;
            let mut sum = 0.0;
            while i < entries.len() && entries[i].0 == j {
                sum += entries[i].1;
                i += 1;
            }
            if sum != 0.0 {
                self.indices.push(j);
                self.values.push(sum);
            }
        }
        self.indptr.push(self.indices.len());
        entries.clear();
        Ok(())
    }

    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let mut m = Self::new(dense.ncols());
        let mut entries = Vec::new();
        for row in dense.rows() {
            entries.extend(row.iter().enumerate().filter(|(_, &v)| v != 0.0).map(|(j, &v)| (j, v)));
            // indices are in range by construction
            let _ = m.push_row(&mut entries);
        }
        m
    }

    pub fn nrows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn row(&self, i: usize) -> SparseRow<'_> {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        SparseRow { indices: &self.indices[start..end], values: &self.values[start..end] }
    }

    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> {
        (0..self.nrows()).map(move |i| self.row(i))
    }

    /// New matrix holding the given rows in the given order
    pub fn select_rows(&self, rows: &[usize]) -> SparseMatrix {
        let mut out = Self::new(self.n_cols);
        for &i in rows {
            let row = self.row(i);
            out.indices.extend_from_slice(row.indices);
            out.values.extend_from_slice(row.values);
            out.indptr.push(out.indices.len());
        }
        out
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.nrows(), self.n_cols));
        for (i, row) in self.rows().enumerate() {
            for (j, v) in row.iter() {
                dense[[i, j]] = v;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_push_row_merges_duplicates() {
        let mut m = SparseMatrix::new(8);
        m.push_row(&mut vec![(5, 1.0), (2, 1.0), (5, 1.0), (3, 1.0), (3, -1.0)]).unwrap();
        let row = m.row(0);
        assert_eq!(row.indices, &[2, 5]);
        assert_eq!(row.values, &[1.0, 2.0]);
    }

    #[test]
    fn test_out_of_range_column() {
        let mut m = SparseMatrix::new(4);
        assert!(m.push_row(&mut vec![(4, 1.0)]).is_err());
    }

    #[test]
    fn test_dense_round_trip_and_dot() {
        let dense = array![[0.0, 1.0, 0.0], [2.0, 0.0, -1.0]];
        let m = SparseMatrix::from_dense(&dense);
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.to_dense(), dense);
        assert_eq!(m.row(1).dot(&[1.0, 5.0, 3.0]), -1.0);
    }

    #[test]
    fn test_select_rows() {
        let m = SparseMatrix::from_dense(&array![[1.0, 0.0], [0.0, 2.0], [3.0, 3.0]]);
        let sub = m.select_rows(&[2, 0]);
        assert_eq!(sub.to_dense(), array![[3.0, 3.0], [1.0, 0.0]]);
    }
}
