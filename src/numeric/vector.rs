use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::{ReductionError, Result};

/// Fixed-length buffer of `f64` values used for probability vectors.
///
/// Binary operations check that both operands have the same length and
/// return [`ReductionError::DimensionMismatch`] otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseVector {
    values: Vec<f64>,
}

impl DenseVector {
    /// Vector of `dim` zeros.
    pub fn zeros(dim: usize) -> Self {
        Self::filled(dim, 0.0)
    }

    /// Vector of `dim` copies of `value`. `filled(n, 1.0)` followed by
    /// [`normalize_sum`](Self::normalize_sum) is the uniform start vector.
    pub fn filled(dim: usize, value: f64) -> Self {
        Self {
            values: vec![value; dim],
        }
    }

    /// Takes ownership of `values` without copying.
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Fails unless `other` has the same length as `self`.
    pub fn check_dim(&self, other: &Self) -> Result<()> {
        check_len(self.dim(), other.dim())
    }

    /// Overwrites every entry with the matching entry of `other`.
    pub fn copy_from(&mut self, other: &Self) -> Result<()> {
        self.check_dim(other)?;
        self.values.copy_from_slice(&other.values);
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_dim(other)?;
        self.values
            .iter_mut()
            .zip(other.values.iter())
            .for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// `self += factor * other`
    pub fn axpy(&mut self, factor: f64, other: &Self) -> Result<()> {
        self.check_dim(other)?;
        self.values
            .iter_mut()
            .zip(other.values.iter())
            .for_each(|(a, b)| *a += factor * b);
        Ok(())
    }

    /// `self = factor * other`
    pub fn assign_scaled(&mut self, factor: f64, other: &Self) -> Result<()> {
        self.check_dim(other)?;
        self.values
            .iter_mut()
            .zip(other.values.iter())
            .for_each(|(a, b)| *a = factor * b);
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        self.values.iter_mut().for_each(|v| *v *= factor);
    }

    pub fn dot(&self, other: &Self) -> Result<f64> {
        self.check_dim(other)?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum())
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn norm1(&self) -> f64 {
        self.values.iter().map(|v| v.abs()).sum()
    }

    /// L1 distance between two vectors.
    pub fn diff_norm1(&self, other: &Self) -> Result<f64> {
        self.check_dim(other)?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).abs())
            .sum())
    }

    /// Sum of per-entry relative differences `|a-b| / (|a|+|b|)`; entries
    /// that are zero in both vectors contribute nothing.
    pub fn diff_norm_rel(&self, other: &Self) -> Result<f64> {
        self.check_dim(other)?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .filter_map(|(a, b)| {
                let scale = a.abs() + b.abs();
                (scale != 0.0).then(|| (a - b).abs() / scale)
            })
            .sum())
    }

    /// Rescales the vector to unit sum and returns the sum it had before.
    /// A vector summing to zero is left untouched.
    pub fn normalize_sum(&mut self) -> f64 {
        let sum = self.sum();
        if sum != 0.0 {
            self.values.iter_mut().for_each(|v| *v /= sum);
        }
        sum
    }

    /// Exchanges the backing stores of two vectors without copying.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.values, &mut other.values);
    }
}

impl Index<usize> for DenseVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

impl IndexMut<usize> for DenseVector {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.values[index]
    }
}

pub(crate) fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ReductionError::DimensionMismatch { expected, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut a = DenseVector::zeros(3);
        let b = DenseVector::zeros(4);
        assert_eq!(
            a.add_assign(&b),
            Err(ReductionError::DimensionMismatch {
                expected: 3,
                got: 4
            })
        );
        assert!(a.dot(&b).is_err());
        assert!(a.diff_norm1(&b).is_err());
    }

    #[test]
    fn normalize_sum_yields_unit_mass() {
        let mut v = DenseVector::from_vec(vec![3.0, 1.0, 0.5, 2.5]);
        let before = v.normalize_sum();
        assert!((before - 7.0).abs() < 1e-15);
        assert!((v.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_sum_leaves_zero_vector() {
        let mut v = DenseVector::zeros(3);
        assert_eq!(v.normalize_sum(), 0.0);
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn relative_difference_skips_double_zeros() {
        let a = DenseVector::from_vec(vec![0.0, 1.0, 2.0]);
        let b = DenseVector::from_vec(vec![0.0, 3.0, 2.0]);
        let rel = a.diff_norm_rel(&b).expect("same length");
        assert!((rel - 0.5).abs() < 1e-15);
        assert!((a.diff_norm1(&b).expect("same length") - 2.0).abs() < 1e-15);
    }

    #[test]
    fn swap_exchanges_storage() {
        let mut a = DenseVector::from_vec(vec![1.0, 2.0]);
        let mut b = DenseVector::from_vec(vec![3.0, 4.0]);
        a.swap(&mut b);
        assert_eq!(a.as_slice(), &[3.0, 4.0]);
        assert_eq!(b.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn axpy_and_dot() {
        let mut a = DenseVector::from_vec(vec![1.0, 1.0, 1.0]);
        let b = DenseVector::from_vec(vec![1.0, 2.0, 3.0]);
        a.axpy(-0.5, &b).expect("same length");
        assert_eq!(a.as_slice(), &[0.5, 0.0, -0.5]);
        assert_eq!(a.dot(&b).expect("same length"), -1.0);
        assert_eq!(a.norm1(), 1.0);
    }
}
