use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Norms below this are treated as degenerate.
pub const ZERO_NORM_EPSILON: f64 = 1e-12;

/// A fixed-length embedding produced once per text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingVector {
    data: Vec<f32>,
}

impl EmbeddingVector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Dot product accumulated in f64
    #[inline]
    pub fn dot(&self, other: &EmbeddingVector) -> f64 {
        dot(&self.data, &other.data)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        dot(&self.data, &self.data).sqrt()
    }

    /// Cosine similarity of the two unit-normalized vectors.
    ///
    /// Fails with [`Error::ZeroVector`] when either norm is ~0 and with
    /// [`Error::InvalidDimension`] when the lengths differ.
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> Result<f64> {
        if self.dim() != other.dim() {
            return Err(Error::InvalidDimension {
                expected: self.dim(),
                actual: other.dim(),
            });
        }

        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a < ZERO_NORM_EPSILON || norm_b < ZERO_NORM_EPSILON {
            return Err(Error::ZeroVector(format!(
                "cannot normalize vector (norms {norm_a:.3e}, {norm_b:.3e})"
            )));
        }

        // Clamp to absorb rounding drift past ±1
        Ok((self.dot(other) / (norm_a * norm_b)).clamp(-1.0, 1.0))
    }

    /// Element-wise `self - other`
    pub fn difference(&self, other: &EmbeddingVector) -> Result<EmbeddingVector> {
        if self.dim() != other.dim() {
            return Err(Error::InvalidDimension {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        Ok(EmbeddingVector::new(
            self.data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect(),
        ))
    }

    /// Element-wise absolute difference
    pub fn abs_diff(&self, other: &EmbeddingVector) -> Result<Vec<f64>> {
        if self.dim() != other.dim() {
            return Err(Error::InvalidDimension {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (f64::from(*a) - f64::from(*b)).abs())
            .collect())
    }

    /// Normalize the vector to unit length
    #[inline]
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > ZERO_NORM_EPSILON {
            let inv_norm = 1.0 / norm;
            for x in &mut self.data {
                *x = (f64::from(*x) * inv_norm) as f32;
            }
        }
    }

    /// Get normalized copy
    #[inline]
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut v = self.clone();
        v.normalize();
        v
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

/// Scalar dot product with two accumulators for better pipelining
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len().min(b.len());
    let mut sum0 = 0.0f64;
    let mut sum1 = 0.0f64;
    let mut i = 0;

    while i + 1 < len {
        sum0 += f64::from(a[i]) * f64::from(b[i]);
        sum1 += f64::from(a[i + 1]) * f64::from(b[i + 1]);
        i += 2;
    }
    if i < len {
        sum0 += f64::from(a[i]) * f64::from(b[i]);
    }

    sum0 + sum1
}
