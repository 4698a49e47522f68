//! Bias subspace estimation and projection removal
//!
//! The subspace is spanned by the top singular directions of the matrix of
//! per-pair embedding differences (e.g. `embed("he") - embed("she")`).
//! Removing a vector's projection onto those directions mitigates
//! gender-correlated signal before similarity and feature computation.

use crate::embedder::{EmbedOptions, Embedder};
use crate::vector::{EmbeddingVector, ZERO_NORM_EPSILON};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of singular directions kept
pub const MAX_BIAS_DIRECTIONS: usize = 3;

const POWER_ITERATIONS: usize = 1000;
const POWER_TOLERANCE: f64 = 1e-12;
/// Directions whose eigenvalue falls below this fraction of the first are rank noise
const RELATIVE_RANK_CUTOFF: f64 = 1e-10;

pub const DEFAULT_GENDER_WORD_PAIRS: &[(&str, &str)] = &[
    ("male", "female"),
    ("man", "woman"),
    ("boy", "girl"),
    ("he", "she"),
    ("his", "hers"),
    ("father", "mother"),
    ("son", "daughter"),
    ("uncle", "aunt"),
    ("husband", "wife"),
    ("gentleman", "lady"),
    ("king", "queen"),
    ("actor", "actress"),
    ("prince", "princess"),
    ("waiter", "waitress"),
    ("lord", "lady"),
];

/// Default pairs as owned strings, for configuration defaults
pub fn default_gender_word_pairs() -> Vec<(String, String)> {
    DEFAULT_GENDER_WORD_PAIRS
        .iter()
        .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
        .collect()
}

/// Orthonormal basis (at most [`MAX_BIAS_DIRECTIONS`] vectors) of the bias subspace.
///
/// Immutable once built; share it read-only across all candidates of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasSubspace {
    directions: Vec<Vec<f64>>,
}

impl BiasSubspace {
    /// Embed every word of every pair and extract the subspace from the differences.
    pub fn compute<S: AsRef<str>>(
        embedder: &dyn Embedder,
        word_pairs: &[(S, S)],
        options: &EmbedOptions,
    ) -> Result<Self> {
        if word_pairs.is_empty() {
            return Err(Error::EmptyInput(
                "bias subspace needs at least one contrastive word pair".to_string(),
            ));
        }

        let mut differences = Vec::with_capacity(word_pairs.len());
        for (a, b) in word_pairs {
            let va = embedder.embed(a.as_ref(), options)?;
            let vb = embedder.embed(b.as_ref(), options)?;
            differences.push(va.difference(&vb)?);
        }

        Self::from_differences(&differences)
    }

    /// Top singular directions of the stacked difference vectors.
    ///
    /// Works on the small `n x n` Gram matrix `D Dᵀ` and maps each eigenvector
    /// back to embedding space as `v = Dᵀu / σ`.
    pub fn from_differences(differences: &[EmbeddingVector]) -> Result<Self> {
        let Some(first) = differences.first() else {
            return Err(Error::EmptyInput("no difference vectors".to_string()));
        };
        let dim = first.dim();
        if let Some(bad) = differences.iter().find(|d| d.dim() != dim) {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: bad.dim(),
            });
        }

        let n = differences.len();
        let mut gram = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in i..n {
                let g = differences[i].dot(&differences[j]);
                gram[i][j] = g;
                gram[j][i] = g;
            }
        }

        let k = MAX_BIAS_DIRECTIONS.min(n);
        let mut eigenvectors: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut directions: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut leading = 0.0f64;

        for _ in 0..k {
            let (eigenvalue, u) = dominant_eigenpair(&gram, &eigenvectors);
            if eigenvalue <= ZERO_NORM_EPSILON || eigenvalue < leading * RELATIVE_RANK_CUTOFF {
                break;
            }
            if leading == 0.0 {
                leading = eigenvalue;
            }

            let sigma = eigenvalue.sqrt();
            let mut v = vec![0.0f64; dim];
            for (row, &weight) in differences.iter().zip(u.iter()) {
                for (acc, &x) in v.iter_mut().zip(row.as_slice()) {
                    *acc += weight * f64::from(x);
                }
            }
            for x in &mut v {
                *x /= sigma;
            }

            // Re-orthogonalize against earlier directions before normalizing
            for prev in &directions {
                let p = dot64(&v, prev);
                for (x, y) in v.iter_mut().zip(prev.iter()) {
                    *x -= p * y;
                }
            }
            let norm = dot64(&v, &v).sqrt();
            if norm <= ZERO_NORM_EPSILON {
                break;
            }
            for x in &mut v {
                *x /= norm;
            }

            eigenvectors.push(u);
            directions.push(v);
        }

        if directions.is_empty() {
            return Err(Error::ZeroVector(
                "all contrastive pairs embed identically; bias subspace is empty".to_string(),
            ));
        }

        debug!(directions = directions.len(), dim, "computed bias subspace");
        Ok(Self { directions })
    }

    /// Build from explicit basis vectors (normalized, assumed orthogonal)
    pub fn from_directions(directions: Vec<Vec<f64>>) -> Result<Self> {
        if directions.is_empty() {
            return Err(Error::EmptyInput("bias subspace needs a direction".to_string()));
        }
        let mut normalized = Vec::with_capacity(directions.len());
        for mut d in directions {
            let norm = dot64(&d, &d).sqrt();
            if norm <= ZERO_NORM_EPSILON {
                return Err(Error::ZeroVector("bias direction has zero norm".to_string()));
            }
            for x in &mut d {
                *x /= norm;
            }
            normalized.push(d);
        }
        Ok(Self {
            directions: normalized,
        })
    }

    pub fn directions(&self) -> &[Vec<f64>] {
        &self.directions
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.directions.first().map_or(0, Vec::len)
    }

    /// Scalar projection of `vector` onto each basis direction
    pub fn projections(&self, vector: &EmbeddingVector) -> Vec<f64> {
        let v: Vec<f64> = vector.as_slice().iter().map(|&x| f64::from(x)).collect();
        self.directions.iter().map(|d| dot64(&v, d)).collect()
    }

    /// Remove `strength` x the projection onto each direction in turn.
    ///
    /// `strength` is clamped to `[0, 1]`; 1.0 removes the projection entirely.
    /// The input is never modified.
    pub fn debias(&self, vector: &EmbeddingVector, strength: f32) -> Result<EmbeddingVector> {
        if vector.dim() != self.dim() {
            return Err(Error::InvalidDimension {
                expected: self.dim(),
                actual: vector.dim(),
            });
        }

        let strength = f64::from(strength.clamp(0.0, 1.0));
        let mut out: Vec<f64> = vector.as_slice().iter().map(|&x| f64::from(x)).collect();

        for direction in &self.directions {
            let denom = dot64(direction, direction);
            if denom <= ZERO_NORM_EPSILON {
                continue;
            }
            let projection = dot64(&out, direction) / denom;
            for (x, d) in out.iter_mut().zip(direction.iter()) {
                *x -= strength * projection * d;
            }
        }

        Ok(EmbeddingVector::new(out.into_iter().map(|x| x as f32).collect()))
    }
}

/// Compute the bias subspace for a set of contrastive word pairs
pub fn compute_bias_subspace<S: AsRef<str>>(
    embedder: &dyn Embedder,
    word_pairs: &[(S, S)],
    options: &EmbedOptions,
) -> Result<BiasSubspace> {
    BiasSubspace::compute(embedder, word_pairs, options)
}

#[inline]
fn dot64(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Power iteration for the dominant eigenpair of a symmetric PSD matrix,
/// restricted to the complement of the already `found` eigenvectors.
fn dominant_eigenpair(matrix: &[Vec<f64>], found: &[Vec<f64>]) -> (f64, Vec<f64>) {
    let n = matrix.len();
    let orthogonalize = |v: &mut Vec<f64>| {
        for f in found {
            let p = dot64(v, f);
            for (x, y) in v.iter_mut().zip(f.iter()) {
                *x -= p * y;
            }
        }
    };

    let mut v: Vec<f64> = (0..n).map(|i| 1.0 + i as f64 / n as f64).collect();
    orthogonalize(&mut v);
    let norm = dot64(&v, &v).sqrt();
    if norm <= ZERO_NORM_EPSILON {
        return (0.0, v);
    }
    for x in &mut v {
        *x /= norm;
    }

    for _ in 0..POWER_ITERATIONS {
        let mut w: Vec<f64> = matrix.iter().map(|row| dot64(row, &v)).collect();
        orthogonalize(&mut w);

        let norm = dot64(&w, &w).sqrt();
        if norm <= ZERO_NORM_EPSILON {
            return (0.0, v);
        }
        for x in &mut w {
            *x /= norm;
        }

        let delta = w
            .iter()
            .zip(v.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        v = w;
        if delta < POWER_TOLERANCE {
            break;
        }
    }

    // Rayleigh quotient
    let mv: Vec<f64> = matrix.iter().map(|row| dot64(row, &v)).collect();
    (dot64(&v, &mv), v)
}
