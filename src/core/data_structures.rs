//! Core value types for similarity-corrected abundance estimation
//! All of them validate on construction and are never mutated afterwards

use crate::core::error::{CorrectionError, CorrectionResult};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// N×N cross-mapping similarity matrix.
///
/// `S[i][j]` is the fraction of genome i's reads that also map to genome j.
/// When built from calibration observations the diagonal is exactly 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    values: Array2<f64>,
}

impl SimilarityMatrix {
    pub fn new(values: Array2<f64>) -> CorrectionResult<Self> {
        let (rows, cols) = values.dim();
        if rows != cols {
            return Err(CorrectionError::configuration(
                "similarity matrix",
                format!("matrix must be square, got {rows}x{cols}"),
            ));
        }
        if rows == 0 {
            return Err(CorrectionError::degenerate(
                "similarity matrix has no genomes",
            ));
        }
        if let Some(((i, j), value)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(CorrectionError::degenerate(format!(
                "similarity matrix entry ({i}, {j}) is not finite: {value}"
            )));
        }

        Ok(Self { values })
    }

    /// Build from row vectors, rejecting ragged input
    pub fn from_rows(rows: &[Vec<f64>]) -> CorrectionResult<Self> {
        let n = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(CorrectionError::configuration(
                "similarity matrix",
                format!("row {i} has {} entries, expected {n}", row.len()),
            ));
        }

        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let values = Array2::from_shape_vec((n, n), flat).map_err(|e| {
            CorrectionError::configuration("similarity matrix", e.to_string())
        })?;
        Self::new(values)
    }

    pub fn identity(num_genomes: usize) -> CorrectionResult<Self> {
        Self::new(Array2::eye(num_genomes))
    }

    /// Normalize raw cross-mapping counts row by row by their diagonal.
    ///
    /// `counts[i][j]` is the number of genome i's calibration reads that map
    /// to genome j. The diagonal of the result is set to exactly 1.0.
    pub fn from_counts(counts: &Array2<u64>) -> CorrectionResult<Self> {
        let (rows, cols) = counts.dim();
        if rows != cols {
            return Err(CorrectionError::configuration(
                "calibration counts",
                format!("count matrix must be square, got {rows}x{cols}"),
            ));
        }

        let mut values = Array2::<f64>::zeros((rows, cols));
        for i in 0..rows {
            let diagonal = counts[[i, i]];
            if diagonal == 0 {
                return Err(CorrectionError::degenerate(format!(
                    "genome {i} has no self-mapping calibration reads"
                )));
            }
            for j in 0..cols {
                values[[i, j]] = if i == j {
                    1.0
                } else {
                    counts[[i, j]] as f64 / diagonal as f64
                };
            }
        }

        Self::new(values)
    }

    pub fn num_genomes(&self) -> usize {
        self.values.nrows()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    /// Predicted read fractions `S·x`
    pub fn apply(&self, abundances: &[f64]) -> Array1<f64> {
        self.values.dot(&ArrayView1::from(abundances))
    }
}

/// Observed fraction of sampled reads mapped to each genome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadCountVector {
    values: Array1<f64>,
}

impl ReadCountVector {
    pub fn new(values: Vec<f64>) -> CorrectionResult<Self> {
        if values.is_empty() {
            return Err(CorrectionError::degenerate("read count vector is empty"));
        }
        for (i, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(CorrectionError::degenerate(format!(
                    "read fraction for genome {i} is not finite: {value}"
                )));
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(CorrectionError::degenerate(format!(
                    "read fraction for genome {i} is outside [0, 1]: {value}"
                )));
            }
        }

        Ok(Self {
            values: Array1::from(values),
        })
    }

    /// Divide per-genome mapped read counts by the total number of reads
    pub fn from_counts(counts: &[u64], total_reads: usize) -> CorrectionResult<Self> {
        if total_reads == 0 {
            return Err(CorrectionError::degenerate(
                "cannot normalize read counts of an empty read set",
            ));
        }
        let total = total_reads as f64;
        Self::new(counts.iter().map(|&c| c as f64 / total).collect())
    }

    pub fn num_genomes(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values
            .as_slice()
            .unwrap_or_default()
    }
}

/// Estimated relative abundance per genome.
///
/// The optimizer does not guarantee feasibility, so the invariant
/// (entries ≥ -ε, sum ≤ 1 + ε) is checked after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbundanceVector {
    values: Vec<f64>,
}

impl AbundanceVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.values
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Largest amount by which any constraint is violated (0.0 when feasible)
    pub fn constraint_violation(&self) -> f64 {
        let negative = self
            .values
            .iter()
            .map(|&x| -x)
            .fold(0.0_f64, f64::max);
        negative.max(self.sum() - 1.0)
    }

    pub fn is_feasible(&self, tolerance: f64) -> bool {
        self.constraint_violation() <= tolerance
    }

    /// Project onto the feasible set: negatives become zero and the vector
    /// is rescaled when its sum exceeds one.
    pub fn clamped(&self) -> Self {
        let mut values: Vec<f64> = self.values.iter().map(|&x| x.max(0.0)).collect();
        let total: f64 = values.iter().sum();
        if total > 1.0 {
            for value in &mut values {
                *value /= total;
            }
        }
        Self { values }
    }
}

impl Index<usize> for AbundanceVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

impl From<Vec<f64>> for AbundanceVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// One optimizer invocation: where it started, where it ended, how good it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub start_index: usize,
    pub initial: Vec<f64>,
    pub solution: Vec<f64>,
    pub objective: f64,
    /// Largest constraint violation at `solution`
    pub max_violation: f64,
    /// Trust-region radius reached `rhoend` before the evaluation budget ran out
    pub converged: bool,
    pub evaluations: usize,
}

/// Per-genome summary after all bootstrap iterations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeStatistics {
    pub name: String,
    pub mapped_reads: u64,
    pub mean_abundance: f64,
    pub abundance_variance: f64,
    /// Fraction of iterations in which the abundance fell below the threshold
    pub absence_fraction: f64,
    /// `mean_abundance × total reads`
    pub corrected_reads: f64,
    /// `abundance_variance × total reads`
    pub corrected_variance: f64,
}

impl GenomeStatistics {
    pub fn is_confidently_present(&self, significance: f64) -> bool {
        self.absence_fraction < significance
    }
}
