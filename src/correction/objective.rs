//! Least-squares residual of the similarity model and its feasibility constraints.
//!
//! `objective(x) = ||S·x - r||²`, subject to `x[i] >= 0` and `1 - Σx >= 0`.
//! There is no L1 term.

use crate::core::data_structures::{ReadCountVector, SimilarityMatrix};
use crate::core::error::{CorrectionError, CorrectionResult};
use crate::correction::optimizer::ConstrainedProblem;

/// Borrowed model inputs for one driver call
#[derive(Debug, Clone, Copy)]
pub struct SimilarityObjective<'a> {
    similarity: &'a SimilarityMatrix,
    reads: &'a ReadCountVector,
}

impl<'a> SimilarityObjective<'a> {
    pub fn new(
        similarity: &'a SimilarityMatrix,
        reads: &'a ReadCountVector,
    ) -> CorrectionResult<Self> {
        if similarity.num_genomes() != reads.num_genomes() {
            return Err(CorrectionError::configuration(
                "read counts",
                format!(
                    "{} read fractions for a {}x{} similarity matrix",
                    reads.num_genomes(),
                    similarity.num_genomes(),
                    similarity.num_genomes()
                ),
            ));
        }
        Ok(Self { similarity, reads })
    }

    pub fn num_genomes(&self) -> usize {
        self.similarity.num_genomes()
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        let predicted = self.similarity.apply(x);
        predicted
            .iter()
            .zip(self.reads.values().iter())
            .map(|(p, r)| (p - r) * (p - r))
            .sum()
    }

    /// `constraints[i] = x[i]` and `constraints[N] = 1 - Σx`
    pub fn constraints(&self, x: &[f64], constraints: &mut [f64]) {
        let n = x.len();
        constraints[..n].copy_from_slice(x);
        constraints[n] = 1.0 - x.iter().sum::<f64>();
    }
}

impl ConstrainedProblem for SimilarityObjective<'_> {
    fn dimension(&self) -> usize {
        self.num_genomes()
    }

    fn num_constraints(&self) -> usize {
        self.num_genomes() + 1
    }

    fn evaluate(&self, x: &[f64], constraints: &mut [f64]) -> f64 {
        self.constraints(x, constraints);
        self.objective(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_zero_at_exact_fit() {
        let similarity = SimilarityMatrix::identity(3).unwrap();
        let reads = ReadCountVector::new(vec![0.2, 0.3, 0.1]).unwrap();
        let objective = SimilarityObjective::new(&similarity, &reads).unwrap();

        assert!(objective.objective(&[0.2, 0.3, 0.1]).abs() < 1e-15);
        assert!((objective.objective(&[0.0, 0.0, 0.0]) - 0.14).abs() < 1e-12);
    }

    #[test]
    fn test_objective_with_cross_mapping() {
        let similarity =
            SimilarityMatrix::from_rows(&[vec![1.0, 0.1], vec![0.2, 1.0]]).unwrap();
        let reads = ReadCountVector::new(vec![0.6, 0.4]).unwrap();
        let objective = SimilarityObjective::new(&similarity, &reads).unwrap();

        // S·r = [0.64, 0.52]
        let expected = 0.04 * 0.04 + 0.12 * 0.12;
        assert!((objective.objective(&[0.6, 0.4]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_constraint_vector() {
        let similarity = SimilarityMatrix::identity(2).unwrap();
        let reads = ReadCountVector::new(vec![0.5, 0.5]).unwrap();
        let objective = SimilarityObjective::new(&similarity, &reads).unwrap();

        let mut constraints = vec![0.0; objective.num_constraints()];
        let f = objective.evaluate(&[-0.1, 0.7], &mut constraints);
        assert!((constraints[0] + 0.1).abs() < 1e-12);
        assert!((constraints[1] - 0.7).abs() < 1e-12);
        assert!((constraints[2] - 0.4).abs() < 1e-12);
        assert!((f - (0.36 + 0.04)).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let similarity = SimilarityMatrix::identity(3).unwrap();
        let reads = ReadCountVector::new(vec![0.5, 0.5]).unwrap();
        assert!(matches!(
            SimilarityObjective::new(&similarity, &reads),
            Err(CorrectionError::Configuration { .. })
        ));
    }
}
