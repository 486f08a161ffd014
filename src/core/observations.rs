//! Per-read mapping observations and their aggregation into model inputs.
//!
//! A read's row records, for every reference genome, whether the read maps to
//! it. Sample reads yield the [`ReadCountVector`]; each genome's calibration
//! reads (reads simulated from that genome) yield one row of the
//! [`SimilarityMatrix`].

use crate::core::data_structures::{ReadCountVector, SimilarityMatrix};
use crate::core::error::{CorrectionError, CorrectionResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Reads × genomes boolean mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMappings {
    num_genomes: usize,
    /// Row-major, `num_genomes` flags per read
    flags: Vec<bool>,
}

impl ReadMappings {
    pub fn new(num_genomes: usize, rows: Vec<Vec<bool>>) -> CorrectionResult<Self> {
        let mut mappings = Self::with_capacity(num_genomes, rows.len());
        for row in &rows {
            mappings.push_read(row)?;
        }
        Ok(mappings)
    }

    pub fn with_capacity(num_genomes: usize, reads: usize) -> Self {
        Self {
            num_genomes,
            flags: Vec::with_capacity(num_genomes * reads),
        }
    }

    /// Build from the list of genome indices each read maps to
    pub fn from_mapped_indices(num_genomes: usize, reads: &[Vec<usize>]) -> CorrectionResult<Self> {
        let mut mappings = Self::with_capacity(num_genomes, reads.len());
        let mut row = vec![false; num_genomes];
        for (read, targets) in reads.iter().enumerate() {
            row.iter_mut().for_each(|flag| *flag = false);
            for &genome in targets {
                if genome >= num_genomes {
                    return Err(CorrectionError::configuration(
                        "read mappings",
                        format!("read {read} maps to genome {genome}, but only {num_genomes} genomes are known"),
                    ));
                }
                row[genome] = true;
            }
            mappings.push_read(&row)?;
        }
        Ok(mappings)
    }

    pub fn push_read(&mut self, row: &[bool]) -> CorrectionResult<()> {
        if row.len() != self.num_genomes {
            return Err(CorrectionError::configuration(
                "read mappings",
                format!(
                    "read {} has {} genome columns, expected {}",
                    self.num_reads(),
                    row.len(),
                    self.num_genomes
                ),
            ));
        }
        self.flags.extend_from_slice(row);
        Ok(())
    }

    pub fn num_genomes(&self) -> usize {
        self.num_genomes
    }

    pub fn num_reads(&self) -> usize {
        if self.num_genomes == 0 {
            0
        } else {
            self.flags.len() / self.num_genomes
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_reads() == 0
    }

    pub fn row(&self, read: usize) -> &[bool] {
        let start = read * self.num_genomes;
        &self.flags[start..start + self.num_genomes]
    }

    /// Column sums: how many reads map to each genome
    pub fn mapped_read_counts(&self) -> Vec<u64> {
        let mut counts = vec![0_u64; self.num_genomes];
        for row in self.flags.chunks_exact(self.num_genomes.max(1)) {
            for (count, &mapped) in counts.iter_mut().zip(row) {
                *count += u64::from(mapped);
            }
        }
        counts
    }

    /// Column sums over a multiset of read indices (duplicates count twice)
    pub fn sample_counts(&self, indices: &[usize]) -> Vec<u64> {
        let mut counts = vec![0_u64; self.num_genomes];
        for &read in indices {
            for (count, &mapped) in counts.iter_mut().zip(self.row(read)) {
                *count += u64::from(mapped);
            }
        }
        counts
    }

    pub fn normalized_read_counts(&self) -> CorrectionResult<ReadCountVector> {
        ReadCountVector::from_counts(&self.mapped_read_counts(), self.num_reads())
    }
}

/// Calibration reads, one [`ReadMappings`] table per source genome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationReads {
    per_genome: Vec<ReadMappings>,
}

impl CalibrationReads {
    pub fn new(per_genome: Vec<ReadMappings>) -> CorrectionResult<Self> {
        let num_genomes = per_genome.len();
        if num_genomes == 0 {
            return Err(CorrectionError::degenerate("no calibration read sets"));
        }
        for (genome, reads) in per_genome.iter().enumerate() {
            if reads.num_genomes() != num_genomes {
                return Err(CorrectionError::configuration(
                    "calibration reads",
                    format!(
                        "read set of genome {genome} covers {} genomes, expected {num_genomes}",
                        reads.num_genomes()
                    ),
                ));
            }
            if reads.is_empty() {
                return Err(CorrectionError::degenerate(format!(
                    "calibration read set of genome {genome} is empty"
                )));
            }
        }
        Ok(Self { per_genome })
    }

    pub fn num_genomes(&self) -> usize {
        self.per_genome.len()
    }

    pub fn genome(&self, index: usize) -> &ReadMappings {
        &self.per_genome[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadMappings> {
        self.per_genome.iter()
    }

    /// `counts[i][j]`: reads of genome i that also map to genome j
    pub fn similarity_counts(&self) -> Array2<u64> {
        let n = self.num_genomes();
        let mut counts = Array2::<u64>::zeros((n, n));
        for (i, reads) in self.per_genome.iter().enumerate() {
            for (j, count) in reads.mapped_read_counts().into_iter().enumerate() {
                counts[[i, j]] = count;
            }
        }
        counts
    }

    pub fn similarity_matrix(&self) -> CorrectionResult<SimilarityMatrix> {
        SimilarityMatrix::from_counts(&self.similarity_counts())
    }
}

/// Sample and calibration observations for one correction job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingObservations {
    genome_names: Vec<String>,
    sample: ReadMappings,
    calibration: CalibrationReads,
}

impl MappingObservations {
    pub fn new(
        genome_names: Vec<String>,
        sample: ReadMappings,
        calibration: CalibrationReads,
    ) -> CorrectionResult<Self> {
        let n = calibration.num_genomes();
        if sample.num_genomes() != n {
            return Err(CorrectionError::configuration(
                "sample reads",
                format!(
                    "sample covers {} genomes but calibration covers {n}",
                    sample.num_genomes()
                ),
            ));
        }
        if genome_names.len() != n {
            return Err(CorrectionError::configuration(
                "genome names",
                format!("{} names given for {n} genomes", genome_names.len()),
            ));
        }
        if sample.is_empty() {
            return Err(CorrectionError::degenerate("sample read set is empty"));
        }

        Ok(Self {
            genome_names,
            sample,
            calibration,
        })
    }

    /// Same as [`MappingObservations::new`] with names `genome_0`, `genome_1`, ...
    pub fn unnamed(sample: ReadMappings, calibration: CalibrationReads) -> CorrectionResult<Self> {
        let names = (0..calibration.num_genomes())
            .map(|i| format!("genome_{i}"))
            .collect();
        Self::new(names, sample, calibration)
    }

    pub fn genome_names(&self) -> &[String] {
        &self.genome_names
    }

    pub fn num_genomes(&self) -> usize {
        self.genome_names.len()
    }

    pub fn sample(&self) -> &ReadMappings {
        &self.sample
    }

    pub fn calibration(&self) -> &CalibrationReads {
        &self.calibration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reads() -> ReadMappings {
        ReadMappings::from_mapped_indices(3, &[vec![0], vec![0, 1], vec![1], vec![], vec![2, 0]])
            .unwrap()
    }

    #[test]
    fn test_mapped_read_counts() {
        let reads = sample_reads();
        assert_eq!(reads.num_reads(), 5);
        assert_eq!(reads.mapped_read_counts(), vec![3, 2, 1]);

        let normalized = reads.normalized_read_counts().unwrap();
        assert!((normalized.as_slice()[0] - 0.6).abs() < 1e-12);
        assert!((normalized.as_slice()[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_sample_counts_with_duplicates() {
        let reads = sample_reads();
        assert_eq!(reads.sample_counts(&[1, 1, 4]), vec![3, 2, 1]);
        assert_eq!(reads.sample_counts(&[]), vec![0, 0, 0]);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let err = ReadMappings::new(2, vec![vec![true, false], vec![true]]).unwrap_err();
        assert!(matches!(err, CorrectionError::Configuration { .. }));

        let err = ReadMappings::from_mapped_indices(2, &[vec![3]]).unwrap_err();
        assert!(matches!(err, CorrectionError::Configuration { .. }));
    }

    #[test]
    fn test_empty_sample_cannot_be_normalized() {
        let reads = ReadMappings::with_capacity(2, 0);
        assert!(reads.is_empty());
        assert!(matches!(
            reads.normalized_read_counts(),
            Err(CorrectionError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn test_calibration_similarity_matrix() {
        let g0 = ReadMappings::from_mapped_indices(2, &[vec![0], vec![0, 1], vec![0], vec![0]])
            .unwrap();
        let g1 = ReadMappings::from_mapped_indices(2, &[vec![1], vec![1, 0]]).unwrap();
        let calibration = CalibrationReads::new(vec![g0, g1]).unwrap();

        let counts = calibration.similarity_counts();
        assert_eq!(counts[[0, 0]], 4);
        assert_eq!(counts[[0, 1]], 1);
        assert_eq!(counts[[1, 0]], 1);
        assert_eq!(counts[[1, 1]], 2);

        let matrix = calibration.similarity_matrix().unwrap();
        assert!((matrix.get(0, 1) - 0.25).abs() < 1e-12);
        assert!((matrix.get(1, 0) - 0.5).abs() < 1e-12);
        assert_eq!(matrix.get(1, 1), 1.0);
    }

    #[test]
    fn test_calibration_shape_checks() {
        let wrong_width = ReadMappings::from_mapped_indices(3, &[vec![0]]).unwrap();
        let ok = ReadMappings::from_mapped_indices(2, &[vec![1]]).unwrap();
        assert!(matches!(
            CalibrationReads::new(vec![wrong_width, ok.clone()]),
            Err(CorrectionError::Configuration { .. })
        ));

        let empty = ReadMappings::with_capacity(2, 0);
        assert!(matches!(
            CalibrationReads::new(vec![empty, ok]),
            Err(CorrectionError::DegenerateInput { .. })
        ));

        assert!(CalibrationReads::new(vec![]).is_err());
    }

    #[test]
    fn test_observations_genome_count_mismatch() {
        let g0 = ReadMappings::from_mapped_indices(2, &[vec![0]]).unwrap();
        let g1 = ReadMappings::from_mapped_indices(2, &[vec![1]]).unwrap();
        let calibration = CalibrationReads::new(vec![g0, g1]).unwrap();

        let err = MappingObservations::unnamed(sample_reads(), calibration.clone()).unwrap_err();
        assert!(matches!(err, CorrectionError::Configuration { .. }));

        let sample = ReadMappings::from_mapped_indices(2, &[vec![0], vec![1]]).unwrap();
        let err = MappingObservations::new(vec!["only".into()], sample.clone(), calibration.clone())
            .unwrap_err();
        assert!(matches!(err, CorrectionError::Configuration { .. }));

        let observations = MappingObservations::unnamed(sample, calibration).unwrap();
        assert_eq!(observations.genome_names(), &["genome_0", "genome_1"]);
    }
}
