//! Synthetic communities with known abundances for tests, benches and demos.
//!
//! A read drawn from genome i maps to i and, independently, to every other
//! genome j with probability `cross_mapping[i][j]`. Reads not drawn from any
//! genome (the `1 - Σ abundance` remainder) map nowhere.

use crate::core::error::{CorrectionError, CorrectionResult};
use crate::core::observations::{CalibrationReads, MappingObservations, ReadMappings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticCommunity {
    pub genome_names: Vec<String>,
    /// True relative abundances, summing to at most 1
    pub abundances: Vec<f64>,
    /// `cross_mapping[i][j]`: probability that a read of genome i also maps to j
    pub cross_mapping: Vec<Vec<f64>>,
    pub sample_reads: usize,
    pub calibration_reads_per_genome: usize,
}

impl SyntheticCommunity {
    /// Community where every pair of genomes cross-maps at the same rate
    pub fn uniform(abundances: Vec<f64>, cross_rate: f64, sample_reads: usize) -> Self {
        let n = abundances.len();
        let cross_mapping = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { cross_rate }).collect())
            .collect();
        Self {
            genome_names: (0..n).map(|i| format!("genome_{i}")).collect(),
            abundances,
            cross_mapping,
            sample_reads,
            calibration_reads_per_genome: sample_reads.max(1),
        }
    }

    /// Neighbouring genomes (i, i+1) cross-map at `neighbour_rate`, others never
    pub fn chain(abundances: Vec<f64>, neighbour_rate: f64, sample_reads: usize) -> Self {
        let n = abundances.len();
        let cross_mapping = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| match i.abs_diff(j) {
                        0 => 1.0,
                        1 => neighbour_rate,
                        _ => 0.0,
                    })
                    .collect()
            })
            .collect();
        Self {
            genome_names: (0..n).map(|i| format!("genome_{i}")).collect(),
            abundances,
            cross_mapping,
            sample_reads,
            calibration_reads_per_genome: sample_reads.max(1),
        }
    }

    pub fn num_genomes(&self) -> usize {
        self.abundances.len()
    }

    pub fn validate(&self) -> CorrectionResult<()> {
        let n = self.num_genomes();
        if n == 0 {
            return Err(CorrectionError::degenerate("community has no genomes"));
        }
        if self.genome_names.len() != n {
            return Err(CorrectionError::configuration(
                "genome names",
                format!("{} names given for {n} genomes", self.genome_names.len()),
            ));
        }
        if self.abundances.iter().any(|&a| !(0.0..=1.0).contains(&a))
            || self.abundances.iter().sum::<f64>() > 1.0 + 1e-9
        {
            return Err(CorrectionError::configuration(
                "abundances",
                "must be non-negative and sum to at most 1",
            ));
        }
        if self.cross_mapping.len() != n || self.cross_mapping.iter().any(|row| row.len() != n) {
            return Err(CorrectionError::configuration(
                "cross mapping",
                format!("matrix must be {n}x{n}"),
            ));
        }
        if self.cross_mapping.iter().flatten().any(|&p| !(0.0..=1.0).contains(&p)) {
            return Err(CorrectionError::configuration(
                "cross mapping",
                "rates must lie in [0, 1]",
            ));
        }
        if self.sample_reads == 0 || self.calibration_reads_per_genome == 0 {
            return Err(CorrectionError::degenerate("read counts must be positive"));
        }
        Ok(())
    }

    /// Simulate sample and calibration observations from `seed`
    pub fn generate(&self, seed: u64) -> CorrectionResult<MappingObservations> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let n = self.num_genomes();

        let mut sample = ReadMappings::with_capacity(n, self.sample_reads);
        let mut row = vec![false; n];
        for _ in 0..self.sample_reads {
            match self.draw_source(&mut rng) {
                Some(source) => self.map_read(source, &mut rng, &mut row),
                None => row.iter_mut().for_each(|flag| *flag = false),
            }
            sample.push_read(&row)?;
        }

        let mut calibration = Vec::with_capacity(n);
        for source in 0..n {
            let mut reads = ReadMappings::with_capacity(n, self.calibration_reads_per_genome);
            for _ in 0..self.calibration_reads_per_genome {
                self.map_read(source, &mut rng, &mut row);
                reads.push_read(&row)?;
            }
            calibration.push(reads);
        }

        debug!(
            genomes = n,
            sample_reads = self.sample_reads,
            calibration_reads = self.calibration_reads_per_genome,
            "Simulated community observations"
        );

        MappingObservations::new(
            self.genome_names.clone(),
            sample,
            CalibrationReads::new(calibration)?,
        )
    }

    fn draw_source<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        let mut u: f64 = rng.gen();
        for (genome, &abundance) in self.abundances.iter().enumerate() {
            if u < abundance {
                return Some(genome);
            }
            u -= abundance;
        }
        None
    }

    fn map_read<R: Rng>(&self, source: usize, rng: &mut R, row: &mut [bool]) {
        for (target, flag) in row.iter_mut().enumerate() {
            *flag = target == source || rng.gen::<f64>() < self.cross_mapping[source][target];
        }
    }
}
