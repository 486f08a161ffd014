//! End-to-end bootstrap correction on constructed and simulated observations

use gasic::core::error::CorrectionError;
use gasic::core::observations::{CalibrationReads, MappingObservations, ReadMappings};
use gasic::correction::{
    BootstrapSettings, CancellationToken, OptimizerSettings, SimilarityCorrector,
};
use gasic::simulation::SyntheticCommunity;
use std::cell::Cell;

fn corrector(iterations: usize, seed: u64) -> SimilarityCorrector {
    SimilarityCorrector::new(
        OptimizerSettings::default(),
        2,
        BootstrapSettings {
            iterations,
            seed: Some(seed),
            ..Default::default()
        },
    )
    .unwrap()
}

/// Every sample read maps to the first genome only, and calibration reads never cross-map
fn single_source_observations() -> MappingObservations {
    let sample = ReadMappings::from_mapped_indices(2, &vec![vec![0]; 50]).unwrap();
    let calibration = CalibrationReads::new(vec![
        ReadMappings::from_mapped_indices(2, &vec![vec![0]; 20]).unwrap(),
        ReadMappings::from_mapped_indices(2, &vec![vec![1]; 20]).unwrap(),
    ])
    .unwrap();
    MappingObservations::new(
        vec!["present".to_string(), "absent".to_string()],
        sample,
        calibration,
    )
    .unwrap()
}

#[test]
fn test_noiseless_observations_give_exact_statistics() {
    let report = corrector(4, 17)
        .bootstrap(&single_source_observations())
        .unwrap();

    let present = &report.statistics[0];
    let absent = &report.statistics[1];

    assert!((present.mean_abundance - 1.0).abs() < 1e-4);
    assert!(present.abundance_variance < 1e-8);
    assert_eq!(present.absence_fraction, 0.0);
    assert!((present.corrected_reads - 50.0).abs() < 1e-2);
    assert_eq!(present.mapped_reads, 50);

    assert!(absent.mean_abundance < 1e-4);
    assert_eq!(absent.absence_fraction, 1.0);
    assert_eq!(absent.mapped_reads, 0);
    assert!(!absent.is_confidently_present(0.05));
    assert!(present.is_confidently_present(0.05));
}

#[test]
fn test_single_iteration_has_zero_variance() {
    let community = SyntheticCommunity::uniform(vec![0.5, 0.3], 0.1, 400);
    let observations = community.generate(2).unwrap();

    let report = corrector(1, 2).bootstrap(&observations).unwrap();

    assert_eq!(report.replicates.len(), 1);
    for (genome, stats) in report.statistics.iter().enumerate() {
        assert_eq!(stats.abundance_variance, 0.0);
        assert_eq!(stats.corrected_variance, 0.0);
        assert_eq!(stats.mean_abundance, report.replicates[0][genome]);
    }
}

#[test]
fn test_simulated_community_is_recovered() {
    let community = SyntheticCommunity::chain(vec![0.5, 0.3, 0.0], 0.2, 4_000);
    let observations = community.generate(23).unwrap();

    let report = corrector(5, 23).bootstrap(&observations).unwrap();

    let means: Vec<f64> = report.statistics.iter().map(|s| s.mean_abundance).collect();
    assert!((means[0] - 0.5).abs() < 0.03, "means {means:?}");
    assert!((means[1] - 0.3).abs() < 0.03, "means {means:?}");
    assert!(means[2] < 0.03, "means {means:?}");

    // Cross-mapped reads inflate the raw counts of the empty genome
    assert!(report.statistics[2].mapped_reads > 0);
    for replicate in &report.replicates {
        assert!(replicate.is_feasible(1e-6));
    }
}

#[test]
fn test_bootstrap_mean_tracks_single_shot_correction() {
    let community = SyntheticCommunity::chain(vec![0.4, 0.3, 0.2], 0.3, 3_000);
    let observations = community.generate(40).unwrap();
    let corrector = corrector(40, 40);

    let single = corrector.correct_observations(&observations).unwrap();
    let report = corrector.bootstrap(&observations).unwrap();

    assert_eq!(report.replicates.len(), 40);
    for (genome, stats) in report.statistics.iter().enumerate() {
        let gap = (stats.mean_abundance - single.abundances[genome]).abs();
        assert!(
            gap < 0.01,
            "{}: bootstrap {} vs single-shot {}",
            stats.name,
            stats.mean_abundance,
            single.abundances[genome]
        );
    }
}

#[test]
fn test_reports_are_reproducible_from_seed() {
    let community = SyntheticCommunity::uniform(vec![0.4, 0.2, 0.2], 0.15, 600);
    let observations = community.generate(8).unwrap();

    let first = corrector(3, 99).bootstrap(&observations).unwrap();
    let second = corrector(3, 99).bootstrap(&observations).unwrap();

    assert_eq!(first.seed, second.seed);
    for (a, b) in first.replicates.iter().zip(&second.replicates) {
        for (x, y) in a.values().iter().zip(b.values()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}

#[test]
fn test_partial_calibration_draws() {
    let community = SyntheticCommunity::uniform(vec![0.6, 0.3], 0.05, 300);
    let observations = community.generate(4).unwrap();
    let corrector = SimilarityCorrector::new(
        OptimizerSettings::default(),
        1,
        BootstrapSettings {
            iterations: 2,
            calibration_fraction: 0.25,
            seed: Some(4),
            ..Default::default()
        },
    )
    .unwrap();

    let report = corrector.bootstrap(&observations).unwrap();
    assert_eq!(report.replicates.len(), 2);
    assert_eq!(report.total_reads, 300);
}

#[test]
fn test_cancellation_stops_between_iterations() {
    let observations = single_source_observations();
    let corrector = corrector(5, 1);
    let cancel = CancellationToken::new();
    let seen = Cell::new(0);

    let progress = |completed: usize, total: usize| {
        assert_eq!(total, 5);
        seen.set(completed);
        if completed == 2 {
            cancel.cancel();
        }
    };

    let err = corrector
        .bootstrap_with(&observations, &cancel, Some(&progress))
        .unwrap_err();

    assert_eq!(
        err,
        CorrectionError::Cancelled {
            completed: 2,
            total: 5
        }
    );
    assert_eq!(seen.get(), 2);
}
