/// Writers for per-genome correction results
/// Plain-text table for terminals, TSV and JSON for downstream tools
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::core::data_structures::GenomeStatistics;
use crate::correction::bootstrap::BootstrapReport;

const TSV_HEADER: &str =
    "name\tmapped_reads\tcorrected_reads\tcorrected_variance\tabsence_fraction\tmean_abundance";

/// Render statistics as an aligned text table
pub fn render_statistics_table(statistics: &[GenomeStatistics]) -> String {
    let name_width = statistics
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("genome".len());

    let mut table = String::new();
    let _ = writeln!(
        table,
        "{:<width$}  {:>12}  {:>14}  {:>14}  {:>8}  {:>10}",
        "genome",
        "mapped",
        "corrected",
        "variance",
        "absent",
        "abundance",
        width = name_width
    );
    for stats in statistics {
        let _ = writeln!(
            table,
            "{:<width$}  {:>12}  {:>14.2}  {:>14.4}  {:>8.3}  {:>10.6}",
            stats.name,
            stats.mapped_reads,
            stats.corrected_reads,
            stats.corrected_variance,
            stats.absence_fraction,
            stats.mean_abundance,
            width = name_width
        );
    }
    table
}

/// Write statistics as TSV, one genome per line
pub fn write_statistics_tsv<W: Write>(statistics: &[GenomeStatistics], mut writer: W) -> Result<()> {
    writeln!(writer, "{TSV_HEADER}")?;
    for stats in statistics {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}",
            stats.name,
            stats.mapped_reads,
            stats.corrected_reads,
            stats.corrected_variance,
            stats.absence_fraction,
            stats.mean_abundance
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write statistics TSV to a file
pub fn write_statistics_tsv_file<P: AsRef<Path>>(
    statistics: &[GenomeStatistics],
    output_path: P,
) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create statistics TSV: {}", path.display()))?;
    write_statistics_tsv(statistics, BufWriter::new(file))?;

    info!(
        "📈 Wrote {} genome entries to TSV: {}",
        statistics.len(),
        path.display()
    );
    Ok(())
}

/// Write the full bootstrap report, replicates included, as pretty JSON
pub fn write_report_json<W: Write>(report: &BootstrapReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)
        .context("Failed to serialize bootstrap report")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
