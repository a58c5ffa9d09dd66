//! Output file writers for the analyze command

use crate::ml::display::{density, display_order, reordered, DensityBin};
use crate::structs::{CdfCurve, ConsensusConfig, ConsensusReport, Result, StabilitySummary};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Bins used for `density.csv`
pub const DENSITY_BINS: usize = 20;

/// Write `summary.txt` - human readable overview
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_summary(output_dir: &Path, content: &str) -> Result<()> {
    let path = output_dir.join("summary.txt");
    fs::write(path, content)?;
    Ok(())
}

/// Build the text for `summary.txt`
#[must_use]
pub fn build_summary(
    source: &Path,
    n_items: usize,
    n_features: usize,
    config: &ConsensusConfig,
    report: &ConsensusReport,
) -> String {
    let mut s = format!(
        "Consensus clustering of {}\n{n_items} items x {n_features} features\n",
        source.display()
    );
    let _ = writeln!(
        s,
        "k = {}..={}, {} rounds per k, fraction {:.2}{}, seed {}\n",
        config.k_min,
        config.k_max,
        config.iterations,
        config.fraction,
        if config.with_replacement {
            " with replacement"
        } else {
            ""
        },
        config.seed
    );

    let _ = writeln!(s, "{:>4} {:>10} {:>12} {:>8}", "k", "area", "rel_change", "pac");
    for summary in &report.summaries {
        let change = summary
            .relative_change
            .map_or_else(|| "-".to_string(), |c| format!("{c:.4}"));
        let _ = writeln!(
            s,
            "{:>4} {:>10.4} {:>12} {:>8.4}",
            summary.k, summary.area, change, summary.pac
        );
    }

    match report.recommended_k {
        Some(k) => {
            let _ = writeln!(s, "\nMost stable cluster count: {k}");
        }
        None => s.push_str("\nSingle candidate, no recommendation\n"),
    }

    let undefined: usize = report
        .matrices
        .iter()
        .map(|m| m.undefined_pairs().len())
        .sum();
    if undefined > 0 {
        let _ = writeln!(
            s,
            "{undefined} item pairs were never sampled together and are excluded"
        );
    }
    s
}

/// Write `stability.json` - machine-readable scores and settings
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_stability_json(
    output_dir: &Path,
    config: &ConsensusConfig,
    report: &ConsensusReport,
) -> Result<()> {
    let output = StabilityOutput {
        config,
        recommended_k: report.recommended_k,
        scores: &report.summaries,
        undefined_pairs: report
            .matrices
            .iter()
            .map(|m| UndefinedEntry {
                k: m.k(),
                count: m.undefined_pairs().len(),
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&output)?;
    fs::write(output_dir.join("stability.json"), json)?;
    Ok(())
}

/// Write `cdf.csv` - one step function per candidate k
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_cdf_csv(output_dir: &Path, curves: &[CdfCurve]) -> Result<()> {
    let mut content = String::from("k,value,fraction\n");
    for curve in curves {
        for point in &curve.points {
            let _ = writeln!(content, "{},{:.6},{:.6}", curve.k, point.value, point.fraction);
        }
    }
    fs::write(output_dir.join("cdf.csv"), content)?;
    Ok(())
}

/// Write `density.csv` - off-diagonal consensus histogram per k
///
/// # Errors
/// Returns error if a histogram cannot be built or the file cannot be written
pub fn write_density_csv(output_dir: &Path, report: &ConsensusReport) -> Result<()> {
    let mut content = String::from("k,bin_start,bin_end,count,density\n");
    for m in &report.matrices {
        for DensityBin {
            start,
            end,
            count,
            density,
        } in density(m, DENSITY_BINS)?
        {
            let _ = writeln!(
                content,
                "{},{start:.4},{end:.4},{count},{density:.6}",
                m.k()
            );
        }
    }
    fs::write(output_dir.join("density.csv"), content)?;
    Ok(())
}

/// Write one `consensus_k{k}.csv` per matrix, rows and columns in display
/// order, with the original row ids as headers
///
/// Undefined entries are written as `NA`.
///
/// # Errors
/// Returns error if ordering fails or a file cannot be written
pub fn write_consensus_matrices(
    output_dir: &Path,
    report: &ConsensusReport,
    row_ids: &[usize],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(report.matrices.len());

    for m in &report.matrices {
        let order = display_order(m)?;
        let dense = reordered(m, &order)?;

        let mut content = String::from("row_id");
        for &i in &order {
            let _ = write!(content, ",{}", row_ids.get(i).copied().unwrap_or(i));
        }
        content.push('\n');

        for (r, row) in dense.outer_iter().enumerate() {
            let id = row_ids.get(order[r]).copied().unwrap_or(order[r]);
            let _ = write!(content, "{id}");
            for value in row {
                if value.is_nan() {
                    content.push_str(",NA");
                } else {
                    let _ = write!(content, ",{value:.4}");
                }
            }
            content.push('\n');
        }

        let path = output_dir.join(format!("consensus_k{}.csv", m.k()));
        fs::write(&path, content)?;
        written.push(path);
    }

    Ok(written)
}

// JSON output structures

#[derive(Serialize)]
struct StabilityOutput<'a> {
    config: &'a ConsensusConfig,
    recommended_k: Option<usize>,
    scores: &'a [StabilitySummary],
    undefined_pairs: Vec<UndefinedEntry>,
}

#[derive(Serialize)]
struct UndefinedEntry {
    k: usize,
    count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::consensus::ConsensusAccumulator;
    use crate::ml::stability::{empirical_cdf, recommend_k, scores_from_curves};
    use crate::structs::Sample;
    use tempfile::TempDir;

    fn small_report() -> ConsensusReport {
        let matrices: Vec<_> = [(2, [0, 0, 1, 1]), (3, [0, 1, 2, 2])]
            .into_iter()
            .map(|(k, labels)| {
                let mut acc = ConsensusAccumulator::new(4, k);
                acc.record(&Sample { indices: vec![0, 1, 2, 3] }, &labels)
                    .expect("record");
                acc.record(&Sample { indices: vec![0, 1, 2] }, &labels[..3])
                    .expect("record");
                acc.finish()
            })
            .collect();
        let curves: Vec<_> = matrices
            .iter()
            .map(|m| empirical_cdf(m).expect("cdf"))
            .collect();
        let summaries = scores_from_curves(&curves).expect("scores");
        let recommended_k = recommend_k(&summaries);

        ConsensusReport {
            matrices,
            curves,
            summaries,
            recommended_k,
        }
    }

    #[test]
    fn test_write_summary() {
        let dir = TempDir::new().expect("create temp dir");
        write_summary(dir.path(), "Test summary content").expect("write summary");

        let content = fs::read_to_string(dir.path().join("summary.txt")).expect("read");
        assert_eq!(content, "Test summary content");
    }

    #[test]
    fn test_build_summary_lists_candidates() {
        let report = small_report();
        let summary = build_summary(
            Path::new("data.csv"),
            4,
            2,
            &ConsensusConfig::default(),
            &report,
        );

        assert!(summary.contains("data.csv"));
        assert!(summary.contains("Most stable cluster count: 3"));
        assert_eq!(summary.lines().filter(|l| l.trim_start().starts_with('2')).count(), 1);
    }

    #[test]
    fn test_write_stability_json() {
        let dir = TempDir::new().expect("create temp dir");
        let report = small_report();
        write_stability_json(dir.path(), &ConsensusConfig::default(), &report)
            .expect("write json");

        let content = fs::read_to_string(dir.path().join("stability.json")).expect("read");
        let value: serde_json::Value = serde_json::from_str(&content).expect("parse");
        assert_eq!(value["recommended_k"], 3);
        assert_eq!(value["scores"].as_array().map(Vec::len), Some(2));
        assert!(value["scores"][0]["relative_change"].is_null());
        assert_eq!(value["config"]["k_min"], 2);
    }

    #[test]
    fn test_write_cdf_and_density() {
        let dir = TempDir::new().expect("create temp dir");
        let report = small_report();
        write_cdf_csv(dir.path(), &report.curves).expect("write cdf");
        write_density_csv(dir.path(), &report).expect("write density");

        let cdf = fs::read_to_string(dir.path().join("cdf.csv")).expect("read");
        assert!(cdf.starts_with("k,value,fraction\n"));
        assert!(cdf.contains("2,1.000000,1.000000"));

        let density = fs::read_to_string(dir.path().join("density.csv")).expect("read");
        assert_eq!(density.lines().count(), 1 + 2 * DENSITY_BINS);
    }

    #[test]
    fn test_write_consensus_matrices() {
        let dir = TempDir::new().expect("create temp dir");
        let report = small_report();
        let paths =
            write_consensus_matrices(dir.path(), &report, &[10, 11, 12, 13]).expect("write");

        assert_eq!(paths.len(), 2);
        let content = fs::read_to_string(&paths[0]).expect("read");
        let mut lines = content.lines();
        let header = lines.next().expect("header");
        assert!(header.starts_with("row_id,"));
        assert!(header.contains("13"));
        assert_eq!(lines.count(), 4);
    }
}
